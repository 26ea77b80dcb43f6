//! Per-round action records: what players intend, how hard the DM judges it,
//! and what actually happened.
//!
//! Types an agent produces derive [`OutputSchema`] so the expected JSON shape
//! can be shown to the model, and implement [`StructuredOutput`] so a reply
//! that parses but makes no sense is treated as a parse failure.

use crate::agent::output::StructuredOutput;
use dnd_macros::OutputSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Intent
// ============================================================================

/// What a character is trying to do this round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, OutputSchema)]
#[schema(name = "intent")]
pub struct Intent {
    /// Name of the acting character
    #[serde(default)]
    #[schema(optional)]
    pub character: String,
    /// The action the character takes, in one or two sentences
    pub action: String,
    /// Why the character chooses this action
    #[serde(default)]
    pub reasoning: String,
    /// Who or what the action is aimed at
    #[serde(default)]
    pub target: Option<String>,
    /// Ability being used, if any
    #[serde(default)]
    pub using_ability: Option<String>,
    /// Equipment being used, if any
    #[serde(default)]
    pub using_equipment: Option<String>,
}

impl Intent {
    pub fn new(character: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            action: action.into(),
            reasoning: String::new(),
            target: None,
            using_ability: None,
            using_equipment: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// One-line description used in prompts and logs.
    pub fn describe(&self) -> String {
        let mut line = format!("{}: {}", self.character, self.action);
        if let Some(target) = &self.target {
            line.push_str(&format!(" (target: {target})"));
        }
        if let Some(ability) = &self.using_ability {
            line.push_str(&format!(" [ability: {ability}]"));
        }
        if let Some(item) = &self.using_equipment {
            line.push_str(&format!(" [using: {item}]"));
        }
        line
    }
}

impl StructuredOutput for Intent {
    fn output_name() -> &'static str {
        Self::schema_name()
    }

    fn output_schema() -> Value {
        Self::json_schema()
    }

    fn validate(&self) -> Result<(), String> {
        if self.action.trim().is_empty() {
            return Err("intent has an empty action".into());
        }
        Ok(())
    }
}

// ============================================================================
// Difficulty
// ============================================================================

/// How hard an action is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, OutputSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    AlwaysSucceed,
    Easy,
    Average,
    Hard,
    SuperHard,
    AlwaysFail,
}

impl Difficulty {
    /// Highest roll (out of 100) that still succeeds.
    ///
    /// `None` for the two outcomes that are decided without a roll.
    pub fn success_chance(&self) -> Option<u32> {
        match self {
            Difficulty::AlwaysSucceed | Difficulty::AlwaysFail => None,
            Difficulty::Easy => Some(80),
            Difficulty::Average => Some(60),
            Difficulty::Hard => Some(40),
            Difficulty::SuperHard => Some(20),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Difficulty::AlwaysSucceed => "always_succeed",
            Difficulty::Easy => "easy",
            Difficulty::Average => "average",
            Difficulty::Hard => "hard",
            Difficulty::SuperHard => "super_hard",
            Difficulty::AlwaysFail => "always_fail",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The DM's judgement of how hard an intended action is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, OutputSchema)]
#[schema(name = "difficulty_assessment")]
pub struct DifficultyAssessment {
    /// Assessed difficulty level
    pub difficulty: Difficulty,
    /// Why this difficulty was chosen
    pub reasoning: String,
    /// Circumstances that drove the assessment
    #[serde(default)]
    pub key_factors: Vec<String>,
    /// Resolve without rolling (only meaningful for always_succeed or always_fail)
    #[serde(default)]
    #[schema(optional)]
    pub auto_resolve: bool,
    /// Situational modifiers by name
    #[serde(default)]
    #[schema(optional)]
    pub modifiers: BTreeMap<String, i32>,
    /// What the character needs for the attempt
    #[serde(default)]
    #[schema(optional)]
    pub requirements: Vec<String>,
}

impl DifficultyAssessment {
    pub fn new(difficulty: Difficulty, reasoning: impl Into<String>) -> Self {
        Self {
            difficulty,
            reasoning: reasoning.into(),
            key_factors: Vec::new(),
            auto_resolve: false,
            modifiers: BTreeMap::new(),
            requirements: Vec::new(),
        }
    }

    /// True when no roll is needed to decide the outcome.
    pub fn skips_roll(&self) -> bool {
        self.auto_resolve || self.difficulty.success_chance().is_none()
    }
}

impl StructuredOutput for DifficultyAssessment {
    fn output_name() -> &'static str {
        Self::schema_name()
    }

    fn output_schema() -> Value {
        Self::json_schema()
    }

    fn validate(&self) -> Result<(), String> {
        if self.reasoning.trim().is_empty() {
            return Err("difficulty assessment has no reasoning".into());
        }
        Ok(())
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// What happened to one character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, OutputSchema)]
pub struct CharacterOutcome {
    /// Narrated outcome of the character's action
    pub outcome: String,
    /// Status changes for the character; null or false clears a condition
    #[serde(default)]
    #[schema(optional)]
    pub state_changes: BTreeMap<String, Value>,
    /// Resources spent this round (spell slots, arrows, potions)
    #[serde(default)]
    #[schema(optional)]
    pub resources_used: Vec<String>,
}

/// The DM's adjudication of every declared action in a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, OutputSchema)]
#[schema(name = "resolution")]
pub struct Resolution {
    /// One entry per acting character, keyed by character name
    pub outcomes: BTreeMap<String, CharacterOutcome>,
    /// The scene after all actions, as the party now sees it
    pub scene: String,
    /// New party location, if the party moved
    #[serde(default)]
    pub location: Option<String>,
    /// Conditions affecting the whole party after this round
    #[serde(default)]
    #[schema(optional)]
    pub group_conditions: Vec<String>,
}

impl StructuredOutput for Resolution {
    fn output_name() -> &'static str {
        Self::schema_name()
    }

    fn output_schema() -> Value {
        Self::json_schema()
    }

    fn validate(&self) -> Result<(), String> {
        if self.scene.trim().is_empty() {
            return Err("resolution has an empty scene".into());
        }
        if let Some((name, _)) = self
            .outcomes
            .iter()
            .find(|(_, o)| o.outcome.trim().is_empty())
        {
            return Err(format!("outcome for {name} is empty"));
        }
        for (name, outcome) in &self.outcomes {
            if let Some(key) = outcome
                .state_changes
                .iter()
                .find(|(_, v)| v.is_array() || v.is_object())
                .map(|(k, _)| k)
            {
                return Err(format!("state change '{key}' for {name} is not a scalar"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// ActionResult
// ============================================================================

/// The adjudicated outcome of one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub character: String,
    pub action: String,
    pub outcome: String,
    pub success: bool,
    /// 0 when the roll was skipped.
    pub roll: u32,
    pub assessment: DifficultyAssessment,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub state_changes: BTreeMap<String, Value>,
}

impl ActionResult {
    pub fn describe(&self) -> String {
        let verdict = if self.success { "success" } else { "failure" };
        format!(
            "{} ({}, {}, roll {}): {}",
            self.character, self.assessment.difficulty, verdict, self.roll, self.outcome
        )
    }
}

// ============================================================================
// PlayerFeedback
// ============================================================================

/// How strongly a party member backs a proposed action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, OutputSchema)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    StrongSupport,
    Support,
    Neutral,
    Concern,
    StrongConcern,
}

/// A party member's reaction to another character's proposed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, OutputSchema)]
#[schema(name = "player_feedback")]
pub struct PlayerFeedback {
    /// Level of support for the proposal
    pub support_level: SupportLevel,
    /// Reasoning behind the support level
    pub reasoning: String,
    /// Alternative or refinement to suggest
    #[serde(default)]
    pub suggestion: Option<String>,
    /// Specific worries about the proposal
    #[serde(default)]
    #[schema(optional)]
    pub concerns: Vec<String>,
    /// How the proposal looks from this character's point of view
    #[serde(default)]
    #[schema(optional)]
    pub character_perspective: String,
}

impl StructuredOutput for PlayerFeedback {
    fn output_name() -> &'static str {
        Self::schema_name()
    }

    fn output_schema() -> Value {
        Self::json_schema()
    }

    fn validate(&self) -> Result<(), String> {
        if self.reasoning.trim().is_empty() {
            return Err("feedback has no reasoning".into());
        }
        Ok(())
    }
}

// ============================================================================
// Chronicler outputs
// ============================================================================

/// The Chronicler's record of one round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, OutputSchema)]
#[schema(name = "round_summary")]
pub struct RoundSummary {
    /// The most important things that happened
    pub key_events: Vec<String>,
    /// One status line per character
    #[serde(default)]
    pub party_state: BTreeMap<String, String>,
    /// How the surroundings changed
    #[serde(default)]
    pub environment_changes: Vec<String>,
    /// Consequences that will matter later
    #[serde(default)]
    pub important_consequences: Vec<String>,
    /// Where the story is heading
    #[serde(default)]
    pub narrative_focus: String,
    /// Open questions and unfinished business
    #[serde(default)]
    #[schema(optional)]
    pub unresolved_threads: Vec<String>,
    /// Facts the party learned
    #[serde(default)]
    #[schema(optional)]
    pub discovered_information: Vec<String>,
    /// Shifts in how characters relate to each other or to NPCs
    #[serde(default)]
    #[schema(optional)]
    pub relationship_changes: Vec<String>,
}

impl RoundSummary {
    /// Render as a compact block for prompts.
    pub fn to_prompt(&self) -> String {
        let mut lines = Vec::new();
        push_list(&mut lines, "Key events", &self.key_events);
        push_list(&mut lines, "Environment", &self.environment_changes);
        push_list(&mut lines, "Consequences", &self.important_consequences);
        push_list(&mut lines, "Discovered", &self.discovered_information);
        push_list(&mut lines, "Unresolved", &self.unresolved_threads);
        if !self.party_state.is_empty() {
            lines.push("Party:".to_string());
            for (name, state) in &self.party_state {
                lines.push(format!("- {name}: {state}"));
            }
        }
        if !self.narrative_focus.is_empty() {
            lines.push(format!("Focus: {}", self.narrative_focus));
        }
        lines.join("\n")
    }
}

impl StructuredOutput for RoundSummary {
    fn output_name() -> &'static str {
        Self::schema_name()
    }

    fn output_schema() -> Value {
        Self::json_schema()
    }

    fn validate(&self) -> Result<(), String> {
        if self.key_events.iter().all(|e| e.trim().is_empty()) {
            return Err("round summary lists no key events".into());
        }
        Ok(())
    }
}

/// Long-term memory distilled from older round summaries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, OutputSchema)]
#[schema(name = "chronicle_memory")]
pub struct ChronicleMemory {
    /// Story beats worth remembering
    #[serde(default)]
    pub narrative: Vec<String>,
    /// Positions, resources and threats
    #[serde(default)]
    pub tactical: Vec<String>,
    /// Developments per character name
    #[serde(default)]
    pub character: BTreeMap<String, Vec<String>>,
    /// Consequences still in play
    #[serde(default)]
    pub consequences: Vec<String>,
}

impl ChronicleMemory {
    pub fn is_empty(&self) -> bool {
        self.narrative.is_empty()
            && self.tactical.is_empty()
            && self.character.is_empty()
            && self.consequences.is_empty()
    }

    pub fn to_prompt(&self) -> String {
        let mut lines = Vec::new();
        push_list(&mut lines, "Story so far", &self.narrative);
        push_list(&mut lines, "Tactical", &self.tactical);
        for (name, notes) in &self.character {
            push_list(&mut lines, name, notes);
        }
        push_list(&mut lines, "Ongoing consequences", &self.consequences);
        lines.join("\n")
    }
}

impl StructuredOutput for ChronicleMemory {
    fn output_name() -> &'static str {
        Self::schema_name()
    }

    fn output_schema() -> Value {
        Self::json_schema()
    }

    fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("compressed memory is empty".into());
        }
        Ok(())
    }
}

fn push_list(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("{title}:"));
    lines.extend(items.iter().map(|i| format!("- {i}")));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_difficulty_chances() {
        assert_eq!(Difficulty::Easy.success_chance(), Some(80));
        assert_eq!(Difficulty::Average.success_chance(), Some(60));
        assert_eq!(Difficulty::Hard.success_chance(), Some(40));
        assert_eq!(Difficulty::SuperHard.success_chance(), Some(20));
        assert_eq!(Difficulty::AlwaysFail.success_chance(), None);
    }

    #[test]
    fn test_difficulty_schema_lists_variants() {
        let schema = Difficulty::json_schema();
        assert_eq!(schema["type"], "string");
        assert_eq!(
            schema["enum"],
            json!(["always_succeed", "easy", "average", "hard", "super_hard", "always_fail"])
        );
        assert_eq!(serde_json::to_value(Difficulty::SuperHard).unwrap(), json!("super_hard"));
    }

    #[test]
    fn test_assessment_schema() {
        let schema = DifficultyAssessment::json_schema();
        assert_eq!(DifficultyAssessment::schema_name(), "difficulty_assessment");
        assert_eq!(schema["properties"]["difficulty"]["type"], "string");
        assert_eq!(schema["properties"]["modifiers"]["additionalProperties"]["type"], "integer");
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("difficulty")));
        assert!(!required.contains(&json!("auto_resolve")));
    }

    #[test]
    fn test_intent_schema_leaves_character_optional() {
        let schema = Intent::json_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("action")));
        assert!(!required.contains(&json!("character")));
        assert!(!required.contains(&json!("target")));
        assert_eq!(
            schema["description"],
            "What a character is trying to do this round"
        );
    }

    #[test]
    fn test_resolution_schema_nests_outcomes() {
        let schema = Resolution::json_schema();
        let outcome = &schema["properties"]["outcomes"]["additionalProperties"];
        assert_eq!(outcome["type"], "object");
        assert_eq!(outcome["properties"]["outcome"]["type"], "string");
    }

    #[test]
    fn test_skips_roll() {
        let mut assessment = DifficultyAssessment::new(Difficulty::Hard, "slippery");
        assert!(!assessment.skips_roll());
        assessment.auto_resolve = true;
        assert!(assessment.skips_roll());
        assert!(DifficultyAssessment::new(Difficulty::AlwaysFail, "no").skips_roll());
    }

    #[test]
    fn test_intent_validation() {
        assert!(Intent::new("Eldara", "  ").validate().is_err());
        assert!(Intent::new("Eldara", "Read the runes").validate().is_ok());
    }

    #[test]
    fn test_resolution_rejects_nested_state_changes() {
        let resolution: Resolution = serde_json::from_value(json!({
            "outcomes": {
                "Brussae": {"outcome": "Blocks the blow", "state_changes": {"gear": ["shield"]}}
            },
            "scene": "Dust settles."
        }))
        .unwrap();
        let err = resolution.validate().unwrap_err();
        assert!(err.contains("gear"));
    }

    #[test]
    fn test_feedback_parses_minimal_reply() {
        let feedback: PlayerFeedback = serde_json::from_value(json!({
            "support_level": "strong_concern",
            "reasoning": "It's a trap."
        }))
        .unwrap();
        assert_eq!(feedback.support_level, SupportLevel::StrongConcern);
        assert!(feedback.concerns.is_empty());
        assert!(feedback.validate().is_ok());
    }

    #[test]
    fn test_summary_requires_events() {
        assert!(RoundSummary::default().validate().is_err());
        let summary = RoundSummary {
            key_events: vec!["The door opened".into()],
            narrative_focus: "The crypt".into(),
            ..Default::default()
        };
        assert!(summary.validate().is_ok());
        assert!(summary.to_prompt().contains("Focus: The crypt"));
    }

    #[test]
    fn test_intent_describe() {
        let intent = Intent::new("Shadowstep", "Pick the lock").with_target("crypt door");
        assert_eq!(intent.describe(), "Shadowstep: Pick the lock (target: crypt door)");
    }
}
