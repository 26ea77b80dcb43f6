//! The Dungeon Master agent.
//!
//! Describes scenes, answers questions, judges difficulty and adjudicates the
//! party's actions once the dice are rolled.

use super::{AgentCore, AgentError, Task, TaskError, TaskInputs, TextGenerator};
use crate::actions::{DifficultyAssessment, Intent, Resolution};
use crate::character::PartyMember;
use crate::config::{AgentSettings, DmStyle, RetryPolicy};
use crate::dice::SuccessRoll;
use crate::state::GameState;
use std::collections::BTreeSet;
use std::sync::Arc;

const DESCRIBE_SITUATION: Task = Task::new(
    "describe_situation",
    "It is {character_name}'s turn. Describe the current situation to them.",
    include_str!("prompts/dm_describe_situation.txt"),
    "A concise description of what the character perceives",
);

const ANSWER_QUESTIONS: Task = Task::new(
    "answer_questions",
    "Answer {character_name}'s questions about the situation, precisely and without revealing hidden information.",
    include_str!("prompts/dm_answer_questions.txt"),
    "One short answer per line, in the order the questions were asked",
);

const ASSESS_DIFFICULTY: Task = Task::new(
    "assess_difficulty",
    "Assess the difficulty of {character_name}'s proposed action.",
    include_str!("prompts/dm_assess_difficulty.txt"),
    "A difficulty assessment with reasoning and key factors",
);

const RESOLVE_ACTIONS: Task = Task::new(
    "resolve_actions",
    "Adjudicate every declared action of round {round_number}.",
    include_str!("prompts/dm_resolve_actions.txt"),
    "One outcome per acting character plus the resulting scene",
);

/// An intent with its assessed difficulty and the roll made against it.
#[derive(Debug, Clone, PartialEq)]
pub struct RolledAction {
    pub intent: Intent,
    pub assessment: DifficultyAssessment,
    pub roll: SuccessRoll,
}

impl RolledAction {
    fn to_prompt(&self) -> String {
        let mut lines = vec![
            format!("- {}", self.intent.describe()),
            format!(
                "  Difficulty: {} ({})",
                self.assessment.difficulty, self.assessment.reasoning
            ),
        ];
        if !self.assessment.key_factors.is_empty() {
            lines.push(format!(
                "  Key factors: {}",
                self.assessment.key_factors.join("; ")
            ));
        }
        let verdict = if self.roll.success { "SUCCESS" } else { "FAILURE" };
        if self.roll.skipped {
            lines.push(format!("  No roll needed: {verdict}"));
        } else {
            lines.push(format!(
                "  Roll: {} against {}: {verdict}",
                self.roll.roll,
                self.assessment.difficulty.success_chance().unwrap_or(0)
            ));
        }
        lines.join("\n")
    }
}

/// The Dungeon Master.
#[derive(Debug, Clone)]
pub struct DmAgent {
    core: AgentCore,
    lookback: usize,
}

impl DmAgent {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        settings: AgentSettings,
        style: &DmStyle,
    ) -> Result<Self, TaskError> {
        let system = super::task::fill(
            "dm_system",
            include_str!("prompts/dm_system.txt"),
            &TaskInputs::new()
                .with("description_style", &style.description_style)
                .with("combat_style", &style.combat_style)
                .with("narrative_style", &style.narrative_style)
                .with("difficulty_style", &style.difficulty_style),
        )?;
        Ok(Self {
            core: AgentCore::new("Dungeon Master", system, settings, generator),
            lookback: 3,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.core = self.core.with_retry(retry);
        self
    }

    pub fn with_abort(mut self, abort: super::AbortHandle) -> Self {
        self.core = self.core.with_abort(abort);
        self
    }

    /// Past rounds included in prompts.
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    /// Describe the scene from one character's point of view.
    pub async fn describe_situation(
        &self,
        state: &GameState,
        member: &PartyMember,
        previous_action: Option<&str>,
    ) -> Result<String, AgentError> {
        let others = state
            .party
            .iter()
            .filter(|m| m.name() != member.name())
            .map(|m| m.character.to_prompt())
            .collect::<Vec<_>>()
            .join("\n\n");

        let inputs = TaskInputs::new()
            .with("character_name", member.name())
            .with("character", member.character.to_prompt())
            .with("other_characters", non_empty(others, "None"))
            .with("situation", &state.scene)
            .with("context", state.relevant_context(self.lookback))
            .with("previous_action", previous_action.unwrap_or("None"));

        self.core.run_text(&DESCRIBE_SITUATION, &inputs).await
    }

    /// Answer a character's questions, one answer per line.
    pub async fn answer_questions(
        &self,
        state: &GameState,
        member: &PartyMember,
        situation: &str,
        questions: &[String],
    ) -> Result<String, AgentError> {
        let numbered = questions
            .iter()
            .enumerate()
            .map(|(i, q)| format!("{}. {q}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let inputs = TaskInputs::new()
            .with("character_name", member.name())
            .with("character", member.character.to_prompt())
            .with("situation", situation)
            .with("questions", numbered)
            .with("context", state.relevant_context(self.lookback));

        self.core.run_text(&ANSWER_QUESTIONS, &inputs).await
    }

    /// Judge how hard an intended action is.
    pub async fn assess_difficulty(
        &self,
        state: &GameState,
        member: &PartyMember,
        situation: &str,
        intent: &Intent,
    ) -> Result<DifficultyAssessment, AgentError> {
        let inputs = TaskInputs::new()
            .with("character_name", member.name())
            .with("character", member.character.to_prompt())
            .with("situation", situation)
            .with("action", intent.describe())
            .with("context", state.relevant_context(self.lookback));

        self.core.run_structured(&ASSESS_DIFFICULTY, &inputs).await
    }

    /// Adjudicate all rolled actions of a round in one call.
    ///
    /// The returned resolution has exactly one outcome per acting character;
    /// anything else is treated as an unusable reply.
    pub async fn resolve_actions(
        &self,
        state: &GameState,
        round_number: u32,
        actions: &[RolledAction],
    ) -> Result<Resolution, AgentError> {
        let expected: BTreeSet<String> = actions
            .iter()
            .map(|a| a.intent.character.clone())
            .collect();

        let inputs = TaskInputs::new()
            .with("round_number", round_number.to_string())
            .with("situation", &state.scene)
            .with("party", state.party_prompt())
            .with("party_status", state.party_status.to_prompt())
            .with("context", state.relevant_context(self.lookback))
            .with(
                "actions",
                actions
                    .iter()
                    .map(RolledAction::to_prompt)
                    .collect::<Vec<_>>()
                    .join("\n"),
            );

        self.core
            .run_checked(&RESOLVE_ACTIONS, &inputs, |resolution: &Resolution| {
                check_outcome_keys(resolution, &expected)
            })
            .await
    }
}

fn check_outcome_keys(resolution: &Resolution, expected: &BTreeSet<String>) -> Result<(), String> {
    let actual: BTreeSet<&String> = resolution.outcomes.keys().collect();
    let missing: Vec<&str> = expected
        .iter()
        .filter(|name| !actual.contains(name))
        .map(String::as_str)
        .collect();
    let unexpected: Vec<&str> = actual
        .iter()
        .filter(|name| !expected.contains(name.as_str()))
        .map(|name| name.as_str())
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }
    Err(format!(
        "outcomes must cover exactly the acting characters (missing: [{}], unexpected: [{}])",
        missing.join(", "),
        unexpected.join(", ")
    ))
}

fn non_empty(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{CharacterOutcome, Difficulty};
    use crate::agent::ParseError;
    use crate::scenario::Scenario;
    use crate::testing::ScriptedGenerator;
    use serde_json::json;

    fn dm(generator: &Arc<ScriptedGenerator>) -> DmAgent {
        DmAgent::new(generator.clone(), AgentSettings::new(0.7), &DmStyle::default()).unwrap()
    }

    fn rolled(name: &str, success: bool) -> RolledAction {
        RolledAction {
            intent: Intent::new(name, "Search the altar"),
            assessment: DifficultyAssessment::new(Difficulty::Average, "dusty"),
            roll: SuccessRoll {
                roll: if success { 12 } else { 88 },
                success,
                skipped: false,
            },
        }
    }

    #[test]
    fn test_system_prompt_uses_style() {
        let generator = Arc::new(ScriptedGenerator::new());
        let style = DmStyle {
            combat_style: "brutal and quick".into(),
            ..DmStyle::default()
        };
        let dm = DmAgent::new(generator, AgentSettings::new(0.7), &style).unwrap();
        let system = dm.core().system_prompt();
        assert!(system.contains("Combat: brutal and quick"));
        assert!(system.contains("Descriptions: vivid and atmospheric"));
        assert!(!system.contains('{'));
    }

    #[test]
    fn test_rolled_action_prompt() {
        let prompt = rolled("Eldara", false).to_prompt();
        assert!(prompt.contains("Eldara: Search the altar"));
        assert!(prompt.contains("Roll: 88 against 60: FAILURE"));
    }

    #[test]
    fn test_outcome_keys_must_match() {
        let expected: BTreeSet<String> = ["Ada".to_string(), "Bo".to_string()].into();
        let outcome = CharacterOutcome {
            outcome: "fine".into(),
            state_changes: Default::default(),
            resources_used: vec![],
        };
        let mut resolution = Resolution {
            outcomes: [("Ada".to_string(), outcome.clone())].into(),
            scene: "x".into(),
            location: None,
            group_conditions: vec![],
        };
        let err = check_outcome_keys(&resolution, &expected).unwrap_err();
        assert!(err.contains("missing: [Bo]"));

        resolution.outcomes.insert("Bo".into(), outcome.clone());
        assert!(check_outcome_keys(&resolution, &expected).is_ok());

        resolution.outcomes.insert("Cy".into(), outcome);
        let err = check_outcome_keys(&resolution, &expected).unwrap_err();
        assert!(err.contains("unexpected: [Cy]"));
    }

    #[tokio::test]
    async fn test_describe_situation_prompt() {
        let state = Scenario::crimson_crypt().into_state();
        let generator = Arc::new(
            ScriptedGenerator::new().with_reply("describe_situation", "Cold air spills out."),
        );
        let text = dm(&generator)
            .describe_situation(&state, &state.party[1], None)
            .await
            .unwrap();
        assert_eq!(text, "Cold air spills out.");

        let request = &generator.requests()[0];
        assert!(request.prompt.starts_with("It is Shadowstep's turn."));
        assert!(request.prompt.contains("Name: Brussae"));
        assert!(request.prompt.contains("Most recent action in the party:\nNone"));
        assert!(request.system.contains("Dungeon Master"));
    }

    #[tokio::test]
    async fn test_resolve_actions_retries_on_missing_character() {
        let state = Scenario::crimson_crypt().into_state();
        let partial = json!({
            "outcomes": {"Brussae": {"outcome": "The door groans open."}},
            "scene": "The crypt yawns open."
        });
        let complete = json!({
            "outcomes": {
                "Brussae": {"outcome": "The door groans open.", "state_changes": {"winded": true}},
                "Eldara": {"outcome": "The runes stay silent."}
            },
            "scene": "The crypt yawns open."
        });
        let generator = Arc::new(
            ScriptedGenerator::new()
                .with_reply("resolve_actions", partial.to_string())
                .with_reply("resolve_actions", complete.to_string()),
        );

        let actions = vec![rolled("Brussae", true), rolled("Eldara", false)];
        let resolution = dm(&generator)
            .resolve_actions(&state, 1, &actions)
            .await
            .unwrap();
        assert_eq!(resolution.outcomes.len(), 2);
        assert_eq!(
            resolution.outcomes["Brussae"].state_changes["winded"],
            json!(true)
        );

        let requests = generator.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].prompt.contains("missing: [Eldara]"));
    }

    #[tokio::test]
    async fn test_resolve_actions_gives_up_after_retry() {
        let state = Scenario::crimson_crypt().into_state();
        let generator = Arc::new(
            ScriptedGenerator::new().with_replies("resolve_actions", ["{}", "{}"]),
        );
        let err = dm(&generator)
            .resolve_actions(&state, 1, &[rolled("Brussae", true)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::Parse {
                source: ParseError::Json(_),
                attempts: 2,
                ..
            }
        ));
    }
}
