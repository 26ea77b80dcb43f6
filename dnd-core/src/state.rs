//! Game state and round history.
//!
//! [`GameState`] is owned by the Game Master and only changes between
//! rounds. Completed [`Round`]s are appended to `history` and never edited.

use crate::actions::{ActionResult, ChronicleMemory, CharacterOutcome, Intent, RoundSummary};
use crate::character::{Character, CharacterError, PartyMember};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Most recent context entries kept in `active_context`.
pub const MAX_ACTIVE_CONTEXT: usize = 10;

/// Violations of the state's structural rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("The party has no members")]
    EmptyParty,

    #[error("Duplicate character name: {0}")]
    DuplicateCharacter(String),

    #[error("Unknown character: {0}")]
    UnknownCharacter(String),

    #[error("Round counter is {round} but history holds {history} rounds")]
    RoundCounterMismatch { round: u32, history: usize },

    #[error("Expected round {expected}, found round {found}")]
    RoundNumberGap { expected: u32, found: u32 },

    #[error("Round {round}: results for {results:?} do not match intents for {intents:?}")]
    ResultsMismatch {
        round: u32,
        intents: Vec<String>,
        results: Vec<String>,
    },

    #[error("{name}: {source}")]
    InvalidCharacter {
        name: String,
        #[source]
        source: CharacterError,
    },
}

/// Where the party is and what is affecting it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyStatus {
    pub location: String,
    /// Active conditions per character name.
    #[serde(default)]
    pub conditions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub group_conditions: Vec<String>,
    /// Resources spent per character name.
    #[serde(default)]
    pub resources_used: BTreeMap<String, Vec<String>>,
}

impl PartyStatus {
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    pub fn to_prompt(&self) -> String {
        let mut lines = vec![format!("Location: {}", self.location)];
        if !self.group_conditions.is_empty() {
            lines.push(format!("Party conditions: {}", self.group_conditions.join(", ")));
        }
        for (name, conditions) in &self.conditions {
            if !conditions.is_empty() {
                lines.push(format!("{name}: {}", conditions.join(", ")));
            }
        }
        lines.join("\n")
    }
}

/// One completed cycle of intents, resolution and summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub number: u32,
    /// The scene the round started from.
    pub scene: String,
    pub intents: BTreeMap<String, Intent>,
    pub results: BTreeMap<String, ActionResult>,
    pub summary: RoundSummary,
    /// Narration in the order it happened.
    #[serde(default)]
    pub events: Vec<String>,
}

impl Round {
    /// Results must cover exactly the characters that declared intents.
    pub fn check_complete(&self) -> Result<(), StateError> {
        let intents: Vec<&String> = self.intents.keys().collect();
        let results: Vec<&String> = self.results.keys().collect();
        if intents != results {
            return Err(StateError::ResultsMismatch {
                round: self.number,
                intents: intents.into_iter().cloned().collect(),
                results: results.into_iter().cloned().collect(),
            });
        }
        Ok(())
    }
}

/// Everything needed to continue a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub campaign: String,
    /// Completed rounds. 0 before the first round.
    pub round: u32,
    /// Seating order.
    pub party: Vec<PartyMember>,
    pub history: Vec<Round>,
    pub scene: String,
    pub party_status: PartyStatus,
    /// Recent notable happenings, newest last.
    #[serde(default)]
    pub active_context: Vec<String>,
    /// Older rounds folded down by the Chronicler.
    #[serde(default)]
    pub memory: ChronicleMemory,
    /// Rounds `1..=compressed_through` are represented in `memory`.
    #[serde(default)]
    pub compressed_through: u32,
}

impl GameState {
    pub fn new(
        campaign: impl Into<String>,
        party: Vec<PartyMember>,
        scene: impl Into<String>,
        party_status: PartyStatus,
    ) -> Self {
        Self {
            campaign: campaign.into(),
            round: 0,
            party,
            history: Vec::new(),
            scene: scene.into(),
            party_status,
            active_context: Vec::new(),
            memory: ChronicleMemory::default(),
            compressed_through: 0,
        }
    }

    /// Check the structural rules that must hold between rounds.
    pub fn validate(&self) -> Result<(), StateError> {
        if self.party.is_empty() {
            return Err(StateError::EmptyParty);
        }

        let mut seen = BTreeSet::new();
        for member in &self.party {
            if !seen.insert(member.name()) {
                return Err(StateError::DuplicateCharacter(member.name().to_string()));
            }
            member
                .character
                .check()
                .and_then(|_| member.personality.validate())
                .map_err(|source| StateError::InvalidCharacter {
                    name: member.name().to_string(),
                    source,
                })?;
        }

        if self.round as usize != self.history.len() {
            return Err(StateError::RoundCounterMismatch {
                round: self.round,
                history: self.history.len(),
            });
        }

        for (i, round) in self.history.iter().enumerate() {
            let expected = i as u32 + 1;
            if round.number != expected {
                return Err(StateError::RoundNumberGap {
                    expected,
                    found: round.number,
                });
            }
            round.check_complete()?;
        }

        Ok(())
    }

    /// Number of the round that would be played next.
    pub fn next_round(&self) -> u32 {
        self.round + 1
    }

    /// Append a completed round and advance the counter.
    pub fn push_round(&mut self, round: Round) -> Result<(), StateError> {
        let expected = self.next_round();
        if round.number != expected {
            return Err(StateError::RoundNumberGap {
                expected,
                found: round.number,
            });
        }
        round.check_complete()?;
        self.history.push(round);
        self.round = expected;
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.party.iter().map(|m| m.name()).collect()
    }

    pub fn member(&self, name: &str) -> Option<&PartyMember> {
        self.party.iter().find(|m| m.name() == name)
    }

    pub fn character_mut(&mut self, name: &str) -> Option<&mut Character> {
        self.party
            .iter_mut()
            .find(|m| m.name() == name)
            .map(|m| &mut m.character)
    }

    /// Record a context entry, dropping the oldest beyond the cap.
    pub fn add_context(&mut self, entry: impl Into<String>) {
        self.active_context.push(entry.into());
        if self.active_context.len() > MAX_ACTIVE_CONTEXT {
            let excess = self.active_context.len() - MAX_ACTIVE_CONTEXT;
            self.active_context.drain(..excess);
        }
    }

    /// Apply one character's adjudicated outcome.
    pub fn apply_outcome(
        &mut self,
        name: &str,
        outcome: &CharacterOutcome,
    ) -> Result<(), StateError> {
        let character = self
            .character_mut(name)
            .ok_or_else(|| StateError::UnknownCharacter(name.to_string()))?;
        character.apply_status(&outcome.state_changes);

        let flags: Vec<String> = character
            .status
            .iter()
            .filter(|(_, v)| **v == Value::Bool(true))
            .map(|(k, _)| k.clone())
            .collect();
        if flags.is_empty() {
            self.party_status.conditions.remove(name);
        } else {
            self.party_status.conditions.insert(name.to_string(), flags);
        }

        if !outcome.resources_used.is_empty() {
            self.party_status
                .resources_used
                .entry(name.to_string())
                .or_default()
                .extend(outcome.resources_used.iter().cloned());
        }
        Ok(())
    }

    /// The most recent `lookback` rounds, oldest first.
    pub fn recent_rounds(&self, lookback: usize) -> &[Round] {
        let start = self.history.len().saturating_sub(lookback);
        &self.history[start..]
    }

    /// Rounds summarized but not yet folded into long-term memory.
    pub fn uncompressed_rounds(&self) -> &[Round] {
        let start = (self.compressed_through as usize).min(self.history.len());
        &self.history[start..]
    }

    /// History context for agent prompts: long-term memory, the last
    /// `lookback` round summaries, then the active context.
    pub fn relevant_context(&self, lookback: usize) -> String {
        let mut sections = Vec::new();

        if !self.memory.is_empty() {
            sections.push(format!("Long-term memory:\n{}", self.memory.to_prompt()));
        }

        for round in self.recent_rounds(lookback) {
            sections.push(format!(
                "Round {}:\n{}",
                round.number,
                round.summary.to_prompt()
            ));
        }

        if !self.active_context.is_empty() {
            let recent: Vec<String> = self
                .active_context
                .iter()
                .map(|c| format!("- {c}"))
                .collect();
            sections.push(format!("Recent:\n{}", recent.join("\n")));
        }

        if sections.is_empty() {
            "The adventure is just beginning.".to_string()
        } else {
            sections.join("\n\n")
        }
    }

    /// Prompt block describing every party member.
    pub fn party_prompt(&self) -> String {
        self.party
            .iter()
            .map(|m| m.character.to_prompt())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// A readable overview of the campaign so far.
    pub fn summary(&self) -> String {
        let mut sections = vec![
            "=== Game Summary ===".to_string(),
            format!("Campaign: {}", self.campaign),
            format!("Rounds completed: {}", self.round),
        ];

        let recent: Vec<String> = self
            .recent_rounds(3)
            .iter()
            .filter(|r| !r.summary.narrative_focus.is_empty())
            .map(|r| format!("Round {}: {}", r.number, r.summary.narrative_focus))
            .collect();
        if !recent.is_empty() {
            sections.push(format!("Recent developments:\n{}", recent.join("\n")));
        }

        let last = self.history.last();
        let party: Vec<String> = self
            .party
            .iter()
            .map(|m| {
                let action = last
                    .and_then(|r| r.results.get(m.name()))
                    .map(|r| r.describe())
                    .unwrap_or_else(|| "No action yet".to_string());
                format!("{}: {action}", m.name())
            })
            .collect();
        sections.push(format!("Party status:\n{}", party.join("\n")));
        sections.push(format!(
            "Current situation ({}):\n{}",
            self.party_status.location, self.scene
        ));
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Difficulty, DifficultyAssessment};
    use crate::character::PersonalityProfile;
    use serde_json::json;

    fn member(name: &str) -> PartyMember {
        let character = Character::new(name, 1, "Fighter", "Dwarf")
            .unwrap()
            .with_key_abilities(["combat"]);
        let personality = PersonalityProfile::new(
            vec!["gruff".into()],
            vec!["honor".into()],
            vec!["clan".into()],
            vec!["stubborn".into()],
        );
        PartyMember::new(character, personality)
    }

    fn state() -> GameState {
        GameState::new(
            "Test",
            vec![member("Ada"), member("Bo")],
            "A quiet road.",
            PartyStatus::at("Road"),
        )
    }

    fn round(number: u32, names: &[&str], resolved: &[&str]) -> Round {
        let intents = names
            .iter()
            .map(|n| (n.to_string(), Intent::new(*n, "wait")))
            .collect();
        let results = resolved
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    ActionResult {
                        character: n.to_string(),
                        action: "wait".into(),
                        outcome: "waits".into(),
                        success: true,
                        roll: 0,
                        assessment: DifficultyAssessment::new(Difficulty::AlwaysSucceed, "idle"),
                        reasoning: None,
                        state_changes: BTreeMap::new(),
                    },
                )
            })
            .collect();
        Round {
            number,
            scene: String::new(),
            intents,
            results,
            summary: RoundSummary {
                key_events: vec![format!("round {number}")],
                ..Default::default()
            },
            events: vec![],
        }
    }

    #[test]
    fn test_new_state_is_valid() {
        let state = state();
        assert_eq!(state.round, 0);
        assert!(state.validate().is_ok());
        assert_eq!(state.names(), vec!["Ada", "Bo"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut state = state();
        state.party.push(member("Ada"));
        assert_eq!(
            state.validate(),
            Err(StateError::DuplicateCharacter("Ada".into()))
        );
    }

    #[test]
    fn test_push_round_advances() {
        let mut state = state();
        state.push_round(round(1, &["Ada", "Bo"], &["Ada", "Bo"])).unwrap();
        state.push_round(round(2, &["Ada", "Bo"], &["Ada", "Bo"])).unwrap();
        assert_eq!(state.round, 2);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_push_round_rejects_gap() {
        let mut state = state();
        let err = state
            .push_round(round(2, &["Ada"], &["Ada"]))
            .unwrap_err();
        assert_eq!(err, StateError::RoundNumberGap { expected: 1, found: 2 });
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_push_round_rejects_missing_result() {
        let mut state = state();
        let err = state
            .push_round(round(1, &["Ada", "Bo"], &["Ada"]))
            .unwrap_err();
        assert!(matches!(err, StateError::ResultsMismatch { round: 1, .. }));
        assert_eq!(state.round, 0);
    }

    #[test]
    fn test_validate_catches_counter_drift() {
        let mut state = state();
        state.round = 3;
        assert!(matches!(
            state.validate(),
            Err(StateError::RoundCounterMismatch { round: 3, history: 0 })
        ));
    }

    #[test]
    fn test_active_context_is_capped() {
        let mut state = state();
        for i in 0..15 {
            state.add_context(format!("event {i}"));
        }
        assert_eq!(state.active_context.len(), MAX_ACTIVE_CONTEXT);
        assert_eq!(state.active_context[0], "event 5");
        assert_eq!(state.active_context[9], "event 14");
    }

    #[test]
    fn test_apply_outcome_tracks_conditions_and_resources() {
        let mut state = state();
        let outcome = CharacterOutcome {
            outcome: "Poisoned by a needle trap".into(),
            state_changes: BTreeMap::from([
                ("poisoned".to_string(), json!(true)),
                ("hp".to_string(), json!(4)),
            ]),
            resources_used: vec!["antitoxin".into()],
        };
        state.apply_outcome("Ada", &outcome).unwrap();
        assert_eq!(state.party_status.conditions["Ada"], vec!["poisoned"]);
        assert_eq!(state.party_status.resources_used["Ada"], vec!["antitoxin"]);

        let cured = CharacterOutcome {
            outcome: "Recovers".into(),
            state_changes: BTreeMap::from([("poisoned".to_string(), json!(false))]),
            resources_used: vec![],
        };
        state.apply_outcome("Ada", &cured).unwrap();
        assert!(!state.party_status.conditions.contains_key("Ada"));
        assert_eq!(state.member("Ada").unwrap().character.status["hp"], json!(4));

        assert_eq!(
            state.apply_outcome("Zed", &cured),
            Err(StateError::UnknownCharacter("Zed".into()))
        );
    }

    #[test]
    fn test_relevant_context() {
        let mut state = state();
        assert_eq!(state.relevant_context(3), "The adventure is just beginning.");

        for n in 1..=4 {
            state.push_round(round(n, &["Ada"], &["Ada"])).unwrap();
        }
        state.add_context("Ada found a key");
        let context = state.relevant_context(2);
        assert!(!context.contains("Round 2:"));
        assert!(context.contains("Round 3:"));
        assert!(context.contains("Round 4:"));
        assert!(context.contains("- Ada found a key"));

        state.compressed_through = 3;
        assert_eq!(state.uncompressed_rounds().len(), 1);
    }

    #[test]
    fn test_summary_lists_recent_rounds_and_party() {
        let mut state = state();
        let fresh = state.summary();
        assert!(fresh.contains("Rounds completed: 0"));
        assert!(fresh.contains("Ada: No action yet"));
        assert!(!fresh.contains("Recent developments"));

        let mut first = round(1, &["Ada", "Bo"], &["Ada", "Bo"]);
        first.summary.narrative_focus = "The road splits".into();
        state.push_round(first).unwrap();

        let summary = state.summary();
        assert!(summary.contains("Campaign: Test"));
        assert!(summary.contains("Rounds completed: 1"));
        assert!(summary.contains("Round 1: The road splits"));
        assert!(summary.contains("Ada: Ada (always_succeed, success, roll 0): waits"));
        assert!(summary.contains("Current situation (Road):\nA quiet road."));
    }
}
