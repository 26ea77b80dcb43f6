//! Testing utilities.
//!
//! This module provides tools for deterministic tests without API calls:
//! - `ScriptedGenerator`, a [`TextGenerator`] that replays canned replies per
//!   task and records every request it receives
//! - helpers that script whole rounds for a party
//! - a ready-made party and configuration

use crate::agent::{GenerationError, GenerationRequest, TextGenerator};
use crate::config::GameConfig;
use crate::scenario::Scenario;
use crate::state::GameState;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

type Reply = Result<String, GenerationError>;

/// A text generator that returns scripted replies in order, per task name.
///
/// A task with no replies left fails with a [`GenerationError`], which the
/// agents surface as an external-service error.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `task`.
    pub fn with_reply(self, task: &str, reply: impl Into<String>) -> Self {
        self.push(task, Ok(reply.into()));
        self
    }

    /// Queue several replies for `task`.
    pub fn with_replies<S: Into<String>>(
        self,
        task: &str,
        replies: impl IntoIterator<Item = S>,
    ) -> Self {
        for reply in replies {
            self.push(task, Ok(reply.into()));
        }
        self
    }

    /// Queue a service failure for `task`.
    pub fn with_failure(self, task: &str, message: impl Into<String>) -> Self {
        self.push(task, Err(GenerationError(message.into())));
        self
    }

    /// Queue a reply on a generator that is already shared.
    pub fn push(&self, task: &str, reply: Reply) {
        lock(&self.replies)
            .entry(task.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    /// Requests received for one task.
    pub fn requests_for(&self, task: &str) -> Vec<GenerationRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.task == task)
            .cloned()
            .collect()
    }

    /// Replies still queued for `task`.
    pub fn remaining(&self, task: &str) -> usize {
        lock(&self.replies).get(task).map_or(0, VecDeque::len)
    }

    /// Replies still queued across all tasks.
    pub fn remaining_total(&self) -> usize {
        lock(&self.replies).values().map(VecDeque::len).sum()
    }

    /// Script one quick-mode round in which every named character acts.
    ///
    /// Every action is `average` difficulty; the resolution and summary
    /// mention the round number so rounds can be told apart.
    pub fn script_quick_round(self, names: &[&str], round: u32) -> Self {
        self.push_quick_round(names, round);
        self
    }

    /// [`script_quick_round`](Self::script_quick_round) for a generator
    /// that is already shared.
    pub fn push_quick_round(&self, names: &[&str], round: u32) {
        for name in names {
            self.push(
                "declare_intent",
                Ok(json!({
                    "action": format!("{name} acts in round {round}"),
                    "reasoning": "It seems wise."
                })
                .to_string()),
            );
        }
        for name in names {
            self.push(
                "assess_difficulty",
                Ok(json!({
                    "difficulty": "average",
                    "reasoning": format!("{name} faces a fair challenge"),
                    "key_factors": ["darkness"]
                })
                .to_string()),
            );
        }
        self.push("resolve_actions", Ok(resolution_reply(names, round)));
        self.push(
            "summarize_round",
            Ok(json!({
                "key_events": [format!("Round {round} happened")],
                "narrative_focus": format!("After round {round}")
            })
            .to_string()),
        );
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        lock(&self.requests).push(request.clone());
        lock(&self.replies)
            .get_mut(&request.task)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(GenerationError(format!(
                    "no scripted reply left for task '{}'",
                    request.task
                )))
            })
    }
}

/// A resolution reply covering exactly `names`.
pub fn resolution_reply(names: &[&str], round: u32) -> String {
    let outcomes: serde_json::Map<String, serde_json::Value> = names
        .iter()
        .map(|name| {
            (
                name.to_string(),
                json!({
                    "outcome": format!("{name} acts in round {round}"),
                    "state_changes": {"last_round": round}
                }),
            )
        })
        .collect();
    json!({
        "outcomes": outcomes,
        "scene": format!("The scene after round {round}")
    })
    .to_string()
}

/// The sample party at round 0.
pub fn sample_state() -> GameState {
    Scenario::crimson_crypt().into_state()
}

/// Names of the sample party in seating order.
pub const SAMPLE_PARTY: [&str; 3] = ["Brussae", "Shadowstep", "Eldara"];

/// Seeded, non-saving configuration for tests.
pub fn test_config() -> GameConfig {
    GameConfig::default().with_seed(7).with_auto_save(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::OutputFormat;

    fn request(task: &str) -> GenerationRequest {
        GenerationRequest {
            task: task.into(),
            system: String::new(),
            prompt: String::new(),
            format: OutputFormat::Text,
            model: "m".into(),
            temperature: 0.0,
            max_tokens: 1,
        }
    }

    #[tokio::test]
    async fn test_replies_are_per_task_and_ordered() {
        let generator = ScriptedGenerator::new()
            .with_replies("a", ["a1", "a2"])
            .with_reply("b", "b1");

        assert_eq!(generator.generate(&request("b")).await.unwrap(), "b1");
        assert_eq!(generator.generate(&request("a")).await.unwrap(), "a1");
        assert_eq!(generator.remaining("a"), 1);
        assert_eq!(generator.generate(&request("a")).await.unwrap(), "a2");
        assert!(generator.generate(&request("a")).await.is_err());
        assert_eq!(generator.requests_for("a").len(), 3);
        assert_eq!(generator.requests().len(), 4);
    }

    #[test]
    fn test_script_quick_round() {
        let generator = ScriptedGenerator::new().script_quick_round(&SAMPLE_PARTY, 1);
        assert_eq!(generator.remaining("declare_intent"), 3);
        assert_eq!(generator.remaining("assess_difficulty"), 3);
        assert_eq!(generator.remaining_total(), 8);
    }
}
