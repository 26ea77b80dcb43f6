//! The Chronicler: round summaries and long-term memory.

use super::{AbortHandle, AgentCore, AgentError, Task, TaskInputs, TextGenerator};
use crate::actions::{ChronicleMemory, RoundSummary};
use crate::config::{AgentSettings, RetryPolicy};
use crate::state::{GameState, Round};
use std::sync::Arc;

const SUMMARIZE_ROUND: Task = Task::new(
    "summarize_round",
    "Summarize round {round_number}.",
    include_str!("prompts/chronicler_summarize_round.txt"),
    "A structured summary of the round's important elements",
);

const COMPRESS_MEMORY: Task = Task::new(
    "compress_memory",
    "Compress older round summaries into long-term memory.",
    include_str!("prompts/chronicler_compress_memory.txt"),
    "A consolidated memory with narrative, tactical, character and consequence entries",
);

/// What the Chronicler is shown about a finished round.
#[derive(Debug, Clone, Copy)]
pub struct RoundRecord<'a> {
    pub number: u32,
    pub initial_situation: &'a str,
    pub final_situation: &'a str,
    pub events: &'a [String],
}

#[derive(Debug, Clone)]
pub struct ChroniclerAgent {
    core: AgentCore,
}

impl ChroniclerAgent {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: AgentSettings) -> Self {
        Self {
            core: AgentCore::new(
                "Chronicler",
                include_str!("prompts/chronicler_system.txt").trim_end(),
                settings,
                generator,
            ),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.core = self.core.with_retry(retry);
        self
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.core = self.core.with_abort(abort);
        self
    }

    pub fn core(&self) -> &AgentCore {
        &self.core
    }

    /// Summarize a finished round. `state` is the state after the round's
    /// outcomes were applied.
    pub async fn summarize_round(
        &self,
        state: &GameState,
        record: RoundRecord<'_>,
    ) -> Result<RoundSummary, AgentError> {
        let previous = state
            .history
            .last()
            .map(|r| r.summary.to_prompt())
            .unwrap_or_else(|| "None".to_string());

        let inputs = TaskInputs::new()
            .with("round_number", record.number.to_string())
            .with("initial_situation", record.initial_situation)
            .with("final_situation", record.final_situation)
            .with("round_events", record.events.join("\n"))
            .with("party", state.party_prompt())
            .with("previous_summary", previous);

        self.core.run_structured(&SUMMARIZE_ROUND, &inputs).await
    }

    /// Fold `rounds` into the existing long-term memory.
    pub async fn compress_memory(
        &self,
        state: &GameState,
        rounds: &[Round],
    ) -> Result<ChronicleMemory, AgentError> {
        let memory = if state.memory.is_empty() {
            "None yet.".to_string()
        } else {
            state.memory.to_prompt()
        };
        let summaries = rounds
            .iter()
            .map(|r| format!("Round {}:\n{}", r.number, r.summary.to_prompt()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let inputs = TaskInputs::new()
            .with("memory", memory)
            .with("round_summaries", summaries)
            .with("party", state.party_prompt());

        self.core.run_structured(&COMPRESS_MEMORY, &inputs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use crate::testing::ScriptedGenerator;
    use serde_json::json;

    #[tokio::test]
    async fn test_summarize_round() {
        let generator = Arc::new(ScriptedGenerator::new().with_reply(
            "summarize_round",
            json!({
                "key_events": ["The party entered the crypt"],
                "party_state": {"Brussae": "unhurt"},
                "narrative_focus": "The Orb"
            })
            .to_string(),
        ));
        let chronicler = ChroniclerAgent::new(generator.clone(), AgentSettings::new(0.3));
        let state = Scenario::crimson_crypt().into_state();
        let events = vec!["Brussae opens the door".to_string()];

        let summary = chronicler
            .summarize_round(
                &state,
                RoundRecord {
                    number: 1,
                    initial_situation: "Outside",
                    final_situation: "Inside",
                    events: &events,
                },
            )
            .await
            .unwrap();
        assert_eq!(summary.key_events, vec!["The party entered the crypt"]);

        let request = &generator.requests()[0];
        assert!(request.prompt.starts_with("Summarize round 1."));
        assert!(request.prompt.contains("Previous round summary:\nNone"));
        assert!(request.prompt.contains("Brussae opens the door"));
        assert_eq!(request.temperature, 0.3);
    }

    #[tokio::test]
    async fn test_compress_rejects_empty_memory() {
        let generator = Arc::new(
            ScriptedGenerator::new().with_replies("compress_memory", ["{}", "{\"narrative\": []}"]),
        );
        let chronicler = ChroniclerAgent::new(generator.clone(), AgentSettings::new(0.3));
        let state = Scenario::crimson_crypt().into_state();
        let err = chronicler.compress_memory(&state, &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Parse { attempts: 2, .. }));
    }
}
