//! Round-based tabletop party simulator driven by language-model agents.
//!
//! This crate provides:
//! - A Dungeon Master agent that describes scenes, judges difficulty and
//!   adjudicates every action of a round at once
//! - Player agents, one per character, that ask questions, declare intents
//!   and weigh each other's plans
//! - A Chronicler agent that summarizes rounds and compresses old history
//! - A Game Master that runs the round loop against a validated game state
//! - Versioned JSON persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use dnd_core::{GameConfig, GameMaster, JsonFileStore, Scenario};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GameConfig::from_env()?;
//!     let client = claude::Claude::new(config.require_api_key()?)?;
//!     let store = JsonFileStore::new(&config.save_dir);
//!
//!     let mut game = GameMaster::new(config, Scenario::crimson_crypt().into_state(), Arc::new(client))?
//!         .with_store(store);
//!     game.run(3).await?;
//!     println!("{}", game.summary());
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod agent;
pub mod character;
pub mod config;
pub mod dice;
pub mod frontend;
pub mod game_master;
pub mod persist;
pub mod scenario;
pub mod state;
pub mod testing;

pub use dnd_macros::OutputSchema;

// Primary public API
pub use actions::{
    ActionResult, ChronicleMemory, Difficulty, DifficultyAssessment, Intent, PlayerFeedback,
    Resolution, RoundSummary, SupportLevel,
};
pub use agent::{AbortHandle, AgentError, GenerationError, TextGenerator};
pub use character::{Character, CharacterClass, PartyMember, PersonalityProfile, Race};
pub use config::{AgentSettings, DmStyle, GameConfig, RetryPolicy, TurnMode};
pub use frontend::{ClientMessage, Frontend, FrontendClient, ServerMessage, StateSnapshot};
pub use game_master::{GameError, GameMaster, Seat};
pub use persist::{GameStore, JsonFileStore, MemoryStore, SavedGame};
pub use scenario::Scenario;
pub use state::{GameState, PartyStatus, Round};
pub use testing::ScriptedGenerator;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// A check the DM may call for
    #[derive(OutputSchema, Deserialize)]
    #[schema(name = "skill_check")]
    #[allow(dead_code)]
    struct SkillCheck {
        /// Skill being tested
        skill: String,
        /// Target number
        dc: u32,
        #[schema(optional)]
        advantage: bool,
        note: Option<String>,
    }

    #[test]
    fn test_output_schema_derive() {
        assert_eq!(SkillCheck::schema_name(), "skill_check");
        assert_eq!(SkillCheck::schema_description(), "A check the DM may call for");

        let schema = SkillCheck::json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["skill"]["type"], "string");
        assert_eq!(schema["properties"]["dc"]["type"], "integer");
        assert_eq!(schema["properties"]["skill"]["description"], "Skill being tested");

        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "skill"));
        assert!(!required.iter().any(|v| v == "advantage"));
        assert!(!required.iter().any(|v| v == "note"));
    }

    #[test]
    fn test_enum_schema() {
        let schema = Difficulty::json_schema();
        assert_eq!(schema["type"], "string");
        let values = schema["enum"].as_array().unwrap();
        assert!(values.iter().any(|v| v == "super_hard"));
        assert!(values.iter().any(|v| v == "always_succeed"));
    }
}
