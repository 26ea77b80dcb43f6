//! Boundary between the game loop and whatever presents it.
//!
//! The game pushes [`ServerMessage`]s and, for human seats, waits for a
//! [`ClientMessage`]. Both are plain serde types, so a console, a websocket
//! bridge or a test can sit on the other end of the channels.

use crate::state::GameState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrontendError {
    #[error("Front-end disconnected")]
    Closed,

    #[error("Player quit")]
    Quit,
}

/// Game to front-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Something happened in the story.
    Narration { speaker: String, text: String },
    /// Current state, optionally asking the player for input.
    State {
        snapshot: StateSnapshot,
        awaiting_input: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
}

/// Front-end to game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Input { text: String },
    Quit,
}

/// The parts of the game state a player sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub campaign: String,
    pub round: u32,
    pub scene: String,
    pub location: String,
    pub party: Vec<MemberSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub name: String,
    /// "Level 2 Human Paladin"
    pub summary: String,
    pub status: BTreeMap<String, serde_json::Value>,
}

impl From<&GameState> for StateSnapshot {
    fn from(state: &GameState) -> Self {
        Self {
            campaign: state.campaign.clone(),
            round: state.round,
            scene: state.scene.clone(),
            location: state.party_status.location.clone(),
            party: state
                .party
                .iter()
                .map(|m| MemberSnapshot {
                    name: m.name().to_string(),
                    summary: format!(
                        "Level {} {} {}",
                        m.character.level, m.character.race, m.character.class
                    ),
                    status: m.character.status.clone(),
                })
                .collect(),
        }
    }
}

/// The game's end of the connection.
#[derive(Debug)]
pub struct Frontend {
    outbound: mpsc::Sender<ServerMessage>,
    inbound: mpsc::Receiver<ClientMessage>,
}

/// The presenter's end of the connection.
#[derive(Debug)]
pub struct FrontendClient {
    pub inbound: mpsc::Receiver<ServerMessage>,
    pub outbound: mpsc::Sender<ClientMessage>,
}

/// Create a connected pair.
pub fn channel(buffer: usize) -> (Frontend, FrontendClient) {
    let (server_tx, server_rx) = mpsc::channel(buffer);
    let (client_tx, client_rx) = mpsc::channel(buffer);
    (
        Frontend {
            outbound: server_tx,
            inbound: client_rx,
        },
        FrontendClient {
            inbound: server_rx,
            outbound: client_tx,
        },
    )
}

impl Frontend {
    pub async fn send(&self, message: ServerMessage) -> Result<(), FrontendError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| FrontendError::Closed)
    }

    pub async fn narrate(
        &self,
        speaker: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), FrontendError> {
        self.send(ServerMessage::Narration {
            speaker: speaker.into(),
            text: text.into(),
        })
        .await
    }

    /// Show the state, flagged as waiting, and return the next non-blank
    /// line of input.
    pub async fn request_input(
        &mut self,
        snapshot: StateSnapshot,
        prompt: impl Into<String>,
    ) -> Result<String, FrontendError> {
        self.send(ServerMessage::State {
            snapshot,
            awaiting_input: true,
            prompt: Some(prompt.into()),
        })
        .await?;

        loop {
            match self.inbound.recv().await {
                Some(ClientMessage::Input { text }) if !text.trim().is_empty() => {
                    return Ok(text.trim().to_string())
                }
                Some(ClientMessage::Input { .. }) => continue,
                Some(ClientMessage::Quit) => return Err(FrontendError::Quit),
                None => return Err(FrontendError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        let msg = ServerMessage::Narration {
            speaker: "DM".into(),
            text: "The door creaks.".into(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "narration", "speaker": "DM", "text": "The door creaks."})
        );

        let input: ClientMessage =
            serde_json::from_value(json!({"type": "input", "text": "I wait"})).unwrap();
        assert_eq!(input, ClientMessage::Input { text: "I wait".into() });
        let quit: ClientMessage = serde_json::from_value(json!({"type": "quit"})).unwrap();
        assert_eq!(quit, ClientMessage::Quit);
    }

    #[test]
    fn test_snapshot_from_state() {
        let state = Scenario::crimson_crypt().into_state();
        let snapshot = StateSnapshot::from(&state);
        assert_eq!(snapshot.round, 0);
        assert_eq!(snapshot.party.len(), 3);
        assert_eq!(snapshot.party[2].summary, "Level 2 Half-Elf Wizard");
    }

    #[tokio::test]
    async fn test_request_input_skips_blank_lines() {
        let (mut frontend, mut client) = channel(8);
        let state = Scenario::crimson_crypt().into_state();

        client
            .outbound
            .send(ClientMessage::Input { text: "   ".into() })
            .await
            .unwrap();
        client
            .outbound
            .send(ClientMessage::Input {
                text: " I light a torch ".into(),
            })
            .await
            .unwrap();

        let text = frontend
            .request_input(StateSnapshot::from(&state), "What do you do?")
            .await
            .unwrap();
        assert_eq!(text, "I light a torch");

        match client.inbound.recv().await.unwrap() {
            ServerMessage::State {
                awaiting_input,
                prompt,
                ..
            } => {
                assert!(awaiting_input);
                assert_eq!(prompt.as_deref(), Some("What do you do?"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quit_and_disconnect() {
        let (mut frontend, client) = channel(8);
        let state = Scenario::crimson_crypt().into_state();
        client.outbound.send(ClientMessage::Quit).await.unwrap();
        assert_eq!(
            frontend
                .request_input(StateSnapshot::from(&state), "?")
                .await,
            Err(FrontendError::Quit)
        );

        drop(client);
        assert_eq!(
            frontend.narrate("DM", "Anyone there?").await,
            Err(FrontendError::Closed)
        );
    }
}
