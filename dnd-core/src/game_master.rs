//! The Game Master: drives the round loop.
//!
//! A round gathers one intent per seat, has the DM assess each one, rolls,
//! asks the DM to adjudicate everything at once, applies the outcomes, has
//! the Chronicler summarize, and persists. All of that happens on a working
//! copy of the state; the copy replaces the committed state only after the
//! save succeeds, so a failed round leaves nothing behind.

use crate::actions::{ActionResult, Intent};
use crate::agent::chronicler::RoundRecord;
use crate::agent::dm::RolledAction;
use crate::agent::player::format_qa_exchange;
use crate::agent::{
    AbortHandle, AgentError, ChroniclerAgent, DmAgent, PlayerAgent, TaskError, TextGenerator,
};
use crate::character::PartyMember;
use crate::config::{ConfigError, GameConfig, TurnMode};
use crate::dice::rng_from_seed;
use crate::frontend::{Frontend, FrontendError, StateSnapshot};
use crate::persist::{AgentConfigs, GameStore, PersistError, SavedGame};
use crate::state::{GameState, Round, StateError};
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that end a round.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent error: {0}")]
    Agent(AgentError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Invalid game state: {0}")]
    InvalidState(#[from] StateError),

    #[error("Game aborted")]
    Aborted,

    #[error("Front-end disconnected")]
    FrontendClosed,

    #[error("{0} is played by a human but no front-end is attached")]
    NoFrontend(String),
}

impl From<AgentError> for GameError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Aborted => GameError::Aborted,
            other => GameError::Agent(other),
        }
    }
}

impl From<TaskError> for GameError {
    fn from(e: TaskError) -> Self {
        GameError::Agent(AgentError::MissingInput(e))
    }
}

impl From<FrontendError> for GameError {
    fn from(e: FrontendError) -> Self {
        match e {
            FrontendError::Closed => GameError::FrontendClosed,
            FrontendError::Quit => GameError::Aborted,
        }
    }
}

/// Who plays a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    Agent,
    Human,
}

/// Runs a campaign round by round.
pub struct GameMaster {
    config: GameConfig,
    state: GameState,
    seats: Vec<Seat>,
    generator: Arc<dyn TextGenerator>,
    dm: DmAgent,
    chronicler: ChroniclerAgent,
    rng: StdRng,
    store: Option<Box<dyn GameStore>>,
    frontend: Option<Frontend>,
    abort: AbortHandle,
}

impl std::fmt::Debug for GameMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameMaster")
            .field("campaign", &self.state.campaign)
            .field("round", &self.state.round)
            .field("seats", &self.seats)
            .finish_non_exhaustive()
    }
}

impl GameMaster {
    /// Set up a game on `state`. Every seat starts agent-played.
    pub fn new(
        config: GameConfig,
        state: GameState,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, GameError> {
        config.validate()?;
        state.validate()?;

        let abort = AbortHandle::new();
        let dm = DmAgent::new(generator.clone(), config.dm.clone(), &config.dm_style)?
            .with_retry(config.retry)
            .with_abort(abort.clone())
            .with_lookback(config.context_lookback);
        let chronicler = ChroniclerAgent::new(generator.clone(), config.chronicler.clone())
            .with_retry(config.retry)
            .with_abort(abort.clone());

        Ok(Self {
            seats: vec![Seat::Agent; state.party.len()],
            rng: rng_from_seed(config.seed),
            config,
            state,
            generator,
            dm,
            chronicler,
            store: None,
            frontend: None,
            abort,
        })
    }

    /// Resume a saved game with the agent settings it was saved with.
    pub fn from_save(
        mut config: GameConfig,
        saved: SavedGame,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, GameError> {
        config.dm = saved.agents.dm;
        config.player = saved.agents.player;
        config.chronicler = saved.agents.chronicler;
        config.dm_style = saved.agents.dm_style;
        Self::new(config, saved.state, generator)
    }

    pub fn with_store(mut self, store: impl GameStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_frontend(mut self, frontend: Frontend) -> Self {
        self.frontend = Some(frontend);
        self
    }

    /// Hand a seat to a human player through the front-end.
    pub fn with_human_seat(mut self, name: &str) -> Result<Self, GameError> {
        let index = self
            .state
            .party
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| StateError::UnknownCharacter(name.to_string()))?;
        self.seats[index] = Seat::Human;
        Ok(self)
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    /// Handle for cancelling play from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn into_state(self) -> GameState {
        self.state
    }

    /// Persist the committed state to the attached store, if any.
    pub async fn save(&self) -> Result<Option<String>, GameError> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let saved = SavedGame::new(self.state.clone(), AgentConfigs::from(&self.config));
        Ok(Some(store.save(&saved).await?))
    }

    /// Play `rounds` rounds, stopping at the first error.
    pub async fn run(&mut self, rounds: u32) -> Result<(), GameError> {
        for _ in 0..rounds {
            if let Err(e) = self.play_round().await {
                warn!(round = self.state.next_round(), error = %e, "round failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Play one round and return it once committed.
    pub async fn play_round(&mut self) -> Result<&Round, GameError> {
        if self.abort.is_aborted() {
            return Err(GameError::Aborted);
        }

        let mut working = self.state.clone();
        let mut rng = self.rng.clone();
        let number = working.next_round();
        let initial_scene = working.scene.clone();
        let mut events = Vec::new();
        info!(round = number, campaign = %working.campaign, "round started");

        // Intents, in seating order.
        let mut declared: Vec<(Intent, String)> = Vec::with_capacity(working.party.len());
        let mut previous_action: Option<String> = None;
        for index in 0..working.party.len() {
            let (intent, situation) = self
                .gather_intent(&working, index, previous_action.as_deref(), &mut events)
                .await?;
            previous_action = Some(intent.describe());
            declared.push((intent, situation));
        }

        // Difficulty and dice.
        let mut rolled = Vec::with_capacity(declared.len());
        for (intent, situation) in declared {
            let actor = member(&working, &intent.character)?;
            let assessment = self
                .dm
                .assess_difficulty(&working, actor, &situation, &intent)
                .await?;
            let roll = assessment.roll_with_rng(&mut rng);
            debug!(
                character = %intent.character,
                difficulty = %assessment.difficulty,
                roll = roll.roll,
                success = roll.success,
                "action rolled"
            );
            rolled.push(RolledAction {
                intent,
                assessment,
                roll,
            });
        }

        // Adjudication.
        let resolution = self.dm.resolve_actions(&working, number, &rolled).await?;

        let mut intents = BTreeMap::new();
        let mut results = BTreeMap::new();
        for action in rolled {
            let name = action.intent.character.clone();
            let outcome = resolution
                .outcomes
                .get(&name)
                .ok_or_else(|| StateError::UnknownCharacter(name.clone()))?;
            working.apply_outcome(&name, outcome)?;

            let result = ActionResult {
                character: name.clone(),
                action: action.intent.action.clone(),
                outcome: outcome.outcome.clone(),
                success: action.roll.success,
                roll: action.roll.roll,
                reasoning: Some(action.assessment.reasoning.clone()),
                assessment: action.assessment,
                state_changes: outcome.state_changes.clone(),
            };
            self.narrate(&mut events, "Dungeon Master", &result.describe())
                .await?;
            working.add_context(result.describe());
            intents.insert(name.clone(), action.intent);
            results.insert(name, result);
        }

        if let Some(location) = &resolution.location {
            working.party_status.location = location.clone();
        }
        working.party_status.group_conditions = resolution.group_conditions.clone();
        working.scene = resolution.scene.clone();
        self.narrate(&mut events, "Dungeon Master", &working.scene)
            .await?;

        // Chronicle.
        let summary = self
            .chronicler
            .summarize_round(
                &working,
                RoundRecord {
                    number,
                    initial_situation: &initial_scene,
                    final_situation: &working.scene,
                    events: &events,
                },
            )
            .await?;
        if !summary.narrative_focus.is_empty() {
            self.publish("Chronicler", &summary.narrative_focus).await?;
        }

        working.push_round(Round {
            number,
            scene: initial_scene,
            intents,
            results,
            summary,
            events,
        })?;
        self.compress_memory(&mut working).await?;

        // Persist, then commit.
        if self.config.auto_save {
            if let Some(store) = &self.store {
                let saved = SavedGame::new(working.clone(), AgentConfigs::from(&self.config));
                let location = store.save(&saved).await?;
                debug!(round = number, %location, "round saved");
            }
        }

        self.state = working;
        self.rng = rng;
        info!(round = number, "round complete");

        self.state
            .history
            .last()
            .ok_or(GameError::InvalidState(StateError::RoundCounterMismatch {
                round: number,
                history: 0,
            }))
    }

    async fn gather_intent(
        &mut self,
        state: &GameState,
        index: usize,
        previous_action: Option<&str>,
        events: &mut Vec<String>,
    ) -> Result<(Intent, String), GameError> {
        let member = &state.party[index];

        if self.seats[index] == Seat::Human {
            if self.abort.is_aborted() {
                return Err(GameError::Aborted);
            }
            let frontend = self
                .frontend
                .as_mut()
                .ok_or_else(|| GameError::NoFrontend(member.name().to_string()))?;
            let text = frontend
                .request_input(
                    StateSnapshot::from(state),
                    format!("What does {} do?", member.name()),
                )
                .await?;
            let intent = Intent::new(member.name(), text);
            self.narrate(events, member.name(), &intent.action).await?;
            return Ok((intent, state.scene.clone()));
        }

        let player = self.player_agent(member)?;

        if self.config.turn_mode == TurnMode::Quick {
            let intent = player
                .declare_intent(state, &state.scene, &format_qa_exchange(&[], ""))
                .await?;
            self.narrate(events, member.name(), &intent.action).await?;
            return Ok((intent, state.scene.clone()));
        }

        let situation = self
            .dm
            .describe_situation(state, member, previous_action)
            .await?;
        self.narrate(events, "Dungeon Master", &situation).await?;

        let questions = player.ask_questions(state, &situation).await?;
        let qa_exchange = if questions.is_empty() {
            format_qa_exchange(&[], "")
        } else {
            self.narrate(events, member.name(), &questions.join(" | "))
                .await?;
            let answers = self
                .dm
                .answer_questions(state, member, &situation, &questions)
                .await?;
            self.narrate(events, "Dungeon Master", &answers).await?;
            format_qa_exchange(&questions, &answers)
        };

        let intent = player
            .declare_intent(state, &situation, &qa_exchange)
            .await?;
        self.narrate(events, member.name(), &format!("I'm thinking: {}", intent.action))
            .await?;

        let mut feedback = Vec::new();
        for (other_index, other) in state.party.iter().enumerate() {
            if other_index == index || self.seats[other_index] != Seat::Agent {
                continue;
            }
            let reply = self
                .player_agent(other)?
                .provide_feedback(&situation, member, &intent)
                .await?;
            self.narrate(events, other.name(), &reply.reasoning).await?;
            feedback.push((other.name().to_string(), reply));
        }

        let decision = player
            .make_decision(state, &situation, &intent, &feedback)
            .await?;
        self.narrate(events, member.name(), &decision.action).await?;
        Ok((decision, situation))
    }

    /// Agents are rebuilt from the current sheet so their prompt reflects
    /// the latest status.
    fn player_agent(&self, member: &PartyMember) -> Result<PlayerAgent, GameError> {
        Ok(PlayerAgent::new(
            member.clone(),
            self.generator.clone(),
            self.config.player.clone(),
        )?
        .with_retry(self.config.retry)
        .with_abort(self.abort.clone())
        .with_lookback(self.config.context_lookback))
    }

    async fn compress_memory(&self, working: &mut GameState) -> Result<(), GameError> {
        let pending = working.uncompressed_rounds().len();
        if pending <= self.config.memory_length {
            return Ok(());
        }
        let fold = pending - self.config.memory_length;
        let rounds = working.uncompressed_rounds()[..fold].to_vec();
        let memory = self.chronicler.compress_memory(working, &rounds).await?;
        working.memory = memory;
        working.compressed_through += fold as u32;
        info!(through = working.compressed_through, "memory compressed");
        Ok(())
    }

    /// Record an event for the round and publish it.
    async fn narrate(
        &self,
        events: &mut Vec<String>,
        speaker: &str,
        text: &str,
    ) -> Result<(), GameError> {
        events.push(format!("{speaker}: {text}"));
        self.publish(speaker, text).await
    }

    async fn publish(&self, speaker: &str, text: &str) -> Result<(), GameError> {
        debug!(speaker, "{text}");
        if let Some(frontend) = &self.frontend {
            frontend.narrate(speaker, text).await?;
        }
        Ok(())
    }

    /// A readable overview of the campaign so far.
    pub fn summary(&self) -> String {
        self.state.summary()
    }
}

fn member<'a>(state: &'a GameState, name: &str) -> Result<&'a PartyMember, GameError> {
    state
        .member(name)
        .ok_or_else(|| StateError::UnknownCharacter(name.to_string()).into())
}
