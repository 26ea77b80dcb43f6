//! Game configuration.
//!
//! A single [`GameConfig`] value is built at startup (from the environment or
//! by hand) and handed to the [`GameMaster`](crate::GameMaster). Nothing in the
//! crate reads configuration from global state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from building or validating configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Temperature for {agent} must be between 0.0 and 1.0, got {value}")]
    TemperatureOutOfRange { agent: &'static str, value: f32 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// How agent-played seats produce their intent each round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    /// The player declares an intent straight from the scene.
    #[default]
    Quick,
    /// Describe, question, answer, declare, party feedback, final decision.
    Deliberate,
}

impl FromStr for TurnMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quick" => Ok(TurnMode::Quick),
            "deliberate" => Ok(TurnMode::Deliberate),
            other => Err(ConfigError::InvalidValue {
                key: "DND_TURN_MODE".into(),
                value: other.into(),
                reason: "expected quick or deliberate".into(),
            }),
        }
    }
}

/// Bounded retry on unparseable agent output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Pause before each retry.
    #[serde(with = "duration_millis")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Total attempts, including the first.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Model settings for one agent role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl AgentSettings {
    pub fn new(temperature: f32) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature,
            max_tokens: 2048,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn validate(&self, agent: &'static str) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::TemperatureOutOfRange {
                agent,
                value: self.temperature,
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Zero("max_tokens"));
        }
        Ok(())
    }
}

/// The DM's narrative voice, folded into its system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmStyle {
    pub description_style: String,
    pub combat_style: String,
    pub narrative_style: String,
    pub difficulty_style: String,
}

impl Default for DmStyle {
    fn default() -> Self {
        Self {
            description_style: "vivid and atmospheric".into(),
            combat_style: "dynamic and tactical".into(),
            narrative_style: "balanced between story and game mechanics".into(),
            difficulty_style: "fair but challenging".into(),
        }
    }
}

/// Configuration for a game run.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Anthropic API key. Only needed when talking to the live service.
    pub api_key: Option<String>,

    pub dm: AgentSettings,
    pub player: AgentSettings,
    pub chronicler: AgentSettings,
    pub dm_style: DmStyle,

    /// Rounds to play when the caller does not say otherwise.
    pub default_rounds: u32,

    pub save_dir: PathBuf,

    /// Persist after every committed round.
    pub auto_save: bool,

    pub retry: RetryPolicy,

    /// Uncompressed round summaries kept before the Chronicler folds older
    /// ones into long-term memory.
    pub memory_length: usize,

    /// Past rounds included verbatim in agent prompts.
    pub context_lookback: usize,

    pub turn_mode: TurnMode,

    /// Seed for the success-roll RNG. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            dm: AgentSettings::new(0.7),
            player: AgentSettings::new(0.8),
            chronicler: AgentSettings::new(0.3),
            dm_style: DmStyle::default(),
            default_rounds: 5,
            save_dir: PathBuf::from("saves"),
            auto_save: true,
            retry: RetryPolicy::default(),
            memory_length: 5,
            context_lookback: 3,
            turn_mode: TurnMode::Quick,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults. Set-but-unparseable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.api_key = get("ANTHROPIC_API_KEY");

        if let Some(model) = get("DND_DM_MODEL") {
            config.dm.model = model;
        }
        if let Some(model) = get("DND_PLAYER_MODEL") {
            config.player.model = model;
        }
        if let Some(model) = get("DND_CHRONICLER_MODEL") {
            config.chronicler.model = model;
        }

        if let Some(t) = parse_var(&get, "DND_DM_TEMPERATURE")? {
            config.dm.temperature = t;
        }
        if let Some(t) = parse_var(&get, "DND_PLAYER_TEMPERATURE")? {
            config.player.temperature = t;
        }
        if let Some(t) = parse_var(&get, "DND_CHRONICLER_TEMPERATURE")? {
            config.chronicler.temperature = t;
        }
        if let Some(max_tokens) = parse_var(&get, "DND_MAX_TOKENS")? {
            config.dm.max_tokens = max_tokens;
            config.player.max_tokens = max_tokens;
            config.chronicler.max_tokens = max_tokens;
        }

        if let Some(rounds) = parse_var(&get, "DND_ROUNDS")? {
            config.default_rounds = rounds;
        }
        if let Some(dir) = get("DND_SAVE_DIR") {
            config.save_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get("DND_AUTO_SAVE") {
            config.auto_save = parse_bool("DND_AUTO_SAVE", &raw)?;
        }
        if let Some(retries) = parse_var(&get, "DND_PARSE_RETRIES")? {
            config.retry.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64>(&get, "DND_RETRY_BACKOFF_MS")? {
            config.retry.backoff = Duration::from_millis(ms);
        }
        if let Some(length) = parse_var(&get, "DND_MEMORY_LENGTH")? {
            config.memory_length = length;
        }
        if let Some(lookback) = parse_var(&get, "DND_CONTEXT_LOOKBACK")? {
            config.context_lookback = lookback;
        }
        if let Some(mode) = get("DND_TURN_MODE") {
            config.turn_mode = mode.parse()?;
        }
        if let Some(seed) = parse_var(&get, "DND_SEED")? {
            config.seed = Some(seed);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dm.validate("dm")?;
        self.player.validate("player")?;
        self.chronicler.validate("chronicler")?;
        if self.memory_length == 0 {
            return Err(ConfigError::Zero("memory_length"));
        }
        Ok(())
    }

    /// The API key, or a configuration error when it is missing.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key.as_deref().ok_or(ConfigError::MissingApiKey)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_dm(mut self, settings: AgentSettings) -> Self {
        self.dm = settings;
        self
    }

    pub fn with_player(mut self, settings: AgentSettings) -> Self {
        self.player = settings;
        self
    }

    pub fn with_chronicler(mut self, settings: AgentSettings) -> Self {
        self.chronicler = settings;
        self
    }

    pub fn with_dm_style(mut self, style: DmStyle) -> Self {
        self.dm_style = style;
        self
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.default_rounds = rounds;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_memory_length(mut self, length: usize) -> Self {
        self.memory_length = length;
        self
    }

    pub fn with_context_lookback(mut self, lookback: usize) -> Self {
        self.context_lookback = lookback;
        self
    }

    pub fn with_turn_mode(mut self, mode: TurnMode) -> Self {
        self.turn_mode = mode;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

fn parse_var<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GameConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GameConfig::default());
        assert_eq!(config.retry.attempts(), 2);
        assert_eq!(config.chronicler.temperature, 0.3);
        assert_eq!(config.memory_length, 5);
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_reads_overrides() {
        let config = GameConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("DND_DM_MODEL", "claude-opus"),
            ("DND_PLAYER_TEMPERATURE", "0.5"),
            ("DND_MAX_TOKENS", "1024"),
            ("DND_AUTO_SAVE", "off"),
            ("DND_PARSE_RETRIES", "3"),
            ("DND_RETRY_BACKOFF_MS", "250"),
            ("DND_TURN_MODE", "Deliberate"),
            ("DND_SEED", "42"),
        ]))
        .unwrap();

        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        assert_eq!(config.dm.model, "claude-opus");
        assert_eq!(config.player.temperature, 0.5);
        assert_eq!(config.chronicler.max_tokens, 1024);
        assert!(!config.auto_save);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff, Duration::from_millis(250));
        assert_eq!(config.turn_mode, TurnMode::Deliberate);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = GameConfig::from_lookup(lookup(&[("ANTHROPIC_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let err = GameConfig::from_lookup(lookup(&[("DND_ROUNDS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DND_ROUNDS"));
    }

    #[test]
    fn test_rejects_temperature_out_of_range() {
        let err =
            GameConfig::from_lookup(lookup(&[("DND_DM_TEMPERATURE", "1.5")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::TemperatureOutOfRange {
                agent: "dm",
                value: 1.5
            }
        );
    }

    #[test]
    fn test_rejects_unknown_turn_mode() {
        assert!(GameConfig::from_lookup(lookup(&[("DND_TURN_MODE", "slow")])).is_err());
    }

    #[test]
    fn test_builder() {
        let config = GameConfig::default()
            .with_seed(7)
            .with_retry(RetryPolicy::new(0))
            .with_auto_save(false)
            .with_player(AgentSettings::new(0.9).with_model("haiku"));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.retry.attempts(), 1);
        assert_eq!(config.player.model, "haiku");
        assert!(config.validate().is_ok());
    }
}
