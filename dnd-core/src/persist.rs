//! Save and load games.
//!
//! A save is one pretty-printed JSON document holding the complete
//! [`GameState`] plus the agent settings it was played with. The
//! [`GameStore`] trait lets the Game Master persist rounds without knowing
//! where they go.

use crate::config::{AgentSettings, DmStyle, GameConfig};
use crate::state::GameState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("No save found for campaign '{0}'")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Current save file version.
pub const SAVE_VERSION: u32 = 1;

/// Agent configuration recorded alongside the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfigs {
    pub dm: AgentSettings,
    pub player: AgentSettings,
    pub chronicler: AgentSettings,
    pub dm_style: DmStyle,
}

impl From<&GameConfig> for AgentConfigs {
    fn from(config: &GameConfig) -> Self {
        Self {
            dm: config.dm.clone(),
            player: config.player.clone(),
            chronicler: config.chronicler.clone(),
            dm_style: config.dm_style.clone(),
        }
    }
}

/// Metadata about the save file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    pub campaign: String,
    /// Completed rounds.
    pub round: u32,
    pub player_count: usize,
    pub location: String,
    /// RFC 3339 timestamp.
    pub saved_at: String,
}

/// A saved game with all state needed to resume play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedGame {
    pub version: u32,
    pub saved_at: String,
    pub metadata: SaveMetadata,
    pub state: GameState,
    pub agents: AgentConfigs,
}

impl SavedGame {
    pub fn new(state: GameState, agents: AgentConfigs) -> Self {
        let saved_at = chrono::Utc::now().to_rfc3339();
        let metadata = SaveMetadata {
            campaign: state.campaign.clone(),
            round: state.round,
            player_count: state.party.len(),
            location: state.party_status.location.clone(),
            saved_at: saved_at.clone(),
        };
        Self {
            version: SAVE_VERSION,
            saved_at,
            metadata,
            state,
            agents,
        }
    }

    /// Save to a JSON file, creating parent directories as needed.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        // Write then rename so a crash never leaves a half-written save.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;
        check_version(saved.version)?;
        Ok(saved)
    }

    /// Read a save's metadata without deserializing the full state.
    pub async fn peek_metadata(path: impl AsRef<Path>) -> Result<SaveMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SaveMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;
        check_version(partial.version)?;
        Ok(partial.metadata)
    }
}

fn check_version(found: u32) -> Result<(), PersistError> {
    if found != SAVE_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: SAVE_VERSION,
            found,
        });
    }
    Ok(())
}

/// Information about a save file.
#[derive(Debug, Clone)]
pub struct SaveInfo {
    pub path: PathBuf,
    pub metadata: SaveMetadata,
}

/// List readable saves in a directory, newest first.
///
/// Files that are not saves of the current version are skipped.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<SaveInfo>, PersistError> {
    let mut saves = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Ok(metadata) = SavedGame::peek_metadata(&path).await {
                saves.push(SaveInfo { path, metadata });
            }
        }
    }

    // RFC 3339 UTC timestamps sort lexically.
    saves.sort_by(|a, b| {
        b.metadata
            .saved_at
            .cmp(&a.metadata.saved_at)
            .then_with(|| b.metadata.round.cmp(&a.metadata.round))
    });
    Ok(saves)
}

fn sanitize(campaign: &str) -> String {
    campaign
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Path of a campaign's rolling auto-save.
pub fn auto_save_path(base_dir: impl AsRef<Path>, campaign: &str) -> PathBuf {
    base_dir
        .as_ref()
        .join(format!("{}_autosave.json", sanitize(campaign)))
}

/// Path of a per-round snapshot.
pub fn round_save_path(base_dir: impl AsRef<Path>, campaign: &str, round: u32) -> PathBuf {
    base_dir
        .as_ref()
        .join(format!("{}_round_{round}.json", sanitize(campaign)))
}

/// Where committed rounds are persisted.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Persist a save. Returns a description of where it went.
    async fn save(&self, saved: &SavedGame) -> Result<String, PersistError>;

    /// Load the most recent save of a campaign.
    async fn load(&self, campaign: &str) -> Result<SavedGame, PersistError>;
}

#[async_trait]
impl<S: GameStore + ?Sized> GameStore for std::sync::Arc<S> {
    async fn save(&self, saved: &SavedGame) -> Result<String, PersistError> {
        (**self).save(saved).await
    }

    async fn load(&self, campaign: &str) -> Result<SavedGame, PersistError> {
        (**self).load(campaign).await
    }
}

/// Saves as JSON files in one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    keep_round_saves: bool,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            keep_round_saves: false,
        }
    }

    /// Also write a `<campaign>_round_<N>.json` snapshot per round.
    pub fn with_round_saves(mut self, keep: bool) -> Self {
        self.keep_round_saves = keep;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl GameStore for JsonFileStore {
    async fn save(&self, saved: &SavedGame) -> Result<String, PersistError> {
        // The auto-save is the resume point, so it is written last.
        if self.keep_round_saves {
            let snapshot = round_save_path(&self.dir, &saved.metadata.campaign, saved.metadata.round);
            saved.save_json(&snapshot).await?;
        }
        let path = auto_save_path(&self.dir, &saved.metadata.campaign);
        saved.save_json(&path).await?;
        tracing::debug!(path = %path.display(), round = saved.metadata.round, "game saved");
        Ok(path.display().to_string())
    }

    async fn load(&self, campaign: &str) -> Result<SavedGame, PersistError> {
        let path = auto_save_path(&self.dir, campaign);
        if !fs::try_exists(&path).await? {
            return Err(PersistError::NotFound(campaign.to_string()));
        }
        SavedGame::load_json(path).await
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saves: Mutex<Vec<SavedGame>>,
    fail: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose saves fail until [`set_failing(false)`](Self::set_failing).
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every save written so far, oldest first.
    pub fn saves(&self) -> Vec<SavedGame> {
        self.saves
            .lock()
            .map(|saves| saves.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn save(&self, saved: &SavedGame) -> Result<String, PersistError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable("memory store set to fail".into()));
        }
        let mut saves = self
            .saves
            .lock()
            .map_err(|_| PersistError::Unavailable("memory store poisoned".into()))?;
        saves.push(saved.clone());
        Ok(format!("memory #{}", saves.len()))
    }

    async fn load(&self, campaign: &str) -> Result<SavedGame, PersistError> {
        self.saves
            .lock()
            .map_err(|_| PersistError::Unavailable("memory store poisoned".into()))?
            .iter()
            .rev()
            .find(|s| s.metadata.campaign == campaign)
            .cloned()
            .ok_or_else(|| PersistError::NotFound(campaign.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use tempfile::tempdir;

    fn saved() -> SavedGame {
        let state = Scenario::crimson_crypt().into_state();
        SavedGame::new(state, AgentConfigs::from(&GameConfig::default()))
    }

    #[test]
    fn test_paths_are_sanitized() {
        let path = auto_save_path("/saves", "The Crimson Crypt!");
        assert_eq!(path, PathBuf::from("/saves/The_Crimson_Crypt__autosave.json"));
        let path = round_save_path("/saves", "Crypt", 4);
        assert_eq!(path, PathBuf::from("/saves/Crypt_round_4.json"));
    }

    #[test]
    fn test_metadata() {
        let saved = saved();
        assert_eq!(saved.version, SAVE_VERSION);
        assert_eq!(saved.metadata.player_count, 3);
        assert_eq!(saved.metadata.round, 0);
        assert_eq!(saved.metadata.saved_at, saved.saved_at);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("game.json");
        let saved = saved();

        saved.save_json(&path).await.unwrap();
        let loaded = SavedGame::load_json(&path).await.unwrap();
        assert_eq!(loaded, saved);

        let metadata = SavedGame::peek_metadata(&path).await.unwrap();
        assert_eq!(metadata.campaign, "The Crimson Crypt");
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("old.json");
        let mut saved = saved();
        saved.version = 99;
        saved.save_json(&path).await.unwrap();

        assert!(matches!(
            SavedGame::load_json(&path).await,
            Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: 99
            })
        ));
        assert!(matches!(
            SavedGame::peek_metadata(&path).await,
            Err(PersistError::VersionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_saves_newest_first() {
        let dir = tempdir().unwrap();
        let mut older = saved();
        older.metadata.campaign = "Older".into();
        older.metadata.saved_at = "2024-01-01T00:00:00+00:00".into();
        let mut newer = saved();
        newer.metadata.campaign = "Newer".into();
        newer.metadata.saved_at = "2025-01-01T00:00:00+00:00".into();

        older.save_json(dir.path().join("a.json")).await.unwrap();
        newer.save_json(dir.path().join("b.json")).await.unwrap();
        fs::write(dir.path().join("notes.txt"), "not a save").await.unwrap();
        fs::write(dir.path().join("broken.json"), "{").await.unwrap();

        let saves = list_saves(dir.path()).await.unwrap();
        let names: Vec<_> = saves.iter().map(|s| s.metadata.campaign.as_str()).collect();
        assert_eq!(names, vec!["Newer", "Older"]);
    }

    #[tokio::test]
    async fn test_file_store() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path()).with_round_saves(true);
        let mut saved = saved();
        saved.metadata.round = 2;

        store.save(&saved).await.unwrap();
        assert!(dir.path().join("The_Crimson_Crypt_autosave.json").exists());
        assert!(dir.path().join("The_Crimson_Crypt_round_2.json").exists());

        let loaded = store.load("The Crimson Crypt").await.unwrap();
        assert_eq!(loaded.metadata.round, 2);
        assert!(matches!(
            store.load("Elsewhere").await,
            Err(PersistError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::failing();
        assert!(store.save(&saved()).await.is_err());
        store.set_failing(false);
        store.save(&saved()).await.unwrap();
        assert_eq!(store.saves().len(), 1);
        assert!(store.load("The Crimson Crypt").await.is_ok());
    }
}
