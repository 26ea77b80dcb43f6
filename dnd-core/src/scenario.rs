//! Starting points for a campaign.

use crate::character::{Character, CharacterClass, PartyMember, PersonalityProfile, Race};
use crate::state::{GameState, PartyStatus, StateError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid scenario: {0}")]
    Invalid(#[from] StateError),

    #[error("Invalid character {name}: {errors:?}")]
    InvalidCharacter { name: String, errors: Vec<String> },
}

/// A campaign opening: the party and the situation they start in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub campaign: String,
    pub initial_situation: String,
    pub party_status: PartyStatus,
    pub party: Vec<PartyMember>,
}

impl Scenario {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let content = tokio::fs::read_to_string(path).await?;
        let scenario: Self = serde_json::from_str(&content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// At least one member, unique names, and every character sheet valid.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.clone().into_state().validate()?;
        for member in &self.party {
            let report = member.character.validate();
            if !report.is_valid() {
                return Err(ScenarioError::InvalidCharacter {
                    name: member.name().to_string(),
                    errors: report.errors,
                });
            }
            for warning in &report.warnings {
                tracing::warn!(character = member.name(), "{warning}");
            }
        }
        Ok(())
    }

    pub fn into_state(self) -> GameState {
        GameState::new(
            self.campaign,
            self.party,
            self.initial_situation,
            self.party_status,
        )
    }

    /// The built-in sample adventure.
    pub fn crimson_crypt() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let brussae = PartyMember::new(
            Character::from_parts("Brussae", 2, CharacterClass::Paladin, Race::Human)
                .with_key_abilities(["divine magic", "combat", "healing"])
                .with_equipment(["longsword", "shield", "chain mail"])
                .with_description("A warrior of faith, devoted to protecting the innocent"),
            PersonalityProfile::new(
                strings(&["brave", "compassionate", "direct"]),
                strings(&["protect the innocent", "uphold justice"]),
                strings(&["sworn to defend the weak", "devoted to their deity"]),
                strings(&["too trusting", "sees everything as good vs evil"]),
            )
            .with_quirks(strings(&[
                "always cleans their sword after battle",
                "prays before every meal",
            ])),
        );

        let shadowstep = PartyMember::new(
            Character::from_parts("Shadowstep", 3, CharacterClass::Rogue, Race::Elf)
                .with_key_abilities(["stealth", "lockpicking", "acrobatics"])
                .with_equipment(["daggers", "thieves tools", "leather armor"])
                .with_description("A nimble burglar with a heart of gold"),
            PersonalityProfile::new(
                strings(&["cunning", "cautious", "witty"]),
                strings(&["freedom", "loyalty to friends"]),
                strings(&["protective of street urchins", "owes a debt to a noble"]),
                strings(&["greedy", "overconfident in their abilities"]),
            )
            .with_quirks(strings(&[
                "always checks for traps, even in safe places",
                "collects small trinkets",
            ])),
        );

        let eldara = PartyMember::new(
            Character::from_parts("Eldara", 2, CharacterClass::Wizard, Race::HalfElf)
                .with_key_abilities(["arcane magic", "investigation", "history"])
                .with_equipment(["staff", "spellbook", "component pouch"])
                .with_description("A scholarly mage seeking ancient knowledge"),
            PersonalityProfile::new(
                strings(&["analytical", "curious", "reserved"]),
                strings(&["knowledge", "magical preservation"]),
                strings(&["ancient magical texts", "wizard academy"]),
                strings(&[
                    "overthinks simple problems",
                    "dismissive of non-magical solutions",
                ]),
            )
            .with_quirks(strings(&[
                "takes notes about everything",
                "speaks in unnecessarily complex terms",
            ])),
        );

        Self {
            campaign: "The Crimson Crypt".into(),
            initial_situation: "The party stands at the entrance of the Crimson Crypt, an \
                ancient tomb hidden in the forests north of the city. Faded runes cover the \
                stone doorway, and a cold breeze seeps out from the darkness within while the \
                sun sets behind the trees. The Arcane Academy hired the party to recover the \
                Orb of First Light from the crypt's depths, and fresh tracks in the mud \
                suggest rival adventurers got here first."
                .into(),
            party_status: PartyStatus::at("The entrance of the Crimson Crypt"),
            party: vec![brussae, shadowstep, eldara],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_crimson_crypt_is_valid() {
        let scenario = Scenario::crimson_crypt();
        assert!(scenario.validate().is_ok());
        let names: Vec<_> = scenario.party.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Brussae", "Shadowstep", "Eldara"]);
        assert_eq!(scenario.party[2].character.race, Race::HalfElf);
    }

    #[test]
    fn test_empty_party_rejected() {
        let mut scenario = Scenario::crimson_crypt();
        scenario.party.clear();
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Invalid(StateError::EmptyParty))
        ));
    }

    #[test]
    fn test_bad_status_rejected() {
        let mut scenario = Scenario::crimson_crypt();
        scenario.party[0]
            .character
            .status
            .insert("pack".into(), serde_json::json!(["rope"]));
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::InvalidCharacter { ref name, .. }) if name == "Brussae"
        ));
    }

    #[tokio::test]
    async fn test_load_from_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crypt.json");
        let scenario = Scenario::crimson_crypt();
        tokio::fs::write(&path, serde_json::to_string(&scenario).unwrap())
            .await
            .unwrap();
        assert_eq!(Scenario::load(&path).await.unwrap(), scenario);
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_class() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let mut value = serde_json::to_value(Scenario::crimson_crypt()).unwrap();
        value["party"][0]["character"]["class"] = serde_json::json!("necromancer");
        tokio::fs::write(&path, value.to_string()).await.unwrap();
        assert!(matches!(
            Scenario::load(&path).await,
            Err(ScenarioError::Json(_))
        ));
    }
}
