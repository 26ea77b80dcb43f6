//! Player characters and their personalities.
//!
//! Identity (name, class, race, abilities) is fixed once a character is
//! seated; the `status` map is the only part that changes between rounds.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from character validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CharacterError {
    #[error("Invalid character class: {0}")]
    InvalidClass(String),

    #[error("Invalid race: {0}")]
    InvalidRace(String),

    #[error("Character name cannot be empty")]
    EmptyName,

    #[error("Level {0} is outside 1..=20")]
    InvalidLevel(u8),

    #[error("{field} needs at least one entry")]
    EmptyList { field: &'static str },
}

/// Standard character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl CharacterClass {
    pub const ALL: [CharacterClass; 12] = [
        CharacterClass::Barbarian,
        CharacterClass::Bard,
        CharacterClass::Cleric,
        CharacterClass::Druid,
        CharacterClass::Fighter,
        CharacterClass::Monk,
        CharacterClass::Paladin,
        CharacterClass::Ranger,
        CharacterClass::Rogue,
        CharacterClass::Sorcerer,
        CharacterClass::Warlock,
        CharacterClass::Wizard,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
        }
    }
}

impl FromStr for CharacterClass {
    type Err = CharacterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|class| class.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CharacterError::InvalidClass(s.to_string()))
    }
}

impl TryFrom<String> for CharacterClass {
    type Error = CharacterError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Standard playable races.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum Race {
    Human,
    Elf,
    Dwarf,
    Halfling,
    Gnome,
    HalfElf,
    HalfOrc,
    Tiefling,
    Dragonborn,
}

impl Race {
    pub const ALL: [Race; 9] = [
        Race::Human,
        Race::Elf,
        Race::Dwarf,
        Race::Halfling,
        Race::Gnome,
        Race::HalfElf,
        Race::HalfOrc,
        Race::Tiefling,
        Race::Dragonborn,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Race::Human => "Human",
            Race::Elf => "Elf",
            Race::Dwarf => "Dwarf",
            Race::Halfling => "Halfling",
            Race::Gnome => "Gnome",
            Race::HalfElf => "Half-Elf",
            Race::HalfOrc => "Half-Orc",
            Race::Tiefling => "Tiefling",
            Race::Dragonborn => "Dragonborn",
        }
    }
}

impl FromStr for Race {
    type Err = CharacterError;

    /// Accepts "half-elf", "Half Elf" and "HALF_ELF" alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c })
            .collect();
        Self::ALL
            .into_iter()
            .find(|race| race.name().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| CharacterError::InvalidRace(s.to_string()))
    }
}

impl TryFrom<String> for Race {
    type Error = CharacterError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A special ability or feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ability {
    pub name: String,
    pub description: String,
    /// e.g. "at will", "once per day".
    #[serde(default)]
    pub usage_frequency: Option<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

/// A detailed inventory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub name: String,
    /// weapon, armor, shield, tool, ...
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Traits, ideals, bonds and flaws that drive roleplay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    pub traits: Vec<String>,
    pub ideals: Vec<String>,
    pub bonds: Vec<String>,
    pub flaws: Vec<String>,
    #[serde(default)]
    pub quirks: Vec<String>,
}

impl PersonalityProfile {
    pub fn new(
        traits: Vec<String>,
        ideals: Vec<String>,
        bonds: Vec<String>,
        flaws: Vec<String>,
    ) -> Self {
        Self {
            traits,
            ideals,
            bonds,
            flaws,
            quirks: Vec::new(),
        }
    }

    pub fn with_quirks(mut self, quirks: Vec<String>) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn validate(&self) -> Result<(), CharacterError> {
        for (field, values) in [
            ("traits", &self.traits),
            ("ideals", &self.ideals),
            ("bonds", &self.bonds),
            ("flaws", &self.flaws),
        ] {
            if values.iter().all(|v| v.trim().is_empty()) {
                return Err(CharacterError::EmptyList { field });
            }
        }
        Ok(())
    }

    /// Render the profile for a system prompt.
    pub fn to_prompt(&self) -> String {
        let mut sections = vec!["Personality Profile:".to_string()];
        for (title, values) in [
            ("Traits", &self.traits),
            ("Ideals", &self.ideals),
            ("Bonds", &self.bonds),
            ("Flaws", &self.flaws),
            ("Quirks", &self.quirks),
        ] {
            if values.is_empty() {
                continue;
            }
            sections.push(format!("\n{title}:"));
            sections.extend(values.iter().map(|v| format!("- {v}")));
        }
        sections.join("\n")
    }
}

/// A player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub level: u8,
    pub class: CharacterClass,
    pub race: Race,
    pub key_abilities: Vec<String>,
    pub equipment: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub abilities: Vec<Ability>,
    #[serde(default)]
    pub inventory: Vec<Equipment>,
    /// Current conditions and stats. Values are scalars.
    #[serde(default)]
    pub status: BTreeMap<String, Value>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Outcome of `Character::validate`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Character {
    /// Create a character from loosely-typed class and race names.
    pub fn new(
        name: impl Into<String>,
        level: u8,
        class: &str,
        race: &str,
    ) -> Result<Self, CharacterError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CharacterError::EmptyName);
        }
        if !(1..=20).contains(&level) {
            return Err(CharacterError::InvalidLevel(level));
        }
        Ok(Self::from_parts(name, level, class.parse()?, race.parse()?))
    }

    /// Create a character from already-typed parts. Call [`check`](Self::check)
    /// before trusting the name and level.
    pub fn from_parts(name: impl Into<String>, level: u8, class: CharacterClass, race: Race) -> Self {
        Self {
            name: name.into(),
            level,
            class,
            race,
            key_abilities: Vec::new(),
            equipment: Vec::new(),
            description: String::new(),
            abilities: Vec::new(),
            inventory: Vec::new(),
            status: BTreeMap::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_key_abilities<S: Into<String>>(mut self, abilities: impl IntoIterator<Item = S>) -> Self {
        self.key_abilities = abilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_equipment<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.equipment = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Structural checks that make a character unusable.
    pub fn check(&self) -> Result<(), CharacterError> {
        if self.name.trim().is_empty() {
            return Err(CharacterError::EmptyName);
        }
        if !(1..=20).contains(&self.level) {
            return Err(CharacterError::InvalidLevel(self.level));
        }
        if self.key_abilities.is_empty() {
            return Err(CharacterError::EmptyList {
                field: "key_abilities",
            });
        }
        Ok(())
    }

    /// Consistency checks between the summary lists and the detailed records.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if let Err(e) = self.check() {
            report.errors.push(e.to_string());
        }

        // Detailed records are optional; only cross-check when present.
        if !self.inventory.is_empty() {
            for item in &self.equipment {
                if !self
                    .inventory
                    .iter()
                    .any(|i| i.name.eq_ignore_ascii_case(item))
                {
                    report
                        .warnings
                        .push(format!("Equipment '{item}' not found in detailed inventory"));
                }
            }
        }

        if !self.abilities.is_empty() {
            for ability in &self.key_abilities {
                if !self
                    .abilities
                    .iter()
                    .any(|a| a.name.eq_ignore_ascii_case(ability))
                {
                    report
                        .warnings
                        .push(format!("Key ability '{ability}' not found in detailed abilities"));
                }
            }
        }

        for (key, value) in &self.status {
            if value.is_array() || value.is_object() {
                report
                    .errors
                    .push(format!("Invalid status value type for '{key}'"));
            }
        }

        report
    }

    /// Merge status changes, then drop anything that resolved to null or false.
    pub fn apply_status(&mut self, changes: &BTreeMap<String, Value>) {
        for (key, value) in changes {
            self.status.insert(key.clone(), value.clone());
        }
        self.status
            .retain(|_, v| !v.is_null() && *v != Value::Bool(false));
    }

    /// Render the character for prompts.
    pub fn to_prompt(&self) -> String {
        let mut lines = vec![
            format!("Name: {}", self.name),
            format!("Level {} {} {}", self.level, self.race, self.class),
            format!("Key abilities: {}", self.key_abilities.join(", ")),
            format!("Equipment: {}", self.equipment.join(", ")),
        ];

        if !self.description.is_empty() {
            lines.push(format!("Description: {}", self.description));
        }

        if !self.status.is_empty() {
            lines.push("Status:".to_string());
            for (key, value) in &self.status {
                let shown = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                lines.push(format!("- {key}: {shown}"));
            }
        }

        lines.join("\n")
    }
}

/// A character in the seating order together with how they are played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyMember {
    pub character: Character,
    pub personality: PersonalityProfile,
}

impl PartyMember {
    pub fn new(character: Character, personality: PersonalityProfile) -> Self {
        Self {
            character,
            personality,
        }
    }

    pub fn name(&self) -> &str {
        &self.character.name
    }
}
