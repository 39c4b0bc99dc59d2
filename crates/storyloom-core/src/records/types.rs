//! Record types

use serde::{Deserialize, Serialize};
use storyloom_replay::SceneRef;

/// A character as the pipeline sees it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSummary {
    /// Character name
    pub name: String,
    /// Gender
    pub gender: Option<String>,
    /// Age, as entered
    pub age: Option<String>,
    /// What stands in the way of their romance
    pub challenge: Option<String>,
    /// Trait that makes them lovable
    pub lovable_trait: Option<String>,
    /// Flaw played for comedy
    pub flaw: Option<String>,
}

impl CharacterSummary {
    /// Create a character with only a name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set gender
    #[must_use]
    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    /// Set age
    #[must_use]
    pub fn with_age(mut self, age: impl Into<String>) -> Self {
        self.age = Some(age.into());
        self
    }

    /// Set romantic challenge
    #[must_use]
    pub fn with_challenge(mut self, challenge: impl Into<String>) -> Self {
        self.challenge = Some(challenge.into());
        self
    }

    /// Set lovable trait
    #[must_use]
    pub fn with_lovable_trait(mut self, value: impl Into<String>) -> Self {
        self.lovable_trait = Some(value.into());
        self
    }

    /// Set comedic flaw
    #[must_use]
    pub fn with_flaw(mut self, flaw: impl Into<String>) -> Self {
        self.flaw = Some(flaw.into());
        self
    }

    /// Whether `name` refers to this character (trimmed, case-insensitive)
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }

    /// One-line description used in prompts:
    /// `NAME (age, gender): challenge. Lovable trait: x. Comic flaw: y.`
    #[must_use]
    pub fn describe(&self) -> String {
        let mut line = self.name.trim().to_uppercase();

        let details: Vec<&str> = [self.age.as_deref(), self.gender.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if !details.is_empty() {
            line.push_str(&format!(" ({})", details.join(", ")));
        }
        line.push(':');

        if let Some(challenge) = non_empty(&self.challenge) {
            line.push_str(&format!(" {}.", challenge.trim_end_matches('.')));
        }
        if let Some(lovable) = non_empty(&self.lovable_trait) {
            line.push_str(&format!(" Lovable trait: {}.", lovable.trim_end_matches('.')));
        }
        if let Some(flaw) = non_empty(&self.flaw) {
            line.push_str(&format!(" Comic flaw: {}.", flaw.trim_end_matches('.')));
        }
        line
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Outline row for one scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneOutline {
    /// Scene position
    pub scene: SceneRef,
    /// Comma-separated character names, as stored
    pub characters: String,
    /// Events the scene must contain
    pub required_events: String,
}

impl SceneOutline {
    /// Create an outline row
    #[must_use]
    pub fn new(
        scene: SceneRef,
        characters: impl Into<String>,
        required_events: impl Into<String>,
    ) -> Self {
        Self {
            scene,
            characters: characters.into(),
            required_events: required_events.into(),
        }
    }

    /// Character names listed for the scene, trimmed, empties dropped
    pub fn character_names(&self) -> impl Iterator<Item = &str> {
        self.characters
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
