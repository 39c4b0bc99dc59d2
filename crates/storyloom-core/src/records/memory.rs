//! In-memory record store

use super::traits::RecordStore;
use super::types::{CharacterSummary, SceneOutline};
use crate::error::Result;
use std::collections::BTreeMap;
use storyloom_replay::SceneRef;

/// Record store backed by plain collections, for tests and scripted runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    characters: Vec<CharacterSummary>,
    outlines: BTreeMap<SceneRef, SceneOutline>,
}

impl InMemoryRecordStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a character
    #[must_use]
    pub fn with_character(mut self, character: CharacterSummary) -> Self {
        self.characters.push(character);
        self
    }

    /// Add (or replace) a scene outline
    #[must_use]
    pub fn with_outline(mut self, outline: SceneOutline) -> Self {
        self.outlines.insert(outline.scene, outline);
        self
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn scene_outline(&self, scene: SceneRef) -> Result<Option<SceneOutline>> {
        Ok(self.outlines.get(&scene).cloned())
    }

    async fn characters(&self) -> Result<Vec<CharacterSummary>> {
        Ok(self.characters.clone())
    }

    async fn scenes(&self) -> Result<Vec<SceneRef>> {
        Ok(self.outlines.keys().copied().collect())
    }
}
