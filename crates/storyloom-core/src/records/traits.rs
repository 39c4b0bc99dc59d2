//! Trait for project record backends

use super::types::{CharacterSummary, SceneOutline};
use crate::error::Result;
use storyloom_replay::SceneRef;

/// Read-only access to characters and the scene outline.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Outline for one scene, if it exists
    async fn scene_outline(&self, scene: SceneRef) -> Result<Option<SceneOutline>>;

    /// All characters
    async fn characters(&self) -> Result<Vec<CharacterSummary>>;

    /// Every outlined scene in narrative order
    async fn scenes(&self) -> Result<Vec<SceneRef>>;
}
