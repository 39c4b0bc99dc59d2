//! Context - everything known about a scene before any query is made

use super::continuity::ContinuityResolver;
use crate::error::{Error, Result};
use crate::records::{CharacterSummary, RecordStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use storyloom_replay::{PipelineStore, SceneRef, Session};
use tracing::{debug, instrument, warn};

/// Assembled input for one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneContext {
    /// Scene being written
    pub scene: SceneRef,
    /// Events the scene must contain
    pub required_events: String,
    /// Characters listed in the outline, in outline order
    pub characters: Vec<CharacterSummary>,
    /// Text of the previous scene
    pub continuity: Option<String>,
    /// Responses from earlier sessions for this scene, by source
    pub prior_insights: BTreeMap<String, String>,
    /// User guidance for the session
    pub guidance: Option<String>,
    /// Active knowledge sources
    pub sources: Vec<String>,
}

impl SceneContext {
    /// One description line per character
    #[must_use]
    pub fn character_lines(&self) -> String {
        self.characters
            .iter()
            .map(CharacterSummary::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Character names, comma separated
    #[must_use]
    pub fn character_names(&self) -> String {
        self.characters
            .iter()
            .map(|c| c.name.trim())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Builds a [`SceneContext`] from records and earlier pipeline output
#[derive(Clone)]
pub struct ContextAssembler {
    records: Arc<dyn RecordStore>,
    store: Arc<dyn PipelineStore>,
    continuity: ContinuityResolver,
}

impl ContextAssembler {
    /// Create an assembler
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>, store: Arc<dyn PipelineStore>) -> Self {
        Self {
            continuity: ContinuityResolver::new(store.clone()),
            records,
            store,
        }
    }

    /// Assemble the context for `scene`.
    ///
    /// Fails with [`Error::SceneNotFound`] when the outline has no row for it.
    #[instrument(skip(self, session), fields(session_id = %session.id, scene = %scene))]
    pub async fn assemble(&self, session: &Session, scene: SceneRef) -> Result<SceneContext> {
        let outline = self
            .records
            .scene_outline(scene)
            .await?
            .ok_or(Error::SceneNotFound(scene))?;

        let roster = self.records.characters().await?;
        let mut characters: Vec<CharacterSummary> = Vec::new();
        for name in outline.character_names() {
            match roster.iter().find(|c| c.matches(name)) {
                Some(found) if !characters.iter().any(|c| c.matches(&found.name)) => {
                    characters.push(found.clone());
                }
                Some(_) => {}
                None => warn!(character = name, "Outline names an unknown character"),
            }
        }

        let continuity = self.continuity.resolve_previous(session, scene).await?;
        let prior_insights = self.store.prior_insights(scene, &session.id).await?;

        debug!(
            characters = characters.len(),
            has_continuity = continuity.is_some(),
            insights = prior_insights.len(),
            "Context assembled"
        );

        Ok(SceneContext {
            scene,
            required_events: outline.required_events.trim().to_string(),
            characters,
            continuity,
            prior_insights,
            guidance: session.guidance.clone(),
            sources: session.sources.clone(),
        })
    }
}
