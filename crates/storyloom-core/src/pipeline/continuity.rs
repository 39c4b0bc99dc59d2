//! Continuity - previous-scene lookup

use crate::error::Result;
use std::sync::Arc;
use storyloom_replay::{GeneratedOutput, PipelineStore, SceneRef, Session};
use tracing::debug;

/// Finds the text of the scene that narratively precedes another
#[derive(Clone)]
pub struct ContinuityResolver {
    store: Arc<dyn PipelineStore>,
}

impl ContinuityResolver {
    /// Create a resolver over a pipeline store
    #[must_use]
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    /// Output of the greatest scene strictly before `scene`.
    ///
    /// The session's own outputs win; otherwise any session's output is
    /// used. `None` for the first scene of the narrative.
    pub async fn previous_output(
        &self,
        session: &Session,
        scene: SceneRef,
    ) -> Result<Option<GeneratedOutput>> {
        if let Some(output) = self
            .store
            .latest_output_before(scene, Some(&session.id))
            .await?
        {
            debug!(scene = %scene, previous = %output.scene, "Continuity from current session");
            return Ok(Some(output));
        }

        let output = self.store.latest_output_before(scene, None).await?;
        if let Some(output) = &output {
            debug!(
                scene = %scene,
                previous = %output.scene,
                from_session = %output.session_id,
                "Continuity from earlier session"
            );
        }
        Ok(output)
    }

    /// Text of the previous scene, if any
    pub async fn resolve_previous(
        &self,
        session: &Session,
        scene: SceneRef,
    ) -> Result<Option<String>> {
        Ok(self
            .previous_output(session, scene)
            .await?
            .map(|output| output.text))
    }
}
