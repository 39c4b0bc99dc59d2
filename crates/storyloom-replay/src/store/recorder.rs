//! StepRecorder - Ordered step recording for one session

use super::traits::PipelineStore;
use crate::error::Result;
use crate::event::{SceneRef, SessionId, Step, StepKind};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Receives every step right after it has been durably written.
///
/// Called while the recorder still holds its write lock, so observers see
/// steps in sequence order. Implementations must not block.
pub trait StepObserver: Send + Sync {
    /// Handle a freshly recorded step
    fn on_step(&self, step: &Step);
}

/// Step recorder for one session.
///
/// Writes are serialized through an async mutex: concurrent callers get
/// consecutive sequence numbers, and a failed write leaves no gap because the
/// counter only advances after the store accepted the step.
pub struct StepRecorder {
    store: Arc<dyn PipelineStore>,
    session_id: SessionId,
    next_sequence: Mutex<i64>,
    observer: Option<Arc<dyn StepObserver>>,
}

impl StepRecorder {
    /// Create a recorder for a session with an empty log
    pub fn new(store: Arc<dyn PipelineStore>, session_id: SessionId) -> Self {
        Self {
            store,
            session_id,
            next_sequence: Mutex::new(1),
            observer: None,
        }
    }

    /// Create a recorder, continuing after the steps already stored
    pub async fn new_from_existing(
        store: Arc<dyn PipelineStore>,
        session_id: SessionId,
    ) -> Result<Self> {
        let next = store.next_sequence(&session_id).await?;
        Ok(Self {
            store,
            session_id,
            next_sequence: Mutex::new(next),
            observer: None,
        })
    }

    /// Attach an observer notified after each durable write
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get the session ID
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Record a step with automatic sequence numbering
    pub async fn record(
        &self,
        kind: StepKind,
        scene: Option<SceneRef>,
        payload: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Result<Step> {
        let mut next = self.next_sequence.lock().await;

        let step = Step::new(self.session_id.clone(), *next, kind)
            .with_scene(scene)
            .with_payload(payload)
            .with_metadata(metadata);
        self.store.append_step(&step).await?;
        *next += 1;

        if let Some(observer) = &self.observer {
            observer.on_step(&step);
        }
        Ok(step)
    }

    /// Record a scene-scoped step
    pub async fn record_scene(
        &self,
        kind: StepKind,
        scene: SceneRef,
        payload: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Result<Step> {
        self.record(kind, Some(scene), payload, metadata).await
    }
}
