//! Trait for pipeline storage backends

use crate::error::Result;
use crate::event::{GeneratedOutput, SceneRef, Session, SessionId, SourceResult, Step, StepKind};
use std::collections::BTreeMap;

/// Durable store for sessions, steps, source results and generated outputs.
///
/// Steps and outputs are append-only; sessions are the only mutable records.
#[async_trait::async_trait]
pub trait PipelineStore: Send + Sync {
    /// Create a session record (must be called before appending steps)
    async fn create_session(&self, session: &Session) -> Result<()>;

    /// Overwrite the mutable fields of a session (status, counters, timestamps)
    async fn update_session(&self, session: &Session) -> Result<()>;

    /// Get a session by ID
    async fn get_session(&self, id: &SessionId) -> Result<Session>;

    /// List the most recent sessions, newest first
    async fn list_sessions(&self, limit: i64) -> Result<Vec<Session>>;

    /// Append a step
    async fn append_step(&self, step: &Step) -> Result<()>;

    /// All steps of a session in sequence order
    async fn get_steps(&self, session_id: &SessionId) -> Result<Vec<Step>>;

    /// Steps of one kind in sequence order
    async fn get_steps_by_kind(&self, session_id: &SessionId, kind: StepKind) -> Result<Vec<Step>>;

    /// Next free sequence number for a session (1 for an empty log)
    async fn next_sequence(&self, session_id: &SessionId) -> Result<i64>;

    /// Persist a knowledge source result
    async fn save_source_result(&self, result: &SourceResult) -> Result<()>;

    /// Source results recorded for a scene within one session
    async fn get_source_results(
        &self,
        session_id: &SessionId,
        scene: SceneRef,
    ) -> Result<Vec<SourceResult>>;

    /// Latest successful response per source for `scene`, from sessions other
    /// than `exclude`
    async fn prior_insights(
        &self,
        scene: SceneRef,
        exclude: &SessionId,
    ) -> Result<BTreeMap<String, String>>;

    /// Persist a generated output
    async fn save_output(&self, output: &GeneratedOutput) -> Result<()>;

    /// Output with the greatest scene strictly before `scene`, optionally
    /// restricted to one session. Ties go to the most recently persisted.
    async fn latest_output_before(
        &self,
        scene: SceneRef,
        session_id: Option<&SessionId>,
    ) -> Result<Option<GeneratedOutput>>;

    /// Outputs persisted by a session in scene order
    async fn get_outputs(&self, session_id: &SessionId) -> Result<Vec<GeneratedOutput>>;

    /// Get the store name (for logging)
    fn name(&self) -> &str;
}
