use serde::Serialize;
use storyloom_replay::{SceneRef, SessionId, Step, StepKind};

/// Events emitted while a session runs.
///
/// Step payloads are carried as recorded; everything else is a lightweight
/// lifecycle marker.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Session moved to running
    SessionStarted {
        /// Session identifier
        session_id: SessionId,
        /// Active knowledge sources
        sources: Vec<String>,
    },
    /// A scene is about to be processed
    SceneStarted {
        /// Session identifier
        session_id: SessionId,
        /// Scene being processed
        scene: SceneRef,
    },
    /// A step was durably recorded
    StepRecorded {
        /// The recorded step
        step: Step,
    },
    /// A scene produced a persisted output
    SceneCompleted {
        /// Session identifier
        session_id: SessionId,
        /// Completed scene
        scene: SceneRef,
        /// Words in the generated output
        word_count: u64,
    },
    /// A scene's knowledge sources were queried without generation
    SceneBrainstormed {
        /// Session identifier
        session_id: SessionId,
        /// Brainstormed scene
        scene: SceneRef,
        /// Sources that answered
        sources_answered: usize,
        /// Sources queried
        sources_queried: usize,
    },
    /// A scene failed; the session continues unless the error was fatal
    SceneFailed {
        /// Session identifier
        session_id: SessionId,
        /// Failed scene
        scene: SceneRef,
        /// Error description
        error: String,
    },
    /// Every requested scene was attempted
    SessionCompleted {
        /// Session identifier
        session_id: SessionId,
        /// Scenes attempted
        scenes_processed: u32,
        /// Scenes with a persisted output
        scenes_succeeded: u32,
    },
    /// The session halted on a fatal error
    SessionFailed {
        /// Session identifier
        session_id: SessionId,
        /// Error description
        error: String,
    },
}

impl PipelineEvent {
    /// Session the event belongs to
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::StepRecorded { step } => &step.session_id,
            Self::SessionStarted { session_id, .. }
            | Self::SceneStarted { session_id, .. }
            | Self::SceneCompleted { session_id, .. }
            | Self::SceneBrainstormed { session_id, .. }
            | Self::SceneFailed { session_id, .. }
            | Self::SessionCompleted { session_id, .. }
            | Self::SessionFailed { session_id, .. } => session_id,
        }
    }

    /// Step kind, for step events
    #[must_use]
    pub fn step_kind(&self) -> Option<StepKind> {
        match self {
            Self::StepRecorded { step } => Some(step.kind),
            _ => None,
        }
    }
}
