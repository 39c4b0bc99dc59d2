//! Storyloom Replay - Session and Step Log
//!
//! This crate provides the durable, replayable record of generation runs:
//! - Event: sessions, steps, source results and generated outputs
//! - Store: persistence (SQLite) and the per-session step recorder
//! - Viewer: timelines and session summaries

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod store;
pub mod viewer;

pub use error::{Error, Result};
pub use event::{
    GeneratedOutput, SceneRef, Session, SessionId, SessionStatus, SourceResult, Step, StepKind,
    TimelineEntry,
};
pub use store::{PipelineStore, SqliteStore, StepObserver, StepRecorder};
pub use viewer::{SceneOutcome, SessionStats, SessionSummary, SessionViewer};
