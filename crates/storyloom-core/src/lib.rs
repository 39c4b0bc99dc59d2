//! Storyloom Core - Transparent Generation Pipeline
//!
//! This crate drives scene generation end to end:
//! - Records: read-only access to characters and the scene outline
//! - Pipeline: context assembly, prompt compilation, knowledge fan-out and
//!   completion synthesis, with every step recorded
//! - Event bus: live step and lifecycle events for in-process subscribers
//! - Utils: retry with exponential backoff

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event_bus;
pub mod pipeline;
pub mod records;
pub mod utils;

pub use error::{Error, Result};
pub use event_bus::{EventBus, PipelineEvent, SubscriptionId};
pub use pipeline::{
    CompiledPrompt, ContextAssembler, ContinuityResolver, FanoutMode, KnowledgeFanout, Pipeline,
    PipelineConfig, PromptCompiler, PromptTemplate, SceneContext, Synthesizer, TemplateRegistry,
};
pub use records::{
    CharacterSummary, InMemoryRecordStore, RecordStore, SceneOutline, SqliteRecordStore,
};
pub use utils::{retry_with_backoff, RetryConfig, RetryError};

pub use storyloom_replay::{
    GeneratedOutput, SceneRef, Session, SessionId, SessionStatus, SessionSummary, SourceResult,
    Step, StepKind,
};
