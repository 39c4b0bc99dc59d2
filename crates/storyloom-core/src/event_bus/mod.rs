//! EventBus - broadcast-based event system for live pipeline events.
//!
//! Steps are published right after they are durably written, on one channel
//! per step kind, so a console view or any other in-process subscriber can
//! follow a session as it runs.

/// Core event bus implementation (broadcast channels).
pub mod bus;
/// Event type definitions for the session lifecycle.
pub mod types;

pub use bus::{EventBus, SubscriptionId};
pub use types::PipelineEvent;
