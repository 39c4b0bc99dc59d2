//! Error types for storyloom-replay

use thiserror::Error;

/// Replay error type
#[derive(Debug, Error)]
pub enum Error {
    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session status change that the lifecycle does not allow
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
