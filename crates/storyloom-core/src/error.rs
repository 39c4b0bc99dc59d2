//! Error types for storyloom-core
//!
//! Errors are classified by blast radius: most end only the current scene,
//! store failures end the whole session.

use storyloom_replay::SceneRef;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// No outline exists for the scene
    #[error("scene not found: {0}")]
    SceneNotFound(SceneRef),

    /// Some other referenced record is missing
    #[error("not found: {0}")]
    NotFound(String),

    /// A knowledge source failed (captured into a failed source result)
    #[error("source query failed for {bucket}: {message}")]
    SourceQuery {
        /// Knowledge source name
        bucket: String,
        /// Error description
        message: String,
    },

    /// The completion service failed or timed out
    #[error("generation error: {0}")]
    Generation(String),

    /// Pipeline store failure
    #[error("store error: {0}")]
    Store(#[from] storyloom_replay::Error),

    /// Project records could not be read
    #[error("records error: {0}")]
    Records(String),

    /// The session does not accept scenes in its current status
    #[error("session {0} is not running")]
    SessionNotRunning(String),

    /// Invalid configuration
    #[error("invalid configuration: {field}: {message}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// Template could not be loaded or parsed
    #[error("template error: {0}")]
    Template(String),
}

impl Error {
    /// Whether this error ends the whole session rather than one scene.
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        match self {
            Self::Store(storyloom_replay::Error::InvalidTransition { .. }) => false,
            Self::Store(_) | Self::Records(_) => true,
            _ => false,
        }
    }

    /// Hint for the command line, when there is an obvious fix
    #[must_use]
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::SceneNotFound(scene) => Some(format!(
                "Add an outline row for act {} scene {} to story_outline.",
                scene.act, scene.sequence
            )),
            Self::InvalidConfig { field, .. } => Some(format!(
                "Check the '{field}' setting in config/default.toml or the STORYLOOM_ environment."
            )),
            Self::Records(_) => {
                Some("Check that [project] database points at a project database.".to_string())
            }
            Self::Generation(_) => {
                Some("Check OPENAI_API_KEY and the [completion] settings.".to_string())
            }
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fatal_classification() {
        let store = Error::from(storyloom_replay::Error::Database("disk I/O error".into()));
        assert!(store.is_session_fatal());
        assert!(Error::Records("no such table".into()).is_session_fatal());

        assert!(!Error::SceneNotFound(SceneRef::new(1, 9)).is_session_fatal());
        assert!(!Error::Generation("timeout".into()).is_session_fatal());
        assert!(!Error::SourceQuery {
            bucket: "books".into(),
            message: "timeout".into()
        }
        .is_session_fatal());

        let transition = Error::from(storyloom_replay::Error::InvalidTransition {
            from: "completed".into(),
            to: "running".into(),
        });
        assert!(!transition.is_session_fatal());
    }

    #[test]
    fn test_source_query_display() {
        let err = Error::SourceQuery {
            bucket: "plays".into(),
            message: "timeout after 50ms".into(),
        };
        assert_eq!(
            err.to_string(),
            "source query failed for plays: timeout after 50ms"
        );
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_suggestions() {
        let missing = Error::SceneNotFound(SceneRef::new(2, 4));
        assert!(missing.suggestion().unwrap().contains("act 2 scene 4"));

        let config = Error::InvalidConfig {
            field: "pipeline.continuity_window".into(),
            message: "must be positive".into(),
        };
        assert!(config.suggestion().unwrap().contains("pipeline.continuity_window"));

        assert!(Error::Template("bad".into()).suggestion().is_none());
    }
}
