//! Error types for storyloom-llm

use thiserror::Error;

/// LLM error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// API error
    #[error("api error: {0}")]
    Api(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit,

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Unknown knowledge source
    #[error("unknown knowledge source: {0}")]
    UnknownSource(String),
}

impl Error {
    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network(_) | Self::Timeout(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::Timeout(1000).is_retryable());
        assert!(Error::Network("reset".into()).is_retryable());
        assert!(Error::RateLimit.is_retryable());
        assert!(!Error::Api("bad request".into()).is_retryable());
        assert!(!Error::UnknownSource("x".into()).is_retryable());
    }
}
