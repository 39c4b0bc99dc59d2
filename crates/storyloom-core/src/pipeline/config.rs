//! Pipeline configuration

use crate::error::{Error, Result};
use crate::utils::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use storyloom_llm::DEFAULT_QUERY_MODE;

/// How knowledge queries for one scene are issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutMode {
    /// All sources at once, bounded by `max_concurrent_queries`
    #[default]
    Concurrent,
    /// One source after another, pausing `query_delay_ms` between calls
    Sequential,
}

/// Pipeline tuning knobs, mirrored by the `[pipeline]` config section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Trailing characters of the previous scene quoted for continuity
    pub continuity_window: usize,
    /// Characters kept from each insight or source response
    pub excerpt_len: usize,
    /// Retrieval mode passed to every knowledge query
    pub query_mode: String,
    /// Fan-out strategy
    pub fanout: FanoutMode,
    /// Upper bound on in-flight queries in concurrent mode
    pub max_concurrent_queries: usize,
    /// Pause between queries in sequential mode
    pub query_delay_ms: u64,
    /// Pause between scenes
    pub scene_pause_ms: u64,
    /// Timeout for one knowledge query attempt
    pub query_timeout_ms: u64,
    /// Timeout for the final generation call
    pub generation_timeout_ms: u64,
    /// Retry policy for knowledge queries
    pub retry: RetryConfig,
    /// Completion model; the provider default when unset
    pub model: Option<String>,
    /// Token limit for generated scenes
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Opening lines of the final prompt
    pub preamble: Vec<String>,
    /// Closing requirement bullets of the final prompt
    pub requirements: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            continuity_window: 400,
            excerpt_len: 250,
            query_mode: DEFAULT_QUERY_MODE.to_string(),
            fanout: FanoutMode::Concurrent,
            max_concurrent_queries: 4,
            query_delay_ms: 300,
            scene_pause_ms: 1000,
            query_timeout_ms: 120_000,
            generation_timeout_ms: 300_000,
            retry: RetryConfig::default(),
            model: None,
            max_tokens: None,
            temperature: None,
            preamble: vec![
                "You are writing a Hollywood romantic comedy screenplay in standard format."
                    .to_string(),
                "Style: Late 90s/early 2000s romantic comedies - genuine, witty, heartfelt."
                    .to_string(),
            ],
            requirements: vec![
                "Use standard screenplay format with scene headings, action lines, and dialogue"
                    .to_string(),
                "Write natural, witty dialogue with subtext".to_string(),
                "Include visual storytelling and character actions".to_string(),
                "Balance humor with genuine emotion".to_string(),
                "Maintain continuity with previous scenes".to_string(),
                "Advance both plot and character relationships".to_string(),
            ],
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the continuity window
    #[must_use]
    pub fn with_continuity_window(mut self, chars: usize) -> Self {
        self.continuity_window = chars;
        self
    }

    /// Set the excerpt length
    #[must_use]
    pub fn with_excerpt_len(mut self, chars: usize) -> Self {
        self.excerpt_len = chars;
        self
    }

    /// Set the retrieval mode
    #[must_use]
    pub fn with_query_mode(mut self, mode: impl Into<String>) -> Self {
        self.query_mode = mode.into();
        self
    }

    /// Set the fan-out strategy
    #[must_use]
    pub fn with_fanout(mut self, mode: FanoutMode) -> Self {
        self.fanout = mode;
        self
    }

    /// Set the concurrency bound
    #[must_use]
    pub fn with_max_concurrent_queries(mut self, limit: usize) -> Self {
        self.max_concurrent_queries = limit;
        self
    }

    /// Set the pause between sequential queries
    #[must_use]
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the pause between scenes
    #[must_use]
    pub fn with_scene_pause(mut self, pause: Duration) -> Self {
        self.scene_pause_ms = pause.as_millis() as u64;
        self
    }

    /// Set the per-attempt query timeout
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the generation timeout
    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the query retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the completion model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Pause between sequential queries
    #[must_use]
    pub fn query_delay(&self) -> Duration {
        Duration::from_millis(self.query_delay_ms)
    }

    /// Pause between scenes
    #[must_use]
    pub fn scene_pause(&self) -> Duration {
        Duration::from_millis(self.scene_pause_ms)
    }

    /// Per-attempt query timeout
    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Generation timeout
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, message: &str| Error::InvalidConfig {
            field: format!("pipeline.{field}"),
            message: message.to_string(),
        };

        if self.excerpt_len == 0 {
            return Err(invalid("excerpt_len", "must be greater than zero"));
        }
        if self.query_mode.trim().is_empty() {
            return Err(invalid("query_mode", "must not be empty"));
        }
        if self.max_concurrent_queries == 0 {
            return Err(invalid("max_concurrent_queries", "must be at least 1"));
        }
        if self.query_timeout_ms == 0 {
            return Err(invalid("query_timeout_ms", "must be greater than zero"));
        }
        if self.generation_timeout_ms == 0 {
            return Err(invalid("generation_timeout_ms", "must be greater than zero"));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid("temperature", "must be between 0.0 and 2.0"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.continuity_window, 400);
        assert_eq!(config.excerpt_len, 250);
        assert_eq!(config.query_mode, "hybrid");
        assert_eq!(config.fanout, FanoutMode::Concurrent);
        assert_eq!(config.query_delay(), Duration::from_millis(300));
        assert_eq!(config.scene_pause(), Duration::from_secs(1));
        assert_eq!(config.requirements.len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            fanout = "sequential"
            continuity_window = 200

            [retry]
            max_attempts = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.fanout, FanoutMode::Sequential);
        assert_eq!(config.continuity_window, 200);
        assert_eq!(config.excerpt_len, 250);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_validation() {
        let err = PipelineConfig::new()
            .with_max_concurrent_queries(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("pipeline.max_concurrent_queries"));

        assert!(PipelineConfig::new().with_excerpt_len(0).validate().is_err());
        assert!(PipelineConfig::new().with_query_mode(" ").validate().is_err());

        let mut hot = PipelineConfig::new();
        hot.temperature = Some(3.5);
        assert!(hot.validate().is_err());
    }
}
