//! Application configuration types
//!
//! Mirrors `config/default.toml`. The `[pipeline]` table deserializes
//! straight into [`PipelineConfig`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use storyloom_core::PipelineConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
}

/// Story records database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub database: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/project.db"),
        }
    }
}

/// Pipeline store database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Defaults to `~/.storyloom/pipeline.db`
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl StoreConfig {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(storyloom_replay::store::default_db_path)
    }
}

/// Knowledge bucket servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_knowledge_url")]
    pub base_url: String,
    /// Per-source base URLs
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default = "default_knowledge_timeout")]
    pub timeout_secs: u64,
    /// Sources used when `run` is given no `--sources`
    #[serde(default)]
    pub default_sources: Vec<String>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_knowledge_url(),
            endpoints: BTreeMap::new(),
            timeout_secs: default_knowledge_timeout(),
            default_sources: Vec::new(),
        }
    }
}

impl KnowledgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_knowledge_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_knowledge_timeout() -> u64 {
    120
}

/// Completion provider settings
///
/// The API key is read from `OPENAI_API_KEY` unless set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Template overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl AppConfig {
    /// Pipeline settings with the `[completion]` overrides applied
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut pipeline = self.pipeline.clone();
        if let Some(model) = &self.completion.model {
            pipeline = pipeline.with_model(model);
        }
        if self.completion.max_tokens.is_some() {
            pipeline.max_tokens = self.completion.max_tokens;
        }
        if self.completion.temperature.is_some() {
            pipeline.temperature = self.completion.temperature;
        }
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::loader::DEFAULT_CONFIG;
    use storyloom_core::FanoutMode;

    #[test]
    fn test_embedded_defaults_parse() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.pipeline.continuity_window, 400);
        assert_eq!(config.pipeline.excerpt_len, 250);
        assert_eq!(config.pipeline.fanout, FanoutMode::Concurrent);
        assert_eq!(config.pipeline.retry.max_attempts, 2);
        assert_eq!(config.knowledge.default_sources.len(), 3);
        assert!(config.templates.file.is_none());
        assert!(config.store.database_path().ends_with("pipeline.db"));
        assert!(!config.pipeline.requirements.is_empty());
    }

    #[test]
    fn test_completion_overrides_pipeline() {
        let mut config = AppConfig::default();
        config.completion.model = Some("gpt-4o".to_string());
        config.completion.temperature = Some(0.2);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.model.as_deref(), Some("gpt-4o"));
        assert_eq!(pipeline.temperature, Some(0.2));
        assert!(pipeline.validate().is_ok());
    }
}
