//! Component initialization
//!
//! Opens the stores, resolves the service clients and assembles the
//! pipeline from an [`AppConfig`].

use super::config::{AppConfig, CompletionConfig};
use anyhow::{Context, Result};
use std::sync::Arc;
use storyloom_core::{Pipeline, SqliteRecordStore, TemplateRegistry};
use storyloom_llm::{LightRagClient, LightRagConfig, OpenAiConfig, OpenAiProvider};
use storyloom_replay::SqliteStore;
use tracing::{debug, info};

/// Open (or create) the pipeline store
pub async fn open_store(config: &AppConfig) -> Result<Arc<SqliteStore>> {
    let path = config.store.database_path();
    let store = SqliteStore::from_path(&path)
        .await
        .with_context(|| format!("Failed to open pipeline store at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Built-in templates, overlaid with `templates.file` when set
pub fn load_templates(config: &AppConfig) -> Result<TemplateRegistry> {
    match &config.templates.file {
        Some(path) => TemplateRegistry::from_file(path)
            .with_context(|| format!("Failed to load templates from {}", path.display())),
        None => Ok(TemplateRegistry::with_builtins()),
    }
}

/// Knowledge client for the configured bucket servers
pub fn resolve_knowledge(config: &AppConfig) -> Result<Arc<LightRagClient>> {
    let mut lightrag = LightRagConfig::new()
        .with_base_url(&config.knowledge.base_url)
        .with_timeout(config.knowledge.timeout());
    for (source, url) in &config.knowledge.endpoints {
        lightrag = lightrag.with_endpoint(source, url);
    }

    let client = LightRagClient::new(lightrag).context("Failed to create knowledge client")?;
    info!(
        base_url = %config.knowledge.base_url,
        endpoints = config.knowledge.endpoints.len(),
        "Knowledge client ready"
    );
    Ok(Arc::new(client))
}

/// OpenAI settings from `OPENAI_*` variables with `[completion]` layered on top
fn openai_config(config: &CompletionConfig, from_env: Option<OpenAiConfig>) -> OpenAiConfig {
    let mut openai = from_env.unwrap_or_else(|| OpenAiConfig::new(""));
    if let Some(key) = &config.api_key {
        openai.api_key = key.clone();
    }
    if let Some(url) = &config.base_url {
        openai = openai.with_base_url(url);
    }
    if let Some(model) = &config.model {
        openai = openai.with_model(model);
    }
    openai
}

/// Completion provider from `[completion]` and `OPENAI_*` variables
pub fn resolve_completion(config: &AppConfig) -> Result<Arc<OpenAiProvider>> {
    let from_env = match OpenAiConfig::from_env() {
        Ok(openai) => Some(openai),
        Err(e) => {
            debug!(reason = %e, "Using [completion] settings only");
            None
        }
    };
    let openai = openai_config(&config.completion, from_env);

    info!(model = %openai.default_model, "Completion provider ready");
    Ok(Arc::new(OpenAiProvider::new(openai)))
}

/// Assemble a pipeline backed by the configured stores and services
pub async fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let records = SqliteRecordStore::from_path(&config.project.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open project database at {}",
                config.project.database.display()
            )
        })?;
    let store = open_store(config).await?;
    let templates = load_templates(config)?;

    let pipeline = Pipeline::new(
        Arc::new(records),
        store,
        resolve_knowledge(config)?,
        resolve_completion(config)?,
        config.pipeline_config(),
    )
    .context("Invalid pipeline configuration")?
    .with_templates(templates);

    Ok(pipeline)
}
