//! Startup validation
//!
//! Catches configuration mistakes before a session is opened.

use super::config::AppConfig;
use anyhow::{bail, Result};
use tracing::warn;

/// Check the configuration and the requested sources for a writing run
pub fn validate_run_config(config: &AppConfig, sources: &[String]) -> Result<()> {
    validate_brainstorm_config(config, sources)?;

    let has_key =
        config.completion.api_key.is_some() || std::env::var("OPENAI_API_KEY").is_ok();
    if !has_key && config.completion.base_url.is_none() {
        bail!("OPENAI_API_KEY is not set and no completion.api_key is configured");
    }

    Ok(())
}

/// Check the configuration and the requested sources for a brainstorm run.
/// No completion provider is needed.
pub fn validate_brainstorm_config(config: &AppConfig, sources: &[String]) -> Result<()> {
    if sources.is_empty() {
        bail!("no knowledge sources given; pass --sources or set knowledge.default_sources");
    }

    let valid_name =
        |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if let Some(bad) = sources.iter().find(|s| !valid_name(s)) {
        bail!("invalid knowledge source name '{bad}'");
    }

    config.pipeline_config().validate()?;

    for source in config.knowledge.endpoints.keys() {
        if !sources.contains(source) {
            warn!(source = %source, "Endpoint configured for a source that is not active");
        }
    }

    Ok(())
}
