//! Configuration loading
//!
//! Embedded defaults, then optional files, then the environment.

use super::config::AppConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Load configuration, optionally layering an explicit file over the
/// `config/` directory files.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let env_name = std::env::var("STORYLOOM_ENV").unwrap_or_else(|_| "development".to_string());

    let mut builder = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. External overrides (optional)
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{env_name}")).required(false))
        .add_source(File::with_name("config/local").required(false));

    if let Some(path) = explicit {
        builder = builder.add_source(File::from(path).required(true));
    }

    // 3. Environment variables (highest priority)
    // STORYLOOM_PIPELINE__QUERY_MODE=local -> pipeline.query_mode
    let config = builder
        .add_source(
            Environment::with_prefix("STORYLOOM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}
