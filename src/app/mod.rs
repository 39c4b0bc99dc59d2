//! Application wiring for the Storyloom CLI
//!
//! - `config`: configuration structures
//! - `loader`: configuration loading from files and environment
//! - `validation`: checks run before a session is opened
//! - `init`: store, client and pipeline construction

pub mod config;
mod init;
mod loader;
mod validation;

pub use config::AppConfig;
pub use init::{build_pipeline, load_templates, open_store};
pub use loader::load_config;
pub use validation::{validate_brainstorm_config, validate_run_config};
