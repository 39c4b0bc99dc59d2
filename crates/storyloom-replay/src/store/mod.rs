//! Store - Session and step persistence using SQLite
//!
//! This module provides the storage layer for sessions, steps, knowledge
//! source results and generated outputs. It uses sqlx for async SQLite access.

mod helpers;
mod outputs;
mod recorder;
mod sqlite_store;
mod steps;
mod traits;


pub use helpers::{default_data_dir, default_db_path};
pub use recorder::{StepObserver, StepRecorder};
pub use sqlite_store::SqliteStore;
pub use traits::PipelineStore;
