//! Viewer Types - Summary and statistics types

use crate::event::{SceneRef, Session, StepKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What happened to one scene during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneOutcome {
    /// Scene
    pub scene: SceneRef,
    /// Whether an output was persisted
    pub succeeded: bool,
    /// Words in the persisted output
    pub word_count: Option<u64>,
    /// Knowledge queries that succeeded
    pub sources_succeeded: usize,
    /// Knowledge queries that failed
    pub sources_failed: usize,
    /// Scene-level error (missing outline, generation failure)
    pub error: Option<String>,
}

impl SceneOutcome {
    pub(crate) fn new(scene: SceneRef) -> Self {
        Self {
            scene,
            succeeded: false,
            word_count: None,
            sources_succeeded: 0,
            sources_failed: 0,
            error: None,
        }
    }
}

/// Summary of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// The session record
    pub session: Session,
    /// Number of steps per kind
    pub step_counts: BTreeMap<StepKind, usize>,
    /// Total number of steps
    pub step_count: usize,
    /// Per-scene outcomes in narrative order
    pub scenes: Vec<SceneOutcome>,
    /// Words across persisted outputs
    pub total_words: u64,
    /// Average words per persisted scene
    pub average_words: f64,
    /// Session duration in milliseconds, once finished
    pub duration_ms: Option<u64>,
}

impl SessionSummary {
    /// Scenes that failed
    pub fn failed_scenes(&self) -> impl Iterator<Item = &SceneOutcome> {
        self.scenes.iter().filter(|s| !s.succeeded)
    }
}

/// Statistics for a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Total number of steps
    pub step_count: usize,
    /// Number of knowledge queries issued
    pub query_count: usize,
    /// Number of knowledge queries that failed
    pub failed_query_count: usize,
    /// Number of generation attempts
    pub generation_count: usize,
    /// Number of failed generations
    pub failed_generation_count: usize,
    /// Total knowledge query latency in milliseconds
    pub total_query_duration_ms: u64,
    /// Total generation latency in milliseconds
    pub total_generation_duration_ms: u64,
    /// Time between the first and last step
    pub total_duration_ms: Option<u64>,
}

/// Truncate a string to at most `max_chars` characters, appending `...`
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
