//! Viewer - Session query and replay API
//!
//! This module turns raw step logs into human-readable timelines, per-scene
//! outcomes and session summaries.

mod stats;
mod timeline;
mod types;

pub use types::{SceneOutcome, SessionStats, SessionSummary};

#[cfg(test)]
mod tests;

use crate::error::Result;
use crate::event::{SessionId, Step, StepKind, TimelineEntry};
use crate::store::PipelineStore;
use std::sync::Arc;
use tracing::instrument;

/// Viewer for querying and displaying session history
#[derive(Clone)]
pub struct SessionViewer {
    store: Arc<dyn PipelineStore>,
}

impl SessionViewer {
    /// Create a new session viewer
    #[must_use]
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self { store }
    }

    /// Summary of a session: status, counters, step counts and scene outcomes
    #[instrument(skip(self))]
    pub async fn summary(&self, session_id: &SessionId) -> Result<SessionSummary> {
        let session = self.store.get_session(session_id).await?;
        let steps = self.store.get_steps(session_id).await?;
        Ok(stats::build_summary(session, &steps))
    }

    /// Get a simplified timeline for a session
    #[instrument(skip(self))]
    pub async fn timeline(&self, session_id: &SessionId) -> Result<Vec<TimelineEntry>> {
        let steps = self.store.get_steps(session_id).await?;
        Ok(timeline::build_timeline(&steps))
    }

    /// Get session statistics
    #[instrument(skip(self))]
    pub async fn stats(&self, session_id: &SessionId) -> Result<SessionStats> {
        let steps = self.store.get_steps(session_id).await?;
        Ok(stats::calculate_stats(&steps))
    }

    /// Steps of a session, optionally filtered by kind
    #[instrument(skip(self))]
    pub async fn steps(&self, session_id: &SessionId, kind: Option<StepKind>) -> Result<Vec<Step>> {
        match kind {
            Some(kind) => self.store.get_steps_by_kind(session_id, kind).await,
            None => self.store.get_steps(session_id).await,
        }
    }

    /// Summaries of the most recent sessions
    #[instrument(skip(self))]
    pub async fn recent_summaries(&self, limit: i64) -> Result<Vec<SessionSummary>> {
        let sessions = self.store.list_sessions(limit).await?;

        let mut summaries = Vec::with_capacity(sessions.len());
        for session in sessions {
            let steps = self.store.get_steps(&session.id).await?;
            summaries.push(stats::build_summary(session, &steps));
        }
        Ok(summaries)
    }
}
