//! Event - Record types for the generation log
//!
//! Sessions, steps, source results and generated outputs form an append-only
//! history of every generation run. Steps carry a gap-free sequence number per
//! session so a run can be replayed in the exact order it happened.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Position of a scene in the narrative, ordered act first, then sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneRef {
    /// Act number
    pub act: u32,
    /// Scene number within the act
    pub sequence: u32,
}

impl SceneRef {
    /// Create a new scene reference
    #[must_use]
    pub fn new(act: u32, sequence: u32) -> Self {
        Self { act, sequence }
    }
}

impl fmt::Display for SceneRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.act, self.sequence)
    }
}

impl FromStr for SceneRef {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (act, sequence) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| format!("invalid scene reference (expected act.scene): {s}"))?;
        let act = act
            .parse()
            .map_err(|_| format!("invalid act number: {act}"))?;
        let sequence = sequence
            .parse()
            .map_err(|_| format!("invalid scene number: {sequence}"))?;
        Ok(Self { act, sequence })
    }
}

/// Session identifier, derived from the start time plus a random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier such as `S_20260114_093012_5f1c2a9b`
    #[must_use]
    pub fn generate() -> Self {
        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("S_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8]))
    }

    /// Borrow the identifier as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, not yet running
    Pending,
    /// Processing scenes
    Running,
    /// Every requested scene was attempted
    Completed,
    /// Halted by a store failure
    Failed,
}

impl SessionStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if the session is terminal (completed or failed)
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown session status: {s}")),
        }
    }
}

/// A generation session: one pass over a set of scenes with fixed sources
/// and guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: SessionId,
    /// Active knowledge sources, ordered and de-duplicated
    pub sources: Vec<String>,
    /// Free-form guidance supplied by the user
    pub guidance: Option<String>,
    /// Current status
    pub status: SessionStatus,
    /// When the session was created
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,
    /// Scenes attempted so far
    pub scenes_processed: u32,
    /// Scenes that produced a persisted output
    pub scenes_succeeded: u32,
    /// Words across all persisted outputs
    pub total_words: u64,
    /// Characters across all persisted outputs
    pub total_chars: u64,
    /// Reason for failure, if the session failed
    pub error: Option<String>,
}

impl Session {
    /// Create a new pending session
    #[must_use]
    pub fn new<I, S>(sources: I, guidance: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for source in sources {
            let source = source.into().trim().to_string();
            if !source.is_empty() && !unique.contains(&source) {
                unique.push(source);
            }
        }

        Self {
            id: SessionId::generate(),
            sources: unique,
            guidance: guidance.filter(|g| !g.trim().is_empty()),
            status: SessionStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            scenes_processed: 0,
            scenes_succeeded: 0,
            total_words: 0,
            total_chars: 0,
            error: None,
        }
    }

    fn transition(&mut self, to: SessionStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, to),
            (SessionStatus::Pending, SessionStatus::Running)
                | (SessionStatus::Running, SessionStatus::Completed)
                | (SessionStatus::Pending, SessionStatus::Failed)
                | (SessionStatus::Running, SessionStatus::Failed)
        );
        if !allowed {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        self.status = to;
        if to.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Mark session as running
    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(SessionStatus::Running)
    }

    /// Mark session as completed
    pub fn mark_completed(&mut self) -> Result<()> {
        self.transition(SessionStatus::Completed)
    }

    /// Mark session as failed
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(SessionStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Whether the session accepts more scenes
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Count an attempted scene
    pub fn record_scene(&mut self, output: Option<&GeneratedOutput>) {
        self.scenes_processed += 1;
        if let Some(output) = output {
            self.scenes_succeeded += 1;
            self.total_words += output.word_count;
            self.total_chars += output.char_count;
        }
    }

    /// Count a brainstormed scene; it succeeds when every source answered
    pub fn record_brainstorm(&mut self, all_answered: bool) {
        self.scenes_processed += 1;
        if all_answered {
            self.scenes_succeeded += 1;
        }
    }
}

/// Kind of step recorded in a session log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Scene context assembled
    Context,
    /// Per-source prompts compiled
    Prompt,
    /// Knowledge query issued
    Query,
    /// Knowledge query answered (or failed)
    Response,
    /// Final content generated (or failed)
    Generation,
    /// Generated content persisted
    Persisted,
}

impl StepKind {
    /// All step kinds, in pipeline order
    pub const ALL: [StepKind; 6] = [
        Self::Context,
        Self::Prompt,
        Self::Query,
        Self::Response,
        Self::Generation,
        Self::Persisted,
    ];

    /// Returns the string representation of the step kind
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Prompt => "prompt",
            Self::Query => "query",
            Self::Response => "response",
            Self::Generation => "generation",
            Self::Persisted => "persisted",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "context" => Ok(Self::Context),
            "prompt" => Ok(Self::Prompt),
            "query" => Ok(Self::Query),
            "response" => Ok(Self::Response),
            "generation" => Ok(Self::Generation),
            "persisted" => Ok(Self::Persisted),
            _ => Err(format!("unknown step kind: {s}")),
        }
    }
}

/// One entry of a session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier
    pub id: Uuid,
    /// Session this step belongs to
    pub session_id: SessionId,
    /// Position within the session, starting at 1 with no gaps
    pub sequence: i64,
    /// Kind of step
    pub kind: StepKind,
    /// Scene the step belongs to
    pub scene: Option<SceneRef>,
    /// When the step was recorded
    pub timestamp: DateTime<Utc>,
    /// Step-specific payload
    pub payload: serde_json::Value,
    /// Additional metadata
    pub metadata: serde_json::Value,
}

impl Step {
    /// Create a new step
    #[must_use]
    pub fn new(session_id: SessionId, sequence: i64, kind: StepKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sequence,
            kind,
            scene: None,
            timestamp: Utc::now(),
            payload: serde_json::json!({}),
            metadata: serde_json::json!({}),
        }
    }

    /// Set the scene
    #[must_use]
    pub fn with_scene(mut self, scene: Option<SceneRef>) -> Self {
        self.scene = scene;
        self
    }

    /// Set the payload
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// `success` flag from metadata; steps without one count as successful
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.metadata
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }
}

/// Outcome of one knowledge-source query for one scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    /// Session the query ran in
    pub session_id: SessionId,
    /// Scene the query was for
    pub scene: SceneRef,
    /// Knowledge source name
    pub source: String,
    /// Prompt sent to the source
    pub prompt: String,
    /// Response text, or the error message when `success` is false
    pub response: String,
    /// Whether the query succeeded
    pub success: bool,
    /// Query duration in milliseconds
    pub duration_ms: u64,
    /// When the result was recorded
    pub recorded_at: DateTime<Utc>,
}

impl SourceResult {
    /// A successful result
    #[must_use]
    pub fn succeeded(
        session_id: SessionId,
        scene: SceneRef,
        source: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            session_id,
            scene,
            source: source.into(),
            prompt: prompt.into(),
            response: response.into(),
            success: true,
            duration_ms,
            recorded_at: Utc::now(),
        }
    }

    /// A failed result carrying the error message
    #[must_use]
    pub fn failed(
        session_id: SessionId,
        scene: SceneRef,
        source: impl Into<String>,
        prompt: impl Into<String>,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: false,
            ..Self::succeeded(session_id, scene, source, prompt, error, duration_ms)
        }
    }
}

/// Final content produced for a scene. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOutput {
    /// Session that produced the output
    pub session_id: SessionId,
    /// Scene the output is for
    pub scene: SceneRef,
    /// Generated text
    pub text: String,
    /// Whitespace-separated word count
    pub word_count: u64,
    /// Character count
    pub char_count: u64,
    /// When the output was persisted
    pub persisted_at: DateTime<Utc>,
}

impl GeneratedOutput {
    /// Create an output, computing word and character counts
    #[must_use]
    pub fn new(session_id: SessionId, scene: SceneRef, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            session_id,
            scene,
            word_count: text.split_whitespace().count() as u64,
            char_count: text.chars().count() as u64,
            text,
            persisted_at: Utc::now(),
        }
    }
}

/// Timeline entry for displaying a session log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Step sequence number
    pub sequence: i64,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Step kind
    pub kind: StepKind,
    /// Scene, if any
    pub scene: Option<SceneRef>,
    /// Human-readable summary
    pub summary: String,
    /// Whether the step succeeded
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_ref_ordering() {
        let mut scenes = vec![
            SceneRef::new(2, 1),
            SceneRef::new(1, 3),
            SceneRef::new(1, 1),
            SceneRef::new(1, 2),
        ];
        scenes.sort();
        assert_eq!(
            scenes,
            vec![
                SceneRef::new(1, 1),
                SceneRef::new(1, 2),
                SceneRef::new(1, 3),
                SceneRef::new(2, 1),
            ]
        );
        assert!(SceneRef::new(1, 10) < SceneRef::new(2, 0));
    }

    #[test]
    fn test_scene_ref_parse() {
        assert_eq!("2.4".parse::<SceneRef>().unwrap(), SceneRef::new(2, 4));
        assert_eq!(SceneRef::new(3, 7).to_string(), "3.7");
        assert!("2".parse::<SceneRef>().is_err());
        assert!("a.b".parse::<SceneRef>().is_err());
    }

    #[test]
    fn test_session_id_format() {
        let id = SessionId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "S");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert_eq!(parts[3].len(), 8);
        assert_ne!(id, SessionId::generate());
    }

    #[test]
    fn test_session_dedups_sources() {
        let session = Session::new(["scripts", "books", " scripts ", ""], None);
        assert_eq!(session.sources, vec!["scripts", "books"]);
        assert_eq!(session.status, SessionStatus::Pending);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = Session::new(["scripts"], Some("keep it light".to_string()));
        assert!(session.mark_completed().is_err());

        session.mark_running().unwrap();
        assert!(session.is_running());
        assert!(session.ended_at.is_none());

        session.mark_completed().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.ended_at.is_some());

        assert!(session.mark_running().is_err());
        assert!(session.mark_failed("late").is_err());
    }

    #[test]
    fn test_session_failure() {
        let mut session = Session::new(["scripts"], None);
        session.mark_running().unwrap();
        session.mark_failed("disk full").unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.error.as_deref(), Some("disk full"));
        assert!(session.status.is_terminal());
    }

    #[test]
    fn test_record_scene_counters() {
        let mut session = Session::new(["scripts"], None);
        let output = GeneratedOutput::new(session.id.clone(), SceneRef::new(1, 1), "one two three");
        session.record_scene(Some(&output));
        session.record_scene(None);

        assert_eq!(session.scenes_processed, 2);
        assert_eq!(session.scenes_succeeded, 1);
        assert_eq!(session.total_words, 3);
        assert_eq!(session.total_chars, 13);
    }

    #[test]
    fn test_record_brainstorm_counters() {
        let mut session = Session::new(["plays"], None);
        session.record_brainstorm(true);
        session.record_brainstorm(false);

        assert_eq!(session.scenes_processed, 2);
        assert_eq!(session.scenes_succeeded, 1);
        assert_eq!(session.total_words, 0);
    }

    #[test]
    fn test_step_kind_roundtrip() {
        for kind in StepKind::ALL {
            let parsed: StepKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
        assert!("llm_request".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_step_success_flag() {
        let step = Step::new(SessionId::from("S_x"), 1, StepKind::Generation);
        assert!(step.succeeded());

        let failed = step.with_metadata(serde_json::json!({"success": false}));
        assert!(!failed.succeeded());
    }

    #[test]
    fn test_generated_output_counts_unicode() {
        let output = GeneratedOutput::new(SessionId::from("S_x"), SceneRef::new(1, 1), "café  olé\n");
        assert_eq!(output.word_count, 2);
        assert_eq!(output.char_count, 10);
    }

    #[test]
    fn test_failed_source_result() {
        let result = SourceResult::failed(
            SessionId::from("S_x"),
            SceneRef::new(1, 1),
            "books",
            "prompt",
            "timeout after 5000ms",
            5000,
        );
        assert!(!result.success);
        assert_eq!(result.response, "timeout after 5000ms");
    }

    #[test]
    fn test_step_kind_serialization() {
        let json = serde_json::to_string(&StepKind::Persisted).unwrap();
        assert_eq!(json, r#""persisted""#);
    }
}
