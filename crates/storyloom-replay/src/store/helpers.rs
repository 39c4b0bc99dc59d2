//! Helper functions for store module

use crate::error::Error;
use crate::event::{
    GeneratedOutput, SceneRef, Session, SessionId, SessionStatus, SourceResult, Step, StepKind,
};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// Fixed-width RFC3339 so stored timestamps sort lexically
pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("invalid timestamp: {e}")))
}

fn parse_json(value: &str) -> Result<serde_json::Value, Error> {
    serde_json::from_str(value).map_err(|e| Error::Serialization(format!("invalid json: {e}")))
}

fn to_u32(value: i64, column: &str) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| Error::Serialization(format!("{column} out of range: {value}")))
}

fn to_u64(value: i64, column: &str) -> Result<u64, Error> {
    u64::try_from(value).map_err(|_| Error::Serialization(format!("{column} out of range: {value}")))
}

fn row_to_scene(row: &SqliteRow) -> Result<SceneRef, Error> {
    Ok(SceneRef {
        act: to_u32(row.get("act"), "act")?,
        sequence: to_u32(row.get("sequence"), "sequence")?,
    })
}

/// Convert a SQLite row to a Session
pub(crate) fn row_to_session(row: SqliteRow) -> Result<Session, Error> {
    let status_str: String = row.get("status");
    let sources_str: String = row.get("sources");
    let started_at_str: String = row.get("started_at");
    let ended_at_str: Option<String> = row.get("ended_at");

    let status: SessionStatus = status_str
        .parse()
        .map_err(|e: String| Error::Serialization(e))?;
    let sources: Vec<String> = serde_json::from_str(&sources_str)
        .map_err(|e| Error::Serialization(format!("invalid sources: {e}")))?;
    let ended_at = ended_at_str.as_deref().map(parse_timestamp).transpose()?;

    Ok(Session {
        id: SessionId::from(row.get::<String, _>("id")),
        sources,
        guidance: row.get("guidance"),
        status,
        started_at: parse_timestamp(&started_at_str)?,
        ended_at,
        scenes_processed: to_u32(row.get("scenes_processed"), "scenes_processed")?,
        scenes_succeeded: to_u32(row.get("scenes_succeeded"), "scenes_succeeded")?,
        total_words: to_u64(row.get("total_words"), "total_words")?,
        total_chars: to_u64(row.get("total_chars"), "total_chars")?,
        error: row.get("error"),
    })
}

/// Convert a SQLite row to a Step
pub(crate) fn row_to_step(row: SqliteRow) -> Result<Step, Error> {
    let id_str: String = row.get("id");
    let kind_str: String = row.get("kind");
    let act: Option<i64> = row.get("act");
    let sequence_in_act: Option<i64> = row.get("scene_sequence");
    let timestamp_str: String = row.get("timestamp");
    let payload_str: String = row.get("payload");
    let metadata_str: String = row.get("metadata");

    let id =
        Uuid::parse_str(&id_str).map_err(|e| Error::Serialization(format!("invalid uuid: {e}")))?;
    let kind: StepKind = kind_str
        .parse()
        .map_err(|e: String| Error::Serialization(e))?;
    let scene = match (act, sequence_in_act) {
        (Some(act), Some(sequence)) => Some(SceneRef {
            act: to_u32(act, "act")?,
            sequence: to_u32(sequence, "scene_sequence")?,
        }),
        _ => None,
    };

    Ok(Step {
        id,
        session_id: SessionId::from(row.get::<String, _>("session_id")),
        sequence: row.get("sequence"),
        kind,
        scene,
        timestamp: parse_timestamp(&timestamp_str)?,
        payload: parse_json(&payload_str)?,
        metadata: parse_json(&metadata_str)?,
    })
}

/// Convert a SQLite row to a SourceResult
pub(crate) fn row_to_source_result(row: SqliteRow) -> Result<SourceResult, Error> {
    let recorded_at_str: String = row.get("recorded_at");
    let success: i64 = row.get("success");

    Ok(SourceResult {
        session_id: SessionId::from(row.get::<String, _>("session_id")),
        scene: row_to_scene(&row)?,
        source: row.get("source"),
        prompt: row.get("prompt"),
        response: row.get("response"),
        success: success != 0,
        duration_ms: to_u64(row.get("duration_ms"), "duration_ms")?,
        recorded_at: parse_timestamp(&recorded_at_str)?,
    })
}

/// Convert a SQLite row to a GeneratedOutput
pub(crate) fn row_to_output(row: SqliteRow) -> Result<GeneratedOutput, Error> {
    let persisted_at_str: String = row.get("persisted_at");

    Ok(GeneratedOutput {
        session_id: SessionId::from(row.get::<String, _>("session_id")),
        scene: row_to_scene(&row)?,
        text: row.get("text"),
        word_count: to_u64(row.get("word_count"), "word_count")?,
        char_count: to_u64(row.get("char_count"), "char_count")?,
        persisted_at: parse_timestamp(&persisted_at_str)?,
    })
}

/// Get the default data directory for Storyloom
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".storyloom"))
        .unwrap_or_else(|| std::path::PathBuf::from(".storyloom"))
}

/// Get the default pipeline database path
pub fn default_db_path() -> std::path::PathBuf {
    default_data_dir().join("pipeline.db")
}
