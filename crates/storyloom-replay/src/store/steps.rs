//! Step operations for SqliteStore

use super::helpers::{format_timestamp, row_to_step};
use super::sqlite_store::SqliteStore;
use crate::error::{Error, Result};
use crate::event::{SessionId, Step, StepKind};
use sqlx::Row;
use tracing::{debug, instrument};

/// Append a step to the session log
#[instrument(skip(store, step), fields(session_id = %step.session_id, sequence = step.sequence, kind = %step.kind))]
pub async fn append_step(store: &SqliteStore, step: &Step) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO steps (
            id, session_id, sequence, kind, act, scene_sequence,
            timestamp, payload, metadata
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
        )
        "#,
    )
    .bind(step.id.to_string())
    .bind(step.session_id.as_str())
    .bind(step.sequence)
    .bind(step.kind.as_str())
    .bind(step.scene.map(|s| i64::from(s.act)))
    .bind(step.scene.map(|s| i64::from(s.sequence)))
    .bind(format_timestamp(&step.timestamp))
    .bind(step.payload.to_string())
    .bind(step.metadata.to_string())
    .execute(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    debug!(
        "Recorded step {} ({}) for session {}",
        step.sequence, step.kind, step.session_id
    );
    Ok(())
}

/// Get all steps for a session
#[instrument(skip(store))]
pub async fn get_session_steps(store: &SqliteStore, session_id: &SessionId) -> Result<Vec<Step>> {
    let rows = sqlx::query(
        r#"
        SELECT id, session_id, sequence, kind, act, scene_sequence,
               timestamp, payload, metadata
        FROM steps
        WHERE session_id = ?1
        ORDER BY sequence ASC
        "#,
    )
    .bind(session_id.as_str())
    .fetch_all(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    rows.into_iter().map(row_to_step).collect()
}

/// Get steps by kind for a session
#[instrument(skip(store))]
pub async fn get_steps_by_kind(
    store: &SqliteStore,
    session_id: &SessionId,
    kind: StepKind,
) -> Result<Vec<Step>> {
    let rows = sqlx::query(
        r#"
        SELECT id, session_id, sequence, kind, act, scene_sequence,
               timestamp, payload, metadata
        FROM steps
        WHERE session_id = ?1 AND kind = ?2
        ORDER BY sequence ASC
        "#,
    )
    .bind(session_id.as_str())
    .bind(kind.as_str())
    .fetch_all(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    rows.into_iter().map(row_to_step).collect()
}

/// Get the next sequence number for a session
#[instrument(skip(store))]
pub async fn next_sequence(store: &SqliteStore, session_id: &SessionId) -> Result<i64> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(MAX(sequence), 0) + 1 as next_num
        FROM steps
        WHERE session_id = ?1
        "#,
    )
    .bind(session_id.as_str())
    .fetch_one(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    Ok(row.get::<i64, _>("next_num"))
}
