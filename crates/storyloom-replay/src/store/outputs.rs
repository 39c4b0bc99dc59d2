//! Source result and generated output operations for SqliteStore

use super::helpers::{format_timestamp, row_to_output, row_to_source_result};
use super::sqlite_store::SqliteStore;
use crate::error::{Error, Result};
use crate::event::{GeneratedOutput, SceneRef, SessionId, SourceResult};
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Persist a knowledge source result
#[instrument(skip(store, result), fields(session_id = %result.session_id, scene = %result.scene, source = %result.source))]
pub async fn save_source_result(store: &SqliteStore, result: &SourceResult) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO source_results (
            session_id, act, sequence, source, prompt, response,
            success, duration_ms, recorded_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
        )
        "#,
    )
    .bind(result.session_id.as_str())
    .bind(i64::from(result.scene.act))
    .bind(i64::from(result.scene.sequence))
    .bind(&result.source)
    .bind(&result.prompt)
    .bind(&result.response)
    .bind(i64::from(result.success))
    .bind(result.duration_ms as i64)
    .bind(format_timestamp(&result.recorded_at))
    .execute(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    debug!("Saved {} result for scene {}", result.source, result.scene);
    Ok(())
}

/// Source results for one scene of one session
#[instrument(skip(store))]
pub async fn get_source_results(
    store: &SqliteStore,
    session_id: &SessionId,
    scene: SceneRef,
) -> Result<Vec<SourceResult>> {
    let rows = sqlx::query(
        r#"
        SELECT session_id, act, sequence, source, prompt, response,
               success, duration_ms, recorded_at
        FROM source_results
        WHERE session_id = ?1 AND act = ?2 AND sequence = ?3
        ORDER BY id ASC
        "#,
    )
    .bind(session_id.as_str())
    .bind(i64::from(scene.act))
    .bind(i64::from(scene.sequence))
    .fetch_all(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    rows.into_iter().map(row_to_source_result).collect()
}

/// Latest successful response per source for a scene, ignoring one session
#[instrument(skip(store))]
pub async fn prior_insights(
    store: &SqliteStore,
    scene: SceneRef,
    exclude: &SessionId,
) -> Result<BTreeMap<String, String>> {
    let rows = sqlx::query(
        r#"
        SELECT source, response
        FROM source_results
        WHERE act = ?1 AND sequence = ?2 AND success = 1 AND session_id <> ?3
        ORDER BY recorded_at ASC, id ASC
        "#,
    )
    .bind(i64::from(scene.act))
    .bind(i64::from(scene.sequence))
    .bind(exclude.as_str())
    .fetch_all(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    // Later rows overwrite earlier ones, leaving the newest per source
    let mut insights = BTreeMap::new();
    for row in rows {
        insights.insert(row.get::<String, _>("source"), row.get::<String, _>("response"));
    }
    Ok(insights)
}

/// Persist a generated output
#[instrument(skip(store, output), fields(session_id = %output.session_id, scene = %output.scene))]
pub async fn save_output(store: &SqliteStore, output: &GeneratedOutput) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO generated_outputs (
            session_id, act, sequence, text, word_count, char_count, persisted_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7
        )
        "#,
    )
    .bind(output.session_id.as_str())
    .bind(i64::from(output.scene.act))
    .bind(i64::from(output.scene.sequence))
    .bind(&output.text)
    .bind(output.word_count as i64)
    .bind(output.char_count as i64)
    .bind(format_timestamp(&output.persisted_at))
    .execute(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    debug!(
        "Persisted {} words for scene {}",
        output.word_count, output.scene
    );
    Ok(())
}

/// Output with the greatest scene strictly before `scene`
#[instrument(skip(store))]
pub async fn latest_output_before(
    store: &SqliteStore,
    scene: SceneRef,
    session_id: Option<&SessionId>,
) -> Result<Option<GeneratedOutput>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, act, sequence, text, word_count, char_count, persisted_at
        FROM generated_outputs
        WHERE (act < ?1 OR (act = ?1 AND sequence < ?2))
          AND (?3 IS NULL OR session_id = ?3)
        ORDER BY act DESC, sequence DESC, persisted_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(i64::from(scene.act))
    .bind(i64::from(scene.sequence))
    .bind(session_id.map(SessionId::as_str))
    .fetch_optional(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    row.map(row_to_output).transpose()
}

/// Outputs persisted by a session, in scene order
#[instrument(skip(store))]
pub async fn get_session_outputs(
    store: &SqliteStore,
    session_id: &SessionId,
) -> Result<Vec<GeneratedOutput>> {
    let rows = sqlx::query(
        r#"
        SELECT session_id, act, sequence, text, word_count, char_count, persisted_at
        FROM generated_outputs
        WHERE session_id = ?1
        ORDER BY act ASC, sequence ASC, id ASC
        "#,
    )
    .bind(session_id.as_str())
    .fetch_all(store.pool())
    .await
    .map_err(|e| Error::Database(e.to_string()))?;

    rows.into_iter().map(row_to_output).collect()
}
