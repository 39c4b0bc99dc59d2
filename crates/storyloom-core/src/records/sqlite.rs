//! SqliteRecordStore - project records from a SQLite project database
//!
//! Reads the `characters` and `story_outline` tables of a project database.
//! The schema belongs to the record editor; nothing here writes to it.

use super::traits::RecordStore;
use super::types::{CharacterSummary, SceneOutline};
use crate::error::{Error, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use storyloom_replay::SceneRef;
use tracing::{debug, info, instrument};

/// Record store over a project's SQLite database
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Wrap an existing pool
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a project database read-only
    pub async fn from_path(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(Error::Records(format!(
                "project database not found: {}",
                db_path.display()
            )));
        }

        let db_url = format!("sqlite:{}?mode=ro", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(&db_url)
            .await
            .map_err(|e| Error::Records(e.to_string()))?;

        info!("Opened project records at {}", db_path.display());
        Ok(Self { pool })
    }

    /// Get the underlying pool
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn scene_from_row(row: &SqliteRow) -> Result<SceneRef> {
    let act: i64 = row.try_get("act").map_err(records_err)?;
    let scene: i64 = row.try_get("scene").map_err(records_err)?;
    let act = u32::try_from(act).map_err(|_| Error::Records(format!("invalid act: {act}")))?;
    let scene =
        u32::try_from(scene).map_err(|_| Error::Records(format!("invalid scene: {scene}")))?;
    Ok(SceneRef::new(act, scene))
}

fn records_err(e: sqlx::Error) -> Error {
    Error::Records(e.to_string())
}

fn optional_text(row: &SqliteRow, column: &str) -> Result<Option<String>> {
    let value: Option<String> = row.try_get(column).map_err(records_err)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    #[instrument(skip(self), fields(scene = %scene))]
    async fn scene_outline(&self, scene: SceneRef) -> Result<Option<SceneOutline>> {
        let row = sqlx::query(
            r#"
            SELECT act, scene, key_characters, key_events
            FROM story_outline
            WHERE act = ?1 AND scene = ?2
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(i64::from(scene.act))
        .bind(i64::from(scene.sequence))
        .fetch_optional(&self.pool)
        .await
        .map_err(records_err)?;

        let Some(row) = row else {
            debug!("No outline for scene {}", scene);
            return Ok(None);
        };

        Ok(Some(SceneOutline {
            scene: scene_from_row(&row)?,
            characters: optional_text(&row, "key_characters")?.unwrap_or_default(),
            required_events: optional_text(&row, "key_events")?.unwrap_or_default(),
        }))
    }

    #[instrument(skip(self))]
    async fn characters(&self) -> Result<Vec<CharacterSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT name, gender, CAST(age AS TEXT) AS age, romantic_challenge,
                   lovable_trait, comedic_flaw
            FROM characters
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(records_err)?;

        rows.iter()
            .map(|row| {
                Ok(CharacterSummary {
                    name: row.try_get("name").map_err(records_err)?,
                    gender: optional_text(row, "gender")?,
                    age: optional_text(row, "age")?,
                    challenge: optional_text(row, "romantic_challenge")?,
                    lovable_trait: optional_text(row, "lovable_trait")?,
                    flaw: optional_text(row, "comedic_flaw")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn scenes(&self) -> Result<Vec<SceneRef>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT act, scene
            FROM story_outline
            ORDER BY act, scene
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(records_err)?;

        rows.iter().map(scene_from_row).collect()
    }
}
