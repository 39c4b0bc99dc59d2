//! SqliteStore - SQLite-based pipeline storage

use super::helpers::{format_timestamp, row_to_session};
use super::traits::PipelineStore;
use crate::error::{Error, Result};
use crate::event::{GeneratedOutput, SceneRef, Session, SessionId, SourceResult, Step, StepKind};
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Pipeline store persisting sessions, steps and outputs to SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with the given connection pool
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new store from a database path
    ///
    /// This will create the database file if it doesn't exist and run migrations.
    pub async fn from_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Database(format!("failed to create directory: {e}")))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!("SQLite pipeline store initialized at {}", db_path.display());
        Ok(store)
    }

    /// Create a new in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        debug!("In-memory SQLite pipeline store initialized");
        Ok(store)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                sources TEXT NOT NULL DEFAULT '[]',
                guidance TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                started_at TEXT NOT NULL,
                ended_at TEXT,
                scenes_processed INTEGER NOT NULL DEFAULT 0,
                scenes_succeeded INTEGER NOT NULL DEFAULT 0,
                total_words INTEGER NOT NULL DEFAULT 0,
                total_chars INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS steps (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                kind TEXT NOT NULL,
                act INTEGER,
                scene_sequence INTEGER,
                timestamp TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                metadata TEXT NOT NULL DEFAULT '{}',
                UNIQUE (session_id, sequence),
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS source_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                act INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                source TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                success INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                recorded_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS generated_outputs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                act INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                text TEXT NOT NULL,
                word_count INTEGER NOT NULL,
                char_count INTEGER NOT NULL,
                persisted_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_steps_kind ON steps(session_id, kind)",
            "CREATE INDEX IF NOT EXISTS idx_source_results_scene ON source_results(act, sequence, source)",
            "CREATE INDEX IF NOT EXISTS idx_outputs_scene ON generated_outputs(act, sequence)",
            "CREATE INDEX IF NOT EXISTS idx_outputs_session ON generated_outputs(session_id, act, sequence)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }

        debug!("Database migrations completed");
        Ok(())
    }

    /// Get a reference to the underlying connection pool
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Session operations
    // =========================================================================

    /// Create a new session record
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn create_session(&self, session: &Session) -> Result<()> {
        let sources = serde_json::to_string(&session.sources)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, sources, guidance, status, started_at, ended_at,
                scenes_processed, scenes_succeeded, total_words, total_chars,
                error, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12
            )
            "#,
        )
        .bind(session.id.as_str())
        .bind(sources)
        .bind(&session.guidance)
        .bind(session.status.as_str())
        .bind(format_timestamp(&session.started_at))
        .bind(session.ended_at.as_ref().map(format_timestamp))
        .bind(i64::from(session.scenes_processed))
        .bind(i64::from(session.scenes_succeeded))
        .bind(session.total_words as i64)
        .bind(session.total_chars as i64)
        .bind(&session.error)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        debug!("Created session {}", session.id);
        Ok(())
    }

    /// Update the mutable fields of a session
    #[instrument(skip(self, session), fields(session_id = %session.id, status = %session.status))]
    pub async fn update_session(&self, session: &Session) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?2, ended_at = ?3,
                scenes_processed = ?4, scenes_succeeded = ?5,
                total_words = ?6, total_chars = ?7,
                error = ?8, updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(session.id.as_str())
        .bind(session.status.as_str())
        .bind(session.ended_at.as_ref().map(format_timestamp))
        .bind(i64::from(session.scenes_processed))
        .bind(i64::from(session.scenes_succeeded))
        .bind(session.total_words as i64)
        .bind(session.total_chars as i64)
        .bind(&session.error)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::SessionNotFound(session.id.to_string()));
        }

        debug!("Updated session {} status to {}", session.id, session.status);
        Ok(())
    }

    /// Get a session by ID
    #[instrument(skip(self))]
    pub async fn get_session(&self, id: &SessionId) -> Result<Session> {
        let row = sqlx::query(
            r#"
            SELECT id, sources, guidance, status, started_at, ended_at,
                   scenes_processed, scenes_succeeded, total_words, total_chars, error
            FROM sessions
            WHERE id = ?1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?
        .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

        row_to_session(row)
    }

    /// List recent sessions
    #[instrument(skip(self))]
    pub async fn list_sessions(&self, limit: i64) -> Result<Vec<Session>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sources, guidance, status, started_at, ended_at,
                   scenes_processed, scenes_succeeded, total_words, total_chars, error
            FROM sessions
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(row_to_session).collect()
    }
}

#[async_trait::async_trait]
impl PipelineStore for SqliteStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        SqliteStore::create_session(self, session).await
    }

    async fn update_session(&self, session: &Session) -> Result<()> {
        SqliteStore::update_session(self, session).await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session> {
        SqliteStore::get_session(self, id).await
    }

    async fn list_sessions(&self, limit: i64) -> Result<Vec<Session>> {
        SqliteStore::list_sessions(self, limit).await
    }

    async fn append_step(&self, step: &Step) -> Result<()> {
        super::steps::append_step(self, step).await
    }

    async fn get_steps(&self, session_id: &SessionId) -> Result<Vec<Step>> {
        super::steps::get_session_steps(self, session_id).await
    }

    async fn get_steps_by_kind(&self, session_id: &SessionId, kind: StepKind) -> Result<Vec<Step>> {
        super::steps::get_steps_by_kind(self, session_id, kind).await
    }

    async fn next_sequence(&self, session_id: &SessionId) -> Result<i64> {
        super::steps::next_sequence(self, session_id).await
    }

    async fn save_source_result(&self, result: &SourceResult) -> Result<()> {
        super::outputs::save_source_result(self, result).await
    }

    async fn get_source_results(
        &self,
        session_id: &SessionId,
        scene: SceneRef,
    ) -> Result<Vec<SourceResult>> {
        super::outputs::get_source_results(self, session_id, scene).await
    }

    async fn prior_insights(
        &self,
        scene: SceneRef,
        exclude: &SessionId,
    ) -> Result<BTreeMap<String, String>> {
        super::outputs::prior_insights(self, scene, exclude).await
    }

    async fn save_output(&self, output: &GeneratedOutput) -> Result<()> {
        super::outputs::save_output(self, output).await
    }

    async fn latest_output_before(
        &self,
        scene: SceneRef,
        session_id: Option<&SessionId>,
    ) -> Result<Option<GeneratedOutput>> {
        super::outputs::latest_output_before(self, scene, session_id).await
    }

    async fn get_outputs(&self, session_id: &SessionId) -> Result<Vec<GeneratedOutput>> {
        super::outputs::get_session_outputs(self, session_id).await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
