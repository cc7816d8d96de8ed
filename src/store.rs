//! Session persistence backends
//!
//! The engine owns the authoritative in-memory state; a store is a mirror it
//! writes through to. Three implementations are provided: a process-local
//! map, a SQLite table, and an atomic file snapshot per scope.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::models::Session;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Keyed lookup/save/delete of sessions by scope identifier.
///
/// Every call is fallible; the engine logs store failures and never lets
/// them block or revert a completed mutation. A corrupt durable snapshot
/// must load as absent, never as an error.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, scope_id: &str) -> StoreResult<Option<Session>>;
    async fn save(&self, session: &Session) -> StoreResult<()>;
    async fn delete(&self, scope_id: &str) -> StoreResult<()>;
}

/// In-process store, for tests and single-process deployments
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, scope_id: &str) -> StoreResult<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(scope_id).cloned())
    }

    async fn save(&self, session: &Session) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.scope_id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, scope_id: &str) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(scope_id);
        Ok(())
    }
}

/// Durable store backed by a SQLite table keyed by scope
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the sessions table if it does not exist yet.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                scope_id TEXT PRIMARY KEY NOT NULL,
                revision INTEGER NOT NULL,
                state TEXT NOT NULL,
                updated_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn load(&self, scope_id: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT scope_id, revision, state, updated_at
            FROM sessions
            WHERE scope_id = ?
            "#,
        )
        .bind(scope_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        // A snapshot that no longer parses is treated as absent, not fatal
        match serde_json::from_str::<Session>(&row.state) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(scope_id, error = %e, "discarding corrupt session row");
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &Session) -> StoreResult<()> {
        let state = serde_json::to_string(session)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sessions (scope_id, revision, state, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(scope_id) DO UPDATE SET
                revision = excluded.revision,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.scope_id)
        .bind(session.revision as i64)
        .bind(&state)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, scope_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE scope_id = ?")
            .bind(scope_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    #[allow(dead_code)]
    scope_id: String,
    #[allow(dead_code)]
    revision: i64,
    state: String,
    #[allow(dead_code)]
    updated_at: chrono::DateTime<Utc>,
}

/// Durable store writing one JSON snapshot file per scope.
///
/// Saves go to a temporary file in the same directory, are fsynced, then
/// atomically renamed over the previous snapshot, so a crash mid-write
/// never leaves a corrupt file behind.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn snapshot_path(&self, scope_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", scope_id))
    }

    fn temp_path(&self, scope_id: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", scope_id))
    }
}

#[async_trait]
impl SessionStore for SnapshotStore {
    async fn load(&self, scope_id: &str) -> StoreResult<Option<Session>> {
        let path = self.snapshot_path(scope_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<Session>(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(scope_id, error = %e, "discarding corrupt session snapshot");
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &Session) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let state = serde_json::to_string(session)?;
        let tmp = self.temp_path(&session.scope_id);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(state.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, self.snapshot_path(&session.scope_id)).await?;

        Ok(())
    }

    async fn delete(&self, scope_id: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.snapshot_path(scope_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
