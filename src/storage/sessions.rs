//! SQLite-backed session store
//!
//! Each session is stored as one JSON document keyed by id, with an
//! `updated_at` column (microseconds since epoch) for ordering and eviction.

use super::{db_err, open_pool, with_conn, SessionStore};
use crate::error::Result;
use crate::types::{ChatSession, SessionId, SessionSummary};
use async_trait::async_trait;
use deadpool_sqlite::Pool;
use rusqlite::OptionalExtension;
use std::path::Path;
use tracing::debug;

const POOL_SIZE: usize = 4;

/// Persistent session store
pub struct SqliteSessionStore {
    pool: Pool,
    max_sessions: usize,
}

impl SqliteSessionStore {
    pub async fn new<P: AsRef<Path>>(db_path: P, max_sessions: usize) -> Result<Self> {
        let pool = open_pool(db_path, POOL_SIZE)?;

        with_conn(&pool, |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS chat_sessions (
                    id TEXT PRIMARY KEY,
                    updated_at INTEGER NOT NULL,
                    data TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_chat_sessions_updated
                    ON chat_sessions(updated_at)",
            )
            .map_err(db_err("Failed to create chat_sessions"))
        })
        .await?;

        Ok(Self {
            pool,
            max_sessions: max_sessions.max(1),
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, id: SessionId) -> Result<Option<ChatSession>> {
        let key = id.to_string();
        let data: Option<String> = with_conn(&self.pool, move |conn| {
            conn.query_row(
                "SELECT data FROM chat_sessions WHERE id = ?",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Failed to load session"))
        })
        .await?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, session: &ChatSession) -> Result<()> {
        let key = session.id.to_string();
        let updated_at = session.timestamp.timestamp_micros();
        let data = serde_json::to_string(session)?;
        let max_sessions = self.max_sessions as i64;

        let evicted = with_conn(&self.pool, move |conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            tx.execute(
                "INSERT OR REPLACE INTO chat_sessions (id, updated_at, data) VALUES (?, ?, ?)",
                rusqlite::params![key, updated_at, data],
            )
            .map_err(db_err("Failed to store session"))?;

            let evicted = tx
                .execute(
                    "DELETE FROM chat_sessions WHERE id NOT IN (
                        SELECT id FROM chat_sessions ORDER BY updated_at DESC LIMIT ?
                    )",
                    rusqlite::params![max_sessions],
                )
                .map_err(db_err("Failed to evict sessions"))?;

            tx.commit().map_err(db_err("Failed to commit transaction"))?;
            Ok(evicted)
        })
        .await?;

        if evicted > 0 {
            debug!("Evicted {} old sessions", evicted);
        }
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> Result<()> {
        let key = id.to_string();
        with_conn(&self.pool, move |conn| {
            conn.execute(
                "DELETE FROM chat_sessions WHERE id = ?",
                rusqlite::params![key],
            )
            .map_err(db_err("Failed to delete session"))?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let rows: Vec<String> = with_conn(&self.pool, |conn| {
            let mut stmt = conn
                .prepare("SELECT data FROM chat_sessions ORDER BY updated_at DESC")
                .map_err(db_err("Failed to prepare listing"))?;
            let rows = stmt
                .query_map([], |row| row.get(0))
                .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<String>>>())
                .map_err(db_err("Failed to list sessions"))?;
            Ok(rows)
        })
        .await?;

        rows.iter()
            .map(|json| {
                let session: ChatSession = serde_json::from_str(json)?;
                Ok(session.summary())
            })
            .collect()
    }
}
