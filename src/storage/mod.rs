//! Storage layer for Tengen
//!
//! Provides the session store used by the chat client and the sqlite-vec
//! index behind document Q&A.

pub mod memory;
pub mod sessions;
pub mod vectors;

pub use memory::MemorySessionStore;
pub use sessions::SqliteSessionStore;
pub use vectors::{IndexedChunk, ScoredChunk, SqliteVectorIndex};

use crate::error::{Result, TengenError};
use crate::types::{ChatSession, SessionId, SessionSummary};
use async_trait::async_trait;
use deadpool_sqlite::{Config, Pool, PoolConfig, Runtime};
use std::path::Path;
use std::sync::Once;
use tracing::info;

/// Persistent chat history
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session with all of its messages
    async fn get(&self, id: SessionId) -> Result<Option<ChatSession>>;

    /// Insert or replace a session, evicting the oldest beyond capacity
    async fn put(&self, session: &ChatSession) -> Result<()>;

    /// Remove a session; unknown ids are not an error
    async fn delete(&self, id: SessionId) -> Result<()>;

    /// Summaries, newest first
    async fn list(&self) -> Result<Vec<SessionSummary>>;
}

static VEC_EXTENSION: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards
pub(crate) fn load_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        use rusqlite::ffi::sqlite3_auto_extension;

        #[allow(clippy::missing_transmute_annotations)]
        sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// Open a connection pool on a database file, creating parent directories
pub(crate) fn open_pool<P: AsRef<Path>>(db_path: P, pool_size: usize) -> Result<Pool> {
    let path = db_path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let path_str = path.to_string_lossy().to_string();
    info!("Opening SQLite pool at: {} (pool_size: {})", path_str, pool_size);

    let mut config = Config::new(path_str);
    config.pool = Some(PoolConfig::new(pool_size));
    config
        .create_pool(Runtime::Tokio1)
        .map_err(|e| TengenError::Database(format!("Failed to create connection pool: {}", e)))
}

/// Run a closure on a pooled connection
pub(crate) async fn with_conn<T, F>(pool: &Pool, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
{
    let conn = pool
        .get()
        .await
        .map_err(|e| TengenError::Database(format!("Failed to get connection from pool: {}", e)))?;

    conn.interact(f)
        .await
        .map_err(|e| TengenError::Database(format!("Pool interaction failed: {}", e)))?
}

pub(crate) fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> TengenError + '_ {
    move |e| TengenError::Database(format!("{}: {}", context, e))
}
