//! Chunk index backed by sqlite-vec
//!
//! Two tables in one database file:
//! - `document_chunks`: chunk text and its source
//! - `chunk_vectors`: vec0 virtual table keyed by the chunk rowid
//!
//! Embeddings are expected to be unit length, so the L2 distance returned by
//! vec0 converts to cosine similarity as `1 - d²/2`.

use super::{db_err, load_vec_extension, open_pool, with_conn};
use crate::error::{Result, TengenError};
use deadpool_sqlite::Pool;
use std::path::Path;
use tracing::{debug, info};

/// Default connection pool size
const DEFAULT_POOL_SIZE: usize = 8;

/// A chunk ready for indexing
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub source: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// A search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub source: String,
    pub content: String,
    pub similarity: f32,
}

/// Vector index using sqlite-vec with connection pooling
pub struct SqliteVectorIndex {
    pool: Pool,
    dimensions: usize,
}

impl SqliteVectorIndex {
    /// Open (or create) the index at `db_path`
    ///
    /// # Example
    /// ```ignore
    /// let index = SqliteVectorIndex::new("index.db", 768).await?;
    /// ```
    pub async fn new<P: AsRef<Path>>(db_path: P, dimensions: usize) -> Result<Self> {
        load_vec_extension();
        let pool = open_pool(db_path, DEFAULT_POOL_SIZE)?;
        let index = Self { pool, dimensions };
        index.create_tables().await?;
        Ok(index)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn vec_table_sql(&self) -> String {
        format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vectors USING vec0(
                embedding FLOAT[{}]
            )",
            self.dimensions
        )
    }

    async fn create_tables(&self) -> Result<()> {
        info!(
            "Creating chunk tables (dimensions: {})",
            self.dimensions
        );

        let vec_sql = self.vec_table_sql();

        with_conn(&self.pool, move |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS document_chunks (
                    id INTEGER PRIMARY KEY,
                    source TEXT NOT NULL,
                    content TEXT NOT NULL
                )",
            )
            .map_err(db_err("Failed to create document_chunks"))?;
            conn.execute(&vec_sql, [])
                .map_err(db_err("Failed to create vec0 table"))?;
            Ok(())
        })
        .await
    }

    /// Replace the whole index with `chunks` in one transaction
    pub async fn replace_all(&self, chunks: Vec<IndexedChunk>) -> Result<usize> {
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != self.dimensions) {
            return Err(TengenError::Embedding(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                bad.embedding.len()
            )));
        }

        info!("Rebuilding chunk index with {} chunks", chunks.len());

        let vec_sql = self.vec_table_sql();
        let count = with_conn(&self.pool, move |conn| {
            let tx = conn
                .transaction()
                .map_err(db_err("Failed to begin transaction"))?;

            tx.execute("DROP TABLE IF EXISTS chunk_vectors", [])
                .map_err(db_err("Failed to drop vectors"))?;
            tx.execute(&vec_sql, [])
                .map_err(db_err("Failed to create vec0 table"))?;
            tx.execute("DELETE FROM document_chunks", [])
                .map_err(db_err("Failed to clear chunks"))?;

            let mut count = 0;
            {
                let mut insert_chunk = tx
                    .prepare("INSERT INTO document_chunks (id, source, content) VALUES (?, ?, ?)")
                    .map_err(db_err("Failed to prepare chunk insert"))?;
                let mut insert_vector = tx
                    .prepare("INSERT INTO chunk_vectors (rowid, embedding) VALUES (?, vec_f32(?))")
                    .map_err(db_err("Failed to prepare vector insert"))?;

                for (i, chunk) in chunks.iter().enumerate() {
                    let id = (i + 1) as i64;
                    let embedding_json = serde_json::to_string(&chunk.embedding)?;

                    insert_chunk
                        .execute(rusqlite::params![id, chunk.source, chunk.content])
                        .map_err(db_err("Failed to insert chunk"))?;
                    insert_vector
                        .execute(rusqlite::params![id, embedding_json])
                        .map_err(db_err("Failed to insert vector"))?;
                    count += 1;
                }
            }

            tx.commit().map_err(db_err("Failed to commit transaction"))?;
            Ok(count)
        })
        .await?;

        debug!("Chunk index now holds {} chunks", count);
        Ok(count)
    }

    /// K nearest chunks to `query_embedding`, most similar first
    pub async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
        if query_embedding.len() != self.dimensions {
            return Err(TengenError::Embedding(format!(
                "Query embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                query_embedding.len()
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_json = serde_json::to_string(query_embedding)?;

        let results = with_conn(&self.pool, move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT c.source, c.content, v.distance
                     FROM (
                         SELECT rowid, distance
                         FROM chunk_vectors
                         WHERE embedding MATCH vec_f32(?)
                         ORDER BY distance
                         LIMIT ?
                     ) v
                     JOIN document_chunks c ON c.id = v.rowid
                     ORDER BY v.distance",
                )
                .map_err(db_err("Failed to prepare search"))?;

            let rows = stmt
                .query_map(rusqlite::params![query_json, limit as i64], |row| {
                    let distance: f64 = row.get(2)?;
                    Ok(ScoredChunk {
                        source: row.get(0)?,
                        content: row.get(1)?,
                        similarity: (1.0 - distance * distance / 2.0) as f32,
                    })
                })
                .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(db_err("Failed to execute vector search"))?;

            Ok(rows)
        })
        .await?;

        debug!("Vector search returned {} results", results.len());
        Ok(results)
    }

    /// Number of indexed chunks
    pub async fn count(&self) -> Result<usize> {
        with_conn(&self.pool, |conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM document_chunks", [], |row| row.get(0))
                .map_err(db_err("Failed to count chunks"))?;
            Ok(count as usize)
        })
        .await
    }
}
