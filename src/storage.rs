//! SQLite persistence for the vector index.
//!
//! The database file is the sole durable state; the in-memory index is a
//! cache of it. A save rewrites meta and entries inside one transaction, so
//! a failed save leaves the previous index intact on disk. A load
//! distinguishes "missing" (build fresh) from "corrupt" (surface to the
//! user, never discard silently), and rejects an index whose declared
//! dimension or model disagrees with the configured embedder.

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::chunker::Chunk;
use crate::errors::RetrievalError;
use crate::index::{DistanceMetric, IndexEntry, VectorIndex};

#[derive(Debug)]
pub struct IndexStorage {
    db_path: PathBuf,
}

impl IndexStorage {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        IndexStorage {
            db_path: db_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Persist the full index (meta + ordered entries) atomically.
    pub async fn save(
        &self,
        index: &VectorIndex,
        embedding_model: &str,
    ) -> Result<(), RetrievalError> {
        let pool = self.connect(true).await.map_err(RetrievalError::storage)?;
        let result = self.save_inner(&pool, index, embedding_model).await;
        pool.close().await;
        result
    }

    async fn save_inner(
        &self,
        pool: &SqlitePool,
        index: &VectorIndex,
        embedding_model: &str,
    ) -> Result<(), RetrievalError> {
        init_schema(pool).await?;

        let mut tx = pool.begin().await.map_err(RetrievalError::storage)?;

        sqlx::query("DELETE FROM index_entries")
            .execute(&mut *tx)
            .await
            .map_err(RetrievalError::storage)?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *tx)
            .await
            .map_err(RetrievalError::storage)?;

        for (key, value) in [
            ("dimension", index.dimension().to_string()),
            ("metric", index.metric().as_str().to_string()),
            ("embedding_model", embedding_model.to_string()),
        ] {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(RetrievalError::storage)?;
        }

        for (position, entry) in index.entries().iter().enumerate() {
            sqlx::query(
                "INSERT INTO index_entries (position, text, source, page, chunk_index, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(position as i64)
            .bind(&entry.chunk.text)
            .bind(&entry.chunk.source)
            .bind(entry.chunk.page as i64)
            .bind(entry.chunk.chunk_index as i64)
            .bind(serialize_embedding(&entry.vector))
            .execute(&mut *tx)
            .await
            .map_err(RetrievalError::storage)?;
        }

        tx.commit().await.map_err(RetrievalError::storage)?;

        tracing::info!(
            entries = index.len(),
            path = %self.db_path.display(),
            "persisted vector index"
        );
        Ok(())
    }

    /// Reconstitute the index from disk.
    ///
    /// A missing file fails with `IndexMissing`; an unreadable file, bad
    /// meta, or truncated vector data fails with `IndexCorrupt`; a declared
    /// dimension or model that disagrees with the configured embedder is
    /// rejected rather than truncated or padded.
    pub async fn load(
        &self,
        expected_dimension: usize,
        expected_model: &str,
    ) -> Result<VectorIndex, RetrievalError> {
        if !self.db_path.exists() {
            return Err(RetrievalError::IndexMissing(self.db_path.clone()));
        }

        let pool = self.connect(false).await.map_err(RetrievalError::corrupt)?;
        let result = self
            .load_inner(&pool, expected_dimension, expected_model)
            .await;
        pool.close().await;
        result
    }

    async fn load_inner(
        &self,
        pool: &SqlitePool,
        expected_dimension: usize,
        expected_model: &str,
    ) -> Result<VectorIndex, RetrievalError> {
        let dimension: usize = read_meta(pool, "dimension")
            .await?
            .parse()
            .map_err(|_| RetrievalError::IndexCorrupt("non-numeric dimension".to_string()))?;
        let metric_raw = read_meta(pool, "metric").await?;
        let metric = DistanceMetric::parse(&metric_raw).ok_or_else(|| {
            RetrievalError::IndexCorrupt(format!("unknown metric '{metric_raw}'"))
        })?;
        let model = read_meta(pool, "embedding_model").await?;

        if dimension != expected_dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: expected_dimension,
                actual: dimension,
            });
        }
        if model != expected_model {
            return Err(RetrievalError::InvalidConfig(format!(
                "index was built with embedding model '{model}' but '{expected_model}' is configured; re-ingest to switch models"
            )));
        }

        let rows = sqlx::query(
            "SELECT text, source, page, chunk_index, embedding
             FROM index_entries
             ORDER BY position",
        )
        .fetch_all(pool)
        .await
        .map_err(RetrievalError::corrupt)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = deserialize_embedding(&blob).ok_or_else(|| {
                RetrievalError::IndexCorrupt("truncated embedding blob".to_string())
            })?;
            if vector.len() != dimension {
                return Err(RetrievalError::IndexCorrupt(format!(
                    "entry vector has {} values, meta declares {}",
                    vector.len(),
                    dimension
                )));
            }

            let page: i64 = row.get("page");
            let chunk_index: i64 = row.get("chunk_index");
            entries.push(IndexEntry {
                vector,
                chunk: Chunk {
                    text: row.get("text"),
                    source: row.get("source"),
                    page: page as u32,
                    chunk_index: chunk_index as usize,
                },
            });
        }

        tracing::info!(
            entries = entries.len(),
            path = %self.db_path.display(),
            "loaded vector index"
        );
        VectorIndex::build(dimension, metric, entries)
    }

    async fn connect(&self, create: bool) -> Result<SqlitePool, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<(), RetrievalError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(RetrievalError::storage)?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS index_entries (
            position INTEGER PRIMARY KEY,
            text TEXT NOT NULL,
            source TEXT NOT NULL,
            page INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            embedding BLOB NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(RetrievalError::storage)?;

    Ok(())
}

async fn read_meta(pool: &SqlitePool, key: &str) -> Result<String, RetrievalError> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(RetrievalError::corrupt)?;

    value.ok_or_else(|| RetrievalError::IndexCorrupt(format!("missing meta key '{key}'")))
}

fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}
