use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the retrieval core.
///
/// Nothing is swallowed: the only sanctioned "empty but valid" outcome is a
/// relevance-filtered result with zero survivors, which is `Ok`.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid document '{0}': {1}")]
    InvalidDocument(String, String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("embedding service error: {0}")]
    EmbeddingService(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("index is empty: nothing to search yet")]
    EmptyIndex,
    #[error("no persisted index at {}", .0.display())]
    IndexMissing(PathBuf),
    #[error("persisted index is corrupt: {0}")]
    IndexCorrupt(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl RetrievalError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RetrievalError::Storage(err.to_string())
    }

    pub fn corrupt<E: std::fmt::Display>(err: E) -> Self {
        RetrievalError::IndexCorrupt(err.to_string())
    }
}
