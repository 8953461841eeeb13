//! Retrieval configuration.
//!
//! Loaded from a YAML file (path overridable via `CASEBOOK_CONFIG`) and
//! validated eagerly, so a bad value fails at startup rather than on the
//! first query. The relevance threshold and oversample factor carry no
//! defaults: the right values depend on the embedding model and metric, so
//! callers must choose them.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::RetrievalError;
use crate::index::DistanceMetric;

const DEFAULT_CONFIG_FILE: &str = "casebook.yml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Identifier of the embedding model (e.g. "all-MiniLM-L6-v2").
    pub embedding_model: String,
    /// Vector dimension produced by the embedding model.
    pub embedding_dimension: usize,
    /// Base URL of the embedding service.
    pub embedding_endpoint: String,
    /// Maximum chunk size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Distance metric for the vector index.
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Maximum distance a match may have and still count as relevant.
    pub relevance_threshold: f32,
    /// Number of results a query returns.
    pub top_k: usize,
    /// Maximum surviving chunks per source document.
    pub max_per_source: usize,
    /// Search fetches `top_k * oversample` candidates before filtering.
    pub oversample: usize,
    /// Embedding request timeout in seconds.
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_embed_timeout_secs() -> u64 {
    30
}

impl RetrievalConfig {
    /// Load and validate the configuration from the default location.
    pub fn load() -> Result<Self, RetrievalError> {
        Self::from_yaml_file(&config_path())
    }

    /// Load and validate the configuration from a specific YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, RetrievalError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: RetrievalConfig = serde_yaml::from_str(&raw)
            .map_err(|e| RetrievalError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every field. Called by the loaders and by `KnowledgeBase::open`.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.embedding_model.trim().is_empty() {
            return Err(invalid("embedding_model cannot be empty"));
        }
        if self.embedding_dimension == 0 {
            return Err(invalid("embedding_dimension must be at least 1"));
        }
        if self.embedding_endpoint.trim().is_empty() {
            return Err(invalid("embedding_endpoint cannot be empty"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size must be at least 1"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid("chunk_overlap must be smaller than chunk_size"));
        }
        if !self.relevance_threshold.is_finite() || self.relevance_threshold <= 0.0 {
            return Err(invalid("relevance_threshold must be a positive number"));
        }
        if self.top_k == 0 {
            return Err(invalid("top_k must be at least 1"));
        }
        if self.max_per_source == 0 {
            return Err(invalid("max_per_source must be at least 1"));
        }
        if self.oversample == 0 {
            return Err(invalid("oversample must be at least 1"));
        }
        if self.embed_timeout_secs == 0 {
            return Err(invalid("embed_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> RetrievalError {
    RetrievalError::InvalidConfig(msg.to_string())
}

fn config_path() -> PathBuf {
    if let Ok(path) = env::var("CASEBOOK_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> RetrievalConfig {
        RetrievalConfig {
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dimension: 384,
            embedding_endpoint: "http://localhost:8080".to_string(),
            chunk_size: 500,
            chunk_overlap: 50,
            metric: DistanceMetric::L2,
            relevance_threshold: 0.7,
            top_k: 4,
            max_per_source: 2,
            oversample: 3,
            embed_timeout_secs: 30,
        }
    }

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let mut config = valid_config();
        config.chunk_overlap = 500;
        assert!(matches!(
            config.validate(),
            Err(RetrievalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn threshold_must_be_positive_and_finite() {
        let mut config = valid_config();
        config.relevance_threshold = 0.0;
        assert!(config.validate().is_err());
        config.relevance_threshold = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_counts_are_rejected() {
        for field in ["top_k", "max_per_source", "oversample", "chunk_size"] {
            let mut config = valid_config();
            match field {
                "top_k" => config.top_k = 0,
                "max_per_source" => config.max_per_source = 0,
                "oversample" => config.oversample = 0,
                _ => config.chunk_size = 0,
            }
            assert!(config.validate().is_err(), "{field} = 0 should be rejected");
        }
    }

    #[test]
    fn yaml_load_fills_defaults() {
        let yaml = r#"
embedding_model: all-MiniLM-L6-v2
embedding_dimension: 384
embedding_endpoint: http://localhost:8080
relevance_threshold: 0.7
top_k: 4
max_per_source: 2
oversample: 3
"#;
        let config: RetrievalConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.metric, DistanceMetric::L2);
    }
}
