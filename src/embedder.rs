//! Embedding boundary.
//!
//! Maps passage or query strings to fixed-dimension dense vectors. The
//! trait is the capability interface the rest of the core programs against;
//! `HttpEmbedder` talks to a llama.cpp-style embedding server. Implementations
//! must preserve input order and must not retry internally: a transient
//! failure surfaces as `EmbeddingService` and the caller decides whether to
//! resubmit the batch.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::RetrievalConfig;
use crate::errors::RetrievalError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each input, one vector per string, same order.
    ///
    /// Pure given the model identifier: the same text always maps to the
    /// same vector, which makes caller-side parallel batching safe.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError>;

    /// Dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Identifier of the underlying model.
    fn model(&self) -> &str;
}

/// Embedder backed by an HTTP embedding endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.embed_timeout_secs))
            .build()
            .map_err(|e| RetrievalError::EmbeddingService(e.to_string()))?;

        Ok(HttpEmbedder {
            client,
            endpoint: format!("{}/embedding", config.embedding_endpoint.trim_end_matches('/')),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut results = Vec::with_capacity(inputs.len());

        for input in inputs {
            let body = json!({
                "content": input,
                "model": self.model,
            });

            let res = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|e| RetrievalError::EmbeddingService(e.to_string()))?;

            if !res.status().is_success() {
                return Err(RetrievalError::EmbeddingService(format!(
                    "embedding server returned {}",
                    res.status()
                )));
            }

            let data: Value = res
                .json()
                .await
                .map_err(|e| RetrievalError::EmbeddingService(e.to_string()))?;
            let vector: Vec<f32> = serde_json::from_value(data["embedding"].clone())
                .map_err(|_| {
                    RetrievalError::EmbeddingService("invalid embedding response".to_string())
                })?;

            // A response of the wrong width means the server is running a
            // different model than configured.
            if vector.len() != self.dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }

            results.push(vector);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}
