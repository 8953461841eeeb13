//! Query orchestration.
//!
//! One query runs: embed the query, search the index for an oversampled
//! candidate set, apply the relevance filter, truncate to `top_k`. The
//! ranked output (chunks + distances + source metadata) is the sole payload
//! handed to the external answer-synthesis collaborator; this core never
//! writes the answer itself.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::RetrievalConfig;
use crate::embedder::Embedder;
use crate::errors::RetrievalError;
use crate::filter::RelevanceFilter;
use crate::index::{ScoredChunk, VectorIndex};

/// Per-query knobs, usually taken straight from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub top_k: usize,
    pub threshold: f32,
    pub max_per_source: usize,
    /// The index is asked for `top_k * oversample` candidates so the
    /// relevance filter has room to discard without starving the result.
    pub oversample: usize,
}

impl SearchParams {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        SearchParams {
            top_k: config.top_k,
            threshold: config.relevance_threshold,
            max_per_source: config.max_per_source,
            oversample: config.oversample,
        }
    }
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<RwLock<VectorIndex>>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<RwLock<VectorIndex>>) -> Self {
        Retriever { embedder, index }
    }

    /// Retrieve the ranked relevant chunks for a natural-language query.
    ///
    /// An empty result means nothing cleared the threshold; that is `Ok`,
    /// not an error. `EmbeddingService` and `EmptyIndex` failures from the
    /// dependencies propagate unchanged.
    pub async fn retrieve(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let query_vectors = self.embedder.embed(&[query.to_string()]).await?;
        let query_vector = query_vectors.first().ok_or_else(|| {
            RetrievalError::EmbeddingService("embedder returned no vector for query".to_string())
        })?;

        let candidates = params.top_k.saturating_mul(params.oversample).max(1);
        let raw = {
            let index = self.index.read().await;
            index.search(query_vector, candidates)?
        };

        let filter = RelevanceFilter::new(params.threshold, params.max_per_source);
        let mut results = filter.apply(raw);
        results.truncate(params.top_k);

        if results.is_empty() {
            tracing::debug!(query_len = query.len(), "no relevant content found");
        }
        Ok(results)
    }
}

/// Format retrieved passages into a cited excerpt block for answer
/// synthesis. Stops before `max_chars` is exceeded.
pub fn build_context(results: &[ScoredChunk], max_chars: usize) -> String {
    let mut context = String::new();

    for (i, result) in results.iter().enumerate() {
        let header = format!(
            "[{}] (source: {}, page {}, distance {:.3})\n",
            i + 1,
            result.chunk.source,
            result.chunk.page,
            result.distance
        );
        if context.len() + header.len() + result.chunk.text.len() + 2 > max_chars {
            break;
        }
        context.push_str(&header);
        context.push_str(&result.chunk.text);
        context.push_str("\n\n");
    }

    context.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunk;
    use crate::index::{DistanceMetric, IndexEntry};
    use async_trait::async_trait;

    /// Deterministic in-process embedder: maps known phrases onto fixed
    /// axes so test scenarios control which chunk a query lands near.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    if lower.contains("termination") || lower.contains("end") {
                        vec![1.0, 0.0]
                    } else if lower.contains("payment") || lower.contains("invoice") {
                        vec![0.0, 1.0]
                    } else {
                        vec![0.5, 0.5]
                    }
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model(&self) -> &str {
            "stub"
        }
    }

    fn chunk(text: &str, source: &str, page: u32) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: source.to_string(),
            page,
            chunk_index: 0,
        }
    }

    fn contract_index() -> Arc<RwLock<VectorIndex>> {
        let index = VectorIndex::build(
            2,
            DistanceMetric::L2,
            vec![
                IndexEntry {
                    vector: vec![1.0, 0.0],
                    chunk: chunk("Termination clause", "contract1", 3),
                },
                IndexEntry {
                    vector: vec![0.0, 1.0],
                    chunk: chunk("Payment terms", "contract1", 5),
                },
            ],
        )
        .unwrap();
        Arc::new(RwLock::new(index))
    }

    fn params(top_k: usize, threshold: f32) -> SearchParams {
        SearchParams {
            top_k,
            threshold,
            max_per_source: 10,
            oversample: 3,
        }
    }

    #[tokio::test]
    async fn query_lands_on_the_semantically_closest_chunk() {
        let retriever = Retriever::new(Arc::new(StubEmbedder), contract_index());

        let results = retriever
            .retrieve("how can this agreement end", &params(1, 10.0))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "Termination clause");
        assert_eq!(results[0].chunk.page, 3);
        assert_eq!(results[0].distance, 0.0);
    }

    #[tokio::test]
    async fn strict_threshold_yields_empty_result_not_error() {
        let retriever = Retriever::new(Arc::new(StubEmbedder), contract_index());

        let results = retriever
            .retrieve("weather forecast for tomorrow", &params(2, 0.1))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn empty_index_error_propagates() {
        let empty = Arc::new(RwLock::new(VectorIndex::new(2, DistanceMetric::L2)));
        let retriever = Retriever::new(Arc::new(StubEmbedder), empty);

        let err = retriever
            .retrieve("anything", &params(1, 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyIndex));
    }

    #[tokio::test]
    async fn truncates_to_top_k_after_filtering() {
        let retriever = Retriever::new(Arc::new(StubEmbedder), contract_index());

        let results = retriever
            .retrieve("termination", &params(1, 10.0))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn context_block_carries_citations() {
        let results = vec![
            ScoredChunk {
                chunk: chunk("Termination clause", "contract1", 3),
                distance: 0.12,
            },
            ScoredChunk {
                chunk: chunk("Payment terms", "contract1", 5),
                distance: 0.44,
            },
        ];

        let context = build_context(&results, 4000);
        assert!(context.contains("[1] (source: contract1, page 3"));
        assert!(context.contains("Termination clause"));
        assert!(context.contains("[2] (source: contract1, page 5"));
    }

    #[test]
    fn context_block_respects_length_cap() {
        let results = vec![
            ScoredChunk {
                chunk: chunk(&"long passage ".repeat(50), "doc", 1),
                distance: 0.1,
            },
            ScoredChunk {
                chunk: chunk("short", "doc", 2),
                distance: 0.2,
            },
        ];

        let context = build_context(&results, 80);
        assert!(context.len() <= 80);
        assert!(!context.contains("long passage"));
    }
}
