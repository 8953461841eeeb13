//! In-memory flat vector index.
//!
//! Exact (brute-force) nearest-neighbor search over every entry. At this
//! corpus scale (thousands of chunks, not billions) a full scan is both
//! correct and fast enough, and sidesteps the recall loss of approximate
//! structures. The in-memory index is a cache of the persisted form in
//! `storage`; it is mutated only by `append` and rebuilt on load.

use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;
use crate::errors::RetrievalError;

/// Dissimilarity measure between two embeddings. Lower = more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance.
    #[default]
    L2,
    /// Cosine distance (1 - cosine similarity).
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::Cosine => "cosine",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "l2" => Some(DistanceMetric::L2),
            "cosine" => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }

    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// One indexed chunk with its embedding. Never mutated after insertion;
/// removed only by a full rebuild.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// A retrieval result row: a chunk and its distance to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    metric: DistanceMetric,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Create an empty index with a declared dimension and metric.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        VectorIndex {
            dimension,
            metric,
            entries: Vec::new(),
        }
    }

    /// Initialize a fresh index from entries, checking every vector's
    /// dimension.
    pub fn build(
        dimension: usize,
        metric: DistanceMetric,
        entries: Vec<IndexEntry>,
    ) -> Result<Self, RetrievalError> {
        let mut index = Self::new(dimension, metric);
        index.append(entries)?;
        Ok(index)
    }

    /// Add entries without disturbing existing entries or their insertion
    /// ranks (ranks break distance ties during search).
    pub fn append(&mut self, entries: Vec<IndexEntry>) -> Result<(), RetrievalError> {
        for entry in &entries {
            if entry.vector.len() != self.dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: self.dimension,
                    actual: entry.vector.len(),
                });
            }
        }
        self.entries.extend(entries);
        Ok(())
    }

    /// Exact k-nearest-neighbor search, ascending by distance.
    ///
    /// `k` larger than the index is clamped, never an error; an index with
    /// zero entries fails with `EmptyIndex`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, RetrievalError> {
        if self.entries.is_empty() {
            return Err(RetrievalError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(rank, entry)| (self.metric.distance(query, &entry.vector), rank))
            .collect();

        // Ascending distance; earlier-inserted entry wins ties so results
        // stay deterministic.
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k.min(self.entries.len()));

        Ok(scored
            .into_iter()
            .map(|(distance, rank)| ScoredChunk {
                chunk: self.entries[rank].chunk.clone(),
                distance,
            })
            .collect())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vector: Vec<f32>, source: &str, index: usize) -> IndexEntry {
        IndexEntry {
            vector,
            chunk: Chunk {
                text: format!("chunk {index} of {source}"),
                source: source.to_string(),
                page: 1,
                chunk_index: index,
            },
        }
    }

    fn small_index() -> VectorIndex {
        VectorIndex::build(
            2,
            DistanceMetric::L2,
            vec![
                entry(vec![0.0, 0.0], "a", 0),
                entry(vec![1.0, 0.0], "a", 1),
                entry(vec![0.0, 2.0], "b", 0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn search_on_empty_index_fails() {
        let index = VectorIndex::new(2, DistanceMetric::L2);
        assert!(matches!(
            index.search(&[0.0, 0.0], 3),
            Err(RetrievalError::EmptyIndex)
        ));
    }

    #[test]
    fn identical_vector_ranks_first_with_distance_zero() {
        let index = small_index();
        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results[0].chunk.chunk_index, 1);
        assert_eq!(results[0].distance, 0.0);
    }

    #[test]
    fn results_ascend_and_clamp_to_index_size() {
        let index = small_index();
        let results = index.search(&[0.0, 0.0], 100).unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let index = VectorIndex::build(
            1,
            DistanceMetric::L2,
            vec![
                entry(vec![1.0], "second", 7),
                entry(vec![-1.0], "first", 3),
            ],
        )
        .unwrap();

        // Both entries sit at distance 1 from the origin; the earlier
        // insertion must rank first.
        let results = index.search(&[0.0], 2).unwrap();
        assert_eq!(results[0].chunk.source, "second");
        assert_eq!(results[1].chunk.source, "first");
    }

    #[test]
    fn build_rejects_mismatched_dimensions() {
        let err = VectorIndex::build(
            3,
            DistanceMetric::L2,
            vec![entry(vec![1.0, 2.0], "a", 0)],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn append_preserves_existing_entries() {
        let mut index = small_index();
        index
            .append(vec![entry(vec![5.0, 5.0], "c", 0)])
            .unwrap();
        assert_eq!(index.len(), 4);

        // A failed append leaves the index untouched.
        let err = index.append(vec![entry(vec![1.0], "bad", 0)]).unwrap_err();
        assert!(matches!(err, RetrievalError::DimensionMismatch { .. }));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn query_dimension_is_checked() {
        let index = small_index();
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(RetrievalError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn cosine_distance_orders_by_angle() {
        let index = VectorIndex::build(
            2,
            DistanceMetric::Cosine,
            vec![
                entry(vec![0.0, 1.0], "orthogonal", 0),
                entry(vec![10.0, 0.0], "aligned", 0),
            ],
        )
        .unwrap();

        // Cosine ignores magnitude: the long aligned vector is closest.
        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].chunk.source, "aligned");
        assert!(results[0].distance.abs() < 1e-6);
        assert!((results[1].distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_is_the_default_metric() {
        assert_eq!(DistanceMetric::default(), DistanceMetric::L2);
        assert_eq!(DistanceMetric::parse("l2"), Some(DistanceMetric::L2));
        assert_eq!(DistanceMetric::parse("cosine"), Some(DistanceMetric::Cosine));
        assert_eq!(DistanceMetric::parse("dot"), None);
    }
}
