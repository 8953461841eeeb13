//! Relevance filtering of raw search results.
//!
//! Two policies run over the distance-ascending candidate list: a distance
//! threshold drops low-confidence matches, and a per-source cap keeps one
//! document from dominating the answer context. An empty survivor set is a
//! valid outcome, not an error; the retriever reports "nothing relevant"
//! instead of fabricating matches.

use std::collections::HashMap;

use crate::index::ScoredChunk;

#[derive(Debug, Clone, Copy)]
pub struct RelevanceFilter {
    /// Maximum distance a result may have to survive.
    pub threshold: f32,
    /// Maximum surviving results per source document.
    pub max_per_source: usize,
}

impl RelevanceFilter {
    pub fn new(threshold: f32, max_per_source: usize) -> Self {
        RelevanceFilter {
            threshold,
            max_per_source,
        }
    }

    /// Prune a distance-ascending result list. Order is preserved, so the
    /// survivors per source are automatically the closest ones.
    pub fn apply(&self, results: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        let mut per_source: HashMap<String, usize> = HashMap::new();

        results
            .into_iter()
            .filter(|result| {
                if result.distance > self.threshold {
                    return false;
                }
                let seen = per_source.entry(result.chunk.source.clone()).or_insert(0);
                *seen += 1;
                *seen <= self.max_per_source
            })
            .collect()
    }
}
