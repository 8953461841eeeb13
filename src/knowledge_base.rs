//! Knowledge base lifecycle.
//!
//! Owns the single shared index as an explicit context object: load-or-fresh
//! at startup, persist after every mutation. Ingestion runs the
//! chunk → embed → index → persist pipeline; a failure at any stage leaves
//! the previously persisted index untouched. Writes are serialized behind a
//! single-writer lock; searches take read locks through the retriever.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::chunker::{Chunk, Chunker};
use crate::config::RetrievalConfig;
use crate::embedder::Embedder;
use crate::errors::RetrievalError;
use crate::extract::{Document, ExtractorSet};
use crate::index::{IndexEntry, VectorIndex};
use crate::retriever::Retriever;
use crate::storage::IndexStorage;

/// Outcome of a batch ingestion. Bad documents are skipped and reported;
/// the rest of the batch proceeds.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub skipped: Vec<SkippedDocument>,
}

#[derive(Debug)]
pub struct SkippedDocument {
    pub source: String,
    pub reason: String,
}

pub struct KnowledgeBase {
    config: RetrievalConfig,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    storage: IndexStorage,
    index: Arc<RwLock<VectorIndex>>,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("config", &self.config)
            .field("chunker", &self.chunker)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    /// Open the knowledge base: load the persisted index if one exists,
    /// start empty if none does. A corrupt index surfaces as an error and
    /// is never silently discarded.
    pub async fn open(
        config: RetrievalConfig,
        embedder: Arc<dyn Embedder>,
        storage: IndexStorage,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        if embedder.dimension() != config.embedding_dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: config.embedding_dimension,
                actual: embedder.dimension(),
            });
        }

        let index = match storage
            .load(config.embedding_dimension, &config.embedding_model)
            .await
        {
            Ok(index) => index,
            Err(RetrievalError::IndexMissing(path)) => {
                tracing::info!(path = %path.display(), "no persisted index, starting empty");
                VectorIndex::new(config.embedding_dimension, config.metric)
            }
            Err(err) => return Err(err),
        };

        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
        Ok(KnowledgeBase {
            config,
            chunker,
            embedder,
            storage,
            index: Arc::new(RwLock::new(index)),
        })
    }

    /// Build a fresh index from `documents`, replacing whatever was indexed
    /// before. Atomic from the caller's perspective: on failure the prior
    /// persisted index is untouched.
    pub async fn create_from(&self, documents: &[Document]) -> Result<IngestReport, RetrievalError> {
        let (entries, report) = self.prepare_entries(documents).await?;

        let next = VectorIndex::build(self.config.embedding_dimension, self.config.metric, entries)?;

        let mut guard = self.index.write().await;
        self.storage.save(&next, &self.config.embedding_model).await?;
        *guard = next;

        Ok(report)
    }

    /// Append `documents` to the existing index and re-persist. Prior
    /// entries keep their identity and insertion order. The core does not
    /// deduplicate across calls; use [`KnowledgeBase::contains_source`]
    /// before re-adding.
    pub async fn add(&self, documents: &[Document]) -> Result<IngestReport, RetrievalError> {
        let (entries, report) = self.prepare_entries(documents).await?;

        let mut guard = self.index.write().await;
        let mut next = guard.clone();
        next.append(entries)?;
        self.storage.save(&next, &self.config.embedding_model).await?;
        *guard = next;

        Ok(report)
    }

    /// Extract files through `extractors` and append them. Unsupported or
    /// unreadable files are skipped and reported alongside the documents
    /// the chunker rejected.
    pub async fn add_paths(
        &self,
        extractors: &ExtractorSet,
        paths: &[&Path],
    ) -> Result<IngestReport, RetrievalError> {
        let mut documents = Vec::new();
        let mut skipped = Vec::new();

        for path in paths {
            match extractors.extract(path) {
                Ok(document) => documents.push(document),
                Err(err @ RetrievalError::UnsupportedFormat(_))
                | Err(err @ RetrievalError::InvalidDocument(_, _)) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping file");
                    skipped.push(SkippedDocument {
                        source: path.display().to_string(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let mut report = self.add(&documents).await?;
        report.skipped.extend(skipped);
        Ok(report)
    }

    /// Whether the index holds at least one entry.
    pub async fn is_initialized(&self) -> bool {
        !self.index.read().await.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    /// Sorted identifiers of every indexed source document.
    pub async fn indexed_sources(&self) -> Vec<String> {
        let index = self.index.read().await;
        let sources: BTreeSet<String> = index
            .entries()
            .iter()
            .map(|entry| entry.chunk.source.clone())
            .collect();
        sources.into_iter().collect()
    }

    /// Whether a source document is already indexed.
    pub async fn contains_source(&self, source: &str) -> bool {
        self.index
            .read()
            .await
            .entries()
            .iter()
            .any(|entry| entry.chunk.source == source)
    }

    /// Retriever bound to this knowledge base's index and embedder.
    pub fn retriever(&self) -> Retriever {
        Retriever::new(Arc::clone(&self.embedder), Arc::clone(&self.index))
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Chunk and embed a document batch. Per-document chunking failures are
    /// skipped and reported; embedding failures abort the whole batch since
    /// nothing has been indexed yet.
    async fn prepare_entries(
        &self,
        documents: &[Document],
    ) -> Result<(Vec<IndexEntry>, IngestReport), RetrievalError> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut report = IngestReport::default();

        for document in documents {
            match self.chunker.chunk(document) {
                Ok(stream) => {
                    let before = chunks.len();
                    chunks.extend(stream);
                    report.documents_indexed += 1;
                    tracing::debug!(
                        source = %document.source,
                        chunks = chunks.len() - before,
                        "chunked document"
                    );
                }
                Err(err @ RetrievalError::InvalidDocument(_, _)) => {
                    tracing::warn!(source = %document.source, error = %err, "skipping document");
                    report.skipped.push(SkippedDocument {
                        source: document.source.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RetrievalError::EmbeddingService(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        report.chunks_indexed = chunks.len();
        let entries = vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| IndexEntry { vector, chunk })
            .collect();

        Ok((entries, report))
    }
}
