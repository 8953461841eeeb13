//! Retrieval core for a grounded document question-answering assistant.
//!
//! Turns heterogeneous documents into a searchable vector index, queries it
//! under a distance metric, and filters/ranks results before they are handed
//! to answer synthesis. Pipeline:
//!
//! documents → chunker → embedder → vector index (build/append) → persisted
//! query → embedder → vector index (search) → relevance filter → retriever output
//!
//! The interactive UI, file upload, secrets, and the language-model call
//! itself are external collaborators; this crate stops at the ranked,
//! cited passages.

pub mod chunker;
pub mod config;
pub mod embedder;
pub mod errors;
pub mod extract;
pub mod filter;
pub mod index;
pub mod knowledge_base;
pub mod logging;
pub mod retriever;
pub mod storage;

pub use chunker::{Chunk, Chunker};
pub use config::RetrievalConfig;
pub use embedder::{Embedder, HttpEmbedder};
pub use errors::RetrievalError;
pub use extract::{Document, ExtractorSet, PageBoundary, TextExtractor};
pub use filter::RelevanceFilter;
pub use index::{DistanceMetric, IndexEntry, ScoredChunk, VectorIndex};
pub use knowledge_base::{IngestReport, KnowledgeBase};
pub use retriever::{build_context, Retriever, SearchParams};
pub use storage::IndexStorage;
