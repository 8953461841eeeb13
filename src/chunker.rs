//! Document chunking.
//!
//! Splits extracted text into overlapping windows of at most `chunk_size`
//! characters, with exactly `chunk_overlap` characters shared between
//! consecutive windows. The window end prefers a natural boundary
//! (paragraph, then sentence, then word) over a hard character cut. Chunks
//! are produced lazily so large ingestion batches never materialize a whole
//! corpus of chunks up front.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::RetrievalError;
use crate::extract::{Document, PageBoundary};

/// Bounded span of document text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Whitespace-normalized text content.
    pub text: String,
    /// Source document identifier.
    pub source: String,
    /// Page the chunk is attributed to (majority of its characters).
    pub page: u32,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RetrievalError> {
        if chunk_size == 0 {
            return Err(RetrievalError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RetrievalError::InvalidConfig(
                "chunk_overlap must be smaller than chunk_size".to_string(),
            ));
        }
        Ok(Chunker {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Lazily split a document into chunks.
    ///
    /// Deterministic: the same document and settings always yield the same
    /// sequence. Fails with `InvalidDocument` when the text is empty.
    pub fn chunk(&self, document: &Document) -> Result<Chunks, RetrievalError> {
        if document.text.trim().is_empty() {
            return Err(RetrievalError::InvalidDocument(
                document.source.clone(),
                "document text is empty".to_string(),
            ));
        }

        Ok(Chunks {
            chars: document.text.chars().collect(),
            source: document.source.clone(),
            pages: document.pages.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            pos: 0,
            next_index: 0,
        })
    }

    /// Eager variant of [`Chunker::chunk`].
    pub fn chunk_all(&self, document: &Document) -> Result<Vec<Chunk>, RetrievalError> {
        Ok(self.chunk(document)?.collect())
    }
}

/// Lazy chunk stream over one document.
#[derive(Debug)]
pub struct Chunks {
    chars: Vec<char>,
    source: String,
    pages: Vec<PageBoundary>,
    chunk_size: usize,
    chunk_overlap: usize,
    pos: usize,
    next_index: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let total = self.chars.len();
        loop {
            if self.pos >= total {
                return None;
            }

            let start = self.pos;
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                preferred_cut(&self.chars, start, hard_end, self.chunk_overlap)
            } else {
                hard_end
            };

            let raw: String = self.chars[start..end].iter().collect();
            let text = clean_text(&raw);
            let page = page_for_span(&self.pages, start, end, total);

            self.pos = if end >= total {
                total
            } else {
                // Next window starts `chunk_overlap` characters before this
                // one ended; `preferred_cut` guarantees forward progress.
                end - self.chunk_overlap
            };

            if text.is_empty() {
                continue;
            }

            let chunk = Chunk {
                text,
                source: self.source.clone(),
                page,
                chunk_index: self.next_index,
            };
            self.next_index += 1;
            return Some(chunk);
        }
    }
}

/// Pick the window end, preferring paragraph, sentence, then word breaks.
///
/// The cut never lands before `start + overlap + 1`, so the next window
/// always advances past the current start.
fn preferred_cut(chars: &[char], start: usize, hard_end: usize, overlap: usize) -> usize {
    let min_end = start + overlap + 1;
    let lo = min_end.max(start + (hard_end - start) / 2);

    if let Some(cut) = rfind_pair(chars, lo, hard_end, |a, b| a == '\n' && b == '\n') {
        return cut;
    }
    if let Some(cut) = rfind_pair(chars, lo, hard_end, |a, b| {
        matches!(a, '.' | '!' | '?') && b.is_whitespace()
    }) {
        return cut;
    }
    for i in (lo..hard_end).rev() {
        if chars[i].is_whitespace() {
            return i + 1;
        }
    }
    hard_end
}

/// Last position `i >= lo` with `pred(chars[i], chars[i + 1])`; returns the
/// cut just after the pair.
fn rfind_pair(
    chars: &[char],
    lo: usize,
    hard_end: usize,
    pred: impl Fn(char, char) -> bool,
) -> Option<usize> {
    if hard_end < lo + 2 {
        return None;
    }
    for i in (lo..=hard_end - 2).rev() {
        if pred(chars[i], chars[i + 1]) {
            return Some(i + 2);
        }
    }
    None
}

/// Attribute a chunk span to the page holding the majority of its
/// characters; ties go to the earlier page. Pageless documents use page 1.
fn page_for_span(pages: &[PageBoundary], start: usize, end: usize, total: usize) -> u32 {
    if pages.is_empty() {
        return 1;
    }

    let mut best_page = pages[0].page;
    let mut best_len = 0usize;
    for (i, boundary) in pages.iter().enumerate() {
        let page_start = boundary.offset;
        let page_end = pages.get(i + 1).map(|next| next.offset).unwrap_or(total);
        let covered = end.min(page_end).saturating_sub(start.max(page_start));
        if covered > best_len {
            best_len = covered;
            best_page = boundary.page;
        }
    }
    best_page
}

/// Collapse runs of whitespace into single spaces and trim the ends.
fn clean_text(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re.replace_all(text, " ").trim().to_string()
}
