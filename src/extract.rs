//! Document input boundary.
//!
//! PDF/DOCX parsing itself is an external collaborator; this module fixes
//! the interface it is called through: `TextExtractor::extract` turns a raw
//! file into extracted text plus a page map. Unknown extensions fail with
//! `UnsupportedFormat` and the document is skipped, not the whole batch.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::RetrievalError;

/// Start of a page within a document's extracted text (char offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBoundary {
    pub page: u32,
    pub offset: usize,
}

/// An ingested document: extracted text plus page map.
///
/// Immutable once chunked; the core does not retain it afterwards.
#[derive(Debug, Clone)]
pub struct Document {
    /// Source identifier (filename or path).
    pub source: String,
    /// Full extracted text.
    pub text: String,
    /// Page starts in ascending char-offset order. Empty for formats
    /// without page structure; such text is attributed to page 1.
    pub pages: Vec<PageBoundary>,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Document {
            source: source.into(),
            text: text.into(),
            pages: Vec::new(),
        }
    }

    pub fn with_pages(mut self, pages: Vec<PageBoundary>) -> Self {
        self.pages = pages;
        self
    }
}

/// Extraction seam for raw files.
///
/// Implementations exist per format family; `extract` runs on already
/// uploaded local files, so the interface is synchronous.
pub trait TextExtractor: Send + Sync {
    /// Lowercase extensions this extractor handles (without the dot).
    fn extensions(&self) -> &[&str];

    /// Extract text and page boundaries from the file at `path`.
    fn extract(&self, path: &Path) -> Result<Document, RetrievalError>;

    fn supports(&self, path: &Path) -> bool {
        match extension_of(path) {
            Some(ext) => self.extensions().contains(&ext.as_str()),
            None => false,
        }
    }
}

/// Plain-text extractor for `.txt` and `.md` files. Single implicit page.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extensions(&self) -> &[&str] {
        &["txt", "md"]
    }

    fn extract(&self, path: &Path) -> Result<Document, RetrievalError> {
        if !self.supports(path) {
            return Err(RetrievalError::UnsupportedFormat(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::InvalidDocument(path.display().to_string(), e.to_string())
        })?;
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Document::new(source, text).with_pages(vec![PageBoundary { page: 1, offset: 0 }]))
    }
}

/// Dispatch table over format-specific extractors.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn TextExtractor>>,
}

impl ExtractorSet {
    pub fn new(extractors: Vec<Box<dyn TextExtractor>>) -> Self {
        Self { extractors }
    }

    /// Extract one file, failing with `UnsupportedFormat` when no registered
    /// extractor claims its extension.
    pub fn extract(&self, path: &Path) -> Result<Document, RetrievalError> {
        for extractor in &self.extractors {
            if extractor.supports(path) {
                return extractor.extract(path);
            }
        }
        Err(RetrievalError::UnsupportedFormat(path.display().to_string()))
    }
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::new(vec![Box::new(PlainTextExtractor)])
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_text_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "hello retrieval").unwrap();

        let doc = ExtractorSet::default().extract(&path).unwrap();
        assert_eq!(doc.source, "notes.txt");
        assert_eq!(doc.text, "hello retrieval");
        assert_eq!(doc.pages, vec![PageBoundary { page: 1, offset: 0 }]);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = ExtractorSet::default()
            .extract(Path::new("scan.xyz"))
            .unwrap_err();
        assert!(matches!(err, RetrievalError::UnsupportedFormat(_)));
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(PlainTextExtractor.supports(Path::new("README.TXT")));
        assert!(!PlainTextExtractor.supports(Path::new("contract.pdf")));
    }
}
