//! Bid documents and their pages.
//!
//! Documents are supplied by the caller and never mutated by the engine.
//! Pages carry whatever text the acquisitor managed to recover.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A bid document handed to the takeoff engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Caller-provided identifier.
    pub id: String,
    /// Display filename, used for triage scoring and citations.
    pub filename: String,
    /// Cached page count, if the caller already knows it.
    pub page_count: Option<u32>,
    /// Location of the PDF content.
    pub path: PathBuf,
}

impl Document {
    /// Create a new document reference.
    pub fn new(id: impl Into<String>, filename: impl Into<String>, path: PathBuf) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            page_count: None,
            path,
        }
    }

    /// Build a document from a path on disk, deriving a stable id from the path.
    pub fn from_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(Self::compute_id(path), filename, path.to_path_buf())
    }

    /// Compute a short SHA-256 based id for a path.
    pub fn compute_id(path: &Path) -> String {
        let mut hasher = Sha256::new();
        hasher.update(path.to_string_lossy().as_bytes());
        hex::encode(hasher.finalize())[..16].to_string()
    }

    /// Set a known page count.
    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = Some(page_count);
        self
    }
}

/// How a page's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextMethod {
    /// Layout-preserving native extraction (pdftotext).
    Native,
    /// Full-page rasterize + OCR fallback.
    Ocr,
    /// Nothing usable was recovered.
    None,
}

impl TextMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Ocr => "ocr",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for TextMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text recovered for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub method: TextMethod,
    pub text: String,
}

impl PageText {
    /// The "nothing found" sentinel.
    pub fn empty() -> Self {
        Self {
            method: TextMethod::None,
            text: String::new(),
        }
    }
}

/// A page of a document as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub document_id: String,
    /// 1-indexed page number.
    pub page_number: u32,
    /// Native-extracted text, trimmed. `None` when extraction produced nothing.
    pub raw_text: Option<String>,
    /// True iff the native text is shorter than the minimum-character threshold.
    pub needs_ocr: bool,
}

impl Page {
    /// Build a page from its native text and the OCR threshold.
    pub fn from_native(
        document_id: impl Into<String>,
        page_number: u32,
        native_text: &str,
        min_chars: usize,
    ) -> Self {
        let trimmed = native_text.trim();
        Self {
            document_id: document_id.into(),
            page_number,
            raw_text: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            needs_ocr: trimmed.chars().count() < min_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_ocr_threshold() {
        let page = Page::from_native("doc", 1, "   short   ", 30);
        assert!(page.needs_ocr);
        assert_eq!(page.raw_text.as_deref(), Some("short"));

        let page = Page::from_native("doc", 2, "EXIT SIGN TYPE D7 QTY 4 AT STAIR 2", 30);
        assert!(!page.needs_ocr);
    }

    #[test]
    fn test_empty_native_text() {
        let page = Page::from_native("doc", 1, "\n\n", 30);
        assert!(page.raw_text.is_none());
        assert!(page.needs_ocr);
    }

    #[test]
    fn test_document_id_is_stable() {
        let a = Document::from_path(Path::new("/bids/A101 Floor Plan.pdf"));
        let b = Document::from_path(Path::new("/bids/A101 Floor Plan.pdf"));
        assert_eq!(a.id, b.id);
        assert_eq!(a.filename, "A101 Floor Plan.pdf");
        assert_eq!(a.id.len(), 16);
    }
}
