//! OCR and text extraction module.
//!
//! Extracts text from bid PDFs using:
//! - pdftotext (Poppler) for native, layout-preserving page text
//! - pdftoppm (Poppler) to rasterize whole pages or page regions
//! - Tesseract OCR for scanned pages and high-resolution tiles
//!
//! All tools sit behind the [`TextLayer`], [`Rasterizer`] and [`OcrEngine`]
//! traits, bundled as a [`Toolchain`].

mod backend;
mod extractor;
mod normalize;
mod poppler;
mod tesseract;
mod tiles;
mod tools;

pub use backend::{OcrEngine, PageSize, Rasterizer, TextLayer, ToolError, Toolchain};
pub use extractor::{AcquiredPage, TextExtractor};
pub use normalize::{
    collapse_whitespace, matching_form, normalize_dashes, normalize_ocr_text, truncate_chars,
};
pub use poppler::PopplerTools;
pub use tesseract::TesseractBackend;
pub use tiles::{TileGrid, TiledScanner};
pub use tools::check_binary;

/// Check if required tools are available.
pub fn check_tools() -> Vec<(String, bool)> {
    ["pdftotext", "pdftoppm", "pdfinfo", "tesseract"]
        .iter()
        .map(|tool| (tool.to_string(), check_binary(tool)))
        .collect()
}
