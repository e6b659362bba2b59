//! Boundary to the external rendering, text and OCR tools.
//!
//! The engine only talks to these traits. Production implementations shell
//! out to Poppler and Tesseract; tests plug in deterministic fakes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::OcrSettings;
use crate::models::PixelRect;

use super::poppler::PopplerTools;
use super::tesseract::TesseractBackend;

/// Errors from external tools.
///
/// None of these are fatal to a takeoff run: callers log them and carry on
/// with an empty result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("External tool not found: {0}")]
    ToolUnavailable(String),

    #[error("{tool} timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Invalid page geometry: {0}")]
    InvalidPageGeometry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Page size in PDF points (1/72 inch), rotation already applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pts: f64,
    pub height_pts: f64,
}

impl PageSize {
    /// Pixel dimensions when rendered at `dpi`.
    pub fn pixels(&self, dpi: u32) -> (u32, u32) {
        let scale = dpi as f64 / 72.0;
        (
            (self.width_pts * scale).round().max(0.0) as u32,
            (self.height_pts * scale).round().max(0.0) as u32,
        )
    }
}

/// Native text layer of a PDF.
#[async_trait]
pub trait TextLayer: Send + Sync {
    /// Number of pages in the document.
    async fn page_count(&self, pdf: &Path) -> Result<u32, ToolError>;

    /// Size of a 1-indexed page.
    async fn page_size(&self, pdf: &Path, page: u32) -> Result<PageSize, ToolError>;

    /// Layout-preserving text of a 1-indexed page.
    async fn page_text(&self, pdf: &Path, page: u32) -> Result<String, ToolError>;
}

/// Renders PDF pages (or regions of them) to PNG bytes.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn render_page(&self, pdf: &Path, page: u32, dpi: u32) -> Result<Vec<u8>, ToolError>;

    /// Render only `region`, given in page pixels at `dpi`.
    async fn render_region(
        &self,
        pdf: &Path,
        page: u32,
        dpi: u32,
        region: PixelRect,
    ) -> Result<Vec<u8>, ToolError>;
}

/// Recognizes text in an image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn ocr_image(&self, image: &[u8]) -> Result<String, ToolError>;
}

/// The set of external collaborators a takeoff run uses.
#[derive(Clone)]
pub struct Toolchain {
    pub text: Arc<dyn TextLayer>,
    pub raster: Arc<dyn Rasterizer>,
    pub ocr: Arc<dyn OcrEngine>,
}

impl Toolchain {
    /// Poppler for text and rendering, Tesseract for OCR.
    pub fn system(settings: &OcrSettings) -> Self {
        let poppler = Arc::new(PopplerTools::new(settings));
        Self {
            text: poppler.clone(),
            raster: poppler,
            ocr: Arc::new(TesseractBackend::with_settings(settings)),
        }
    }

    pub fn new(
        text: Arc<dyn TextLayer>,
        raster: Arc<dyn Rasterizer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self { text, raster, ocr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_pixels() {
        let letter = PageSize {
            width_pts: 612.0,
            height_pts: 792.0,
        };
        assert_eq!(letter.pixels(72), (612, 792));
        assert_eq!(letter.pixels(300), (2550, 3300));

        let arch_d = PageSize {
            width_pts: 2592.0,
            height_pts: 1728.0,
        };
        assert_eq!(arch_d.pixels(300), (10800, 7200));
    }
}
