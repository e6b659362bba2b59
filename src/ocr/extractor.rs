//! Per-page text acquisition: native text first, OCR as fallback.

use std::path::Path;

use crate::config::OcrSettings;
use crate::models::{Page, PageText, TextMethod};

use super::backend::Toolchain;
use super::normalize::normalize_ocr_text;

/// Result of acquiring one page.
#[derive(Debug, Clone)]
pub struct AcquiredPage {
    /// The page with its native text and OCR flag.
    pub page: Page,
    /// Best text found, and how.
    pub text: PageText,
}

/// Gets page text using pdftotext, falling back to rasterize + OCR.
///
/// Never fails: any tool error or timeout is logged and treated as empty
/// output so the next fallback runs.
pub struct TextExtractor {
    tools: Toolchain,
    /// Minimum native characters to accept a page without OCR.
    min_chars: usize,
    /// Resolution for the full-page OCR fallback.
    page_dpi: u32,
}

impl TextExtractor {
    pub fn new(tools: Toolchain, settings: &OcrSettings) -> Self {
        Self {
            tools,
            min_chars: settings.min_chars,
            page_dpi: settings.page_dpi,
        }
    }

    /// Set minimum characters per page threshold.
    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    /// Acquire the text of a single page.
    pub async fn acquire(&self, document_id: &str, pdf: &Path, page_number: u32) -> AcquiredPage {
        let native = match self.tools.text.page_text(pdf, page_number).await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(
                    "native text failed for {} page {}: {}",
                    pdf.display(),
                    page_number,
                    e
                );
                String::new()
            }
        };

        let page = Page::from_native(document_id, page_number, &native, self.min_chars);
        if !page.needs_ocr {
            let text = PageText {
                method: TextMethod::Native,
                text: page.raw_text.clone().unwrap_or_default(),
            };
            return AcquiredPage { page, text };
        }

        tracing::debug!(
            "page {} of {} has sparse native text, falling back to OCR",
            page_number,
            pdf.display()
        );

        let text = self.ocr_page(pdf, page_number).await;
        AcquiredPage { page, text }
    }

    async fn ocr_page(&self, pdf: &Path, page_number: u32) -> PageText {
        let image = match self
            .tools
            .raster
            .render_page(pdf, page_number, self.page_dpi)
            .await
        {
            Ok(image) => image,
            Err(e) => {
                tracing::debug!("render failed for page {}: {}", page_number, e);
                return PageText::empty();
            }
        };

        match self.tools.ocr.ocr_image(&image).await {
            Ok(raw) => {
                let text = normalize_ocr_text(&raw);
                if text.is_empty() {
                    PageText::empty()
                } else {
                    PageText {
                        method: TextMethod::Ocr,
                        text,
                    }
                }
            }
            Err(e) => {
                tracing::debug!("OCR failed for page {}: {}", page_number, e);
                PageText::empty()
            }
        }
    }
}
