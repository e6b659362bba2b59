//! Tiled high-resolution OCR of large-format drawing sheets.
//!
//! A whole E-size sheet at 300 DPI is far beyond what Tesseract reads well,
//! and small type codes get lost. The page is instead cut into a grid of
//! overlapping crops that are rendered and OCR'd independently. The overlap
//! means a code sitting on a cell boundary appears whole in at least one of
//! the two neighbouring tiles.

use std::path::Path;

use futures::stream::{self, StreamExt};

use crate::config::OcrSettings;
use crate::models::{OcrTile, PixelRect};

use super::backend::Toolchain;
use super::normalize::normalize_ocr_text;

/// Tile grid geometry for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub rows: u32,
    pub cols: u32,
    pub overlap_px: u32,
}

impl TileGrid {
    /// Crop boxes for a page of `width` x `height` pixels, row-major.
    ///
    /// Every box is clamped to the page.
    pub fn cells(&self, width: u32, height: u32) -> Vec<(u32, u32, PixelRect)> {
        if width == 0 || height == 0 || self.rows == 0 || self.cols == 0 {
            return Vec::new();
        }

        let tile_w = width.div_ceil(self.cols) as i64;
        let tile_h = height.div_ceil(self.rows) as i64;
        let overlap = self.overlap_px as i64;
        let (page_w, page_h) = (width as i64, height as i64);

        let mut cells = Vec::with_capacity((self.rows * self.cols) as usize);
        for r in 0..self.rows {
            for c in 0..self.cols {
                let (r64, c64) = (r as i64, c as i64);
                let x0 = (c64 * tile_w - overlap).clamp(0, page_w);
                let y0 = (r64 * tile_h - overlap).clamp(0, page_h);
                let x1 = ((c64 + 1) * tile_w + overlap).clamp(0, page_w);
                let y1 = ((r64 + 1) * tile_h + overlap).clamp(0, page_h);
                if x1 <= x0 || y1 <= y0 {
                    continue;
                }
                cells.push((
                    r,
                    c,
                    PixelRect {
                        x: x0 as u32,
                        y: y0 as u32,
                        w: (x1 - x0) as u32,
                        h: (y1 - y0) as u32,
                    },
                ));
            }
        }
        cells
    }
}

/// Renders and OCRs a page tile by tile.
pub struct TiledScanner {
    tools: Toolchain,
    dpi: u32,
    grid: TileGrid,
    concurrency: usize,
}

impl TiledScanner {
    pub fn new(tools: Toolchain, settings: &OcrSettings) -> Self {
        Self {
            tools,
            dpi: settings.dpi,
            grid: TileGrid {
                rows: settings.rows,
                cols: settings.cols,
                overlap_px: settings.overlap_px,
            },
            concurrency: settings.tile_concurrency.max(1),
        }
    }

    pub fn with_grid(mut self, grid: TileGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Scan one page. An undeterminable page size yields no tiles; a failed
    /// tile yields empty text and the rest of the page is still scanned.
    pub async fn scan_page(&self, pdf: &Path, page_number: u32) -> Vec<OcrTile> {
        let size = match self.tools.text.page_size(pdf, page_number).await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(
                    "skipping tiled scan of {} page {}: {}",
                    pdf.display(),
                    page_number,
                    e
                );
                return Vec::new();
            }
        };

        let (width, height) = size.pixels(self.dpi);
        let cells = self.grid.cells(width, height);
        tracing::debug!(
            "scanning {} page {} as {} tiles ({}x{} px at {} dpi)",
            pdf.display(),
            page_number,
            cells.len(),
            width,
            height,
            self.dpi
        );

        let mut tiles: Vec<OcrTile> = stream::iter(cells)
            .map(|(row, col, rect)| self.scan_tile(pdf, page_number, row, col, rect))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        tiles.sort_by_key(|t| (t.row, t.col));
        tiles
    }

    async fn scan_tile(
        &self,
        pdf: &Path,
        page_number: u32,
        row: u32,
        col: u32,
        rect: PixelRect,
    ) -> OcrTile {
        let text = match self
            .tools
            .raster
            .render_region(pdf, page_number, self.dpi, rect)
            .await
        {
            Ok(image) => match self.tools.ocr.ocr_image(&image).await {
                Ok(raw) => normalize_ocr_text(&raw),
                Err(e) => {
                    tracing::debug!("tile r{}c{} OCR failed: {}", row, col, e);
                    String::new()
                }
            },
            Err(e) => {
                tracing::debug!("tile r{}c{} render failed: {}", row, col, e);
                String::new()
            }
        };

        OcrTile {
            page_number,
            row,
            col,
            dpi: self.dpi,
            overlap_px: self.grid.overlap_px,
            rect,
            text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: u32, cols: u32, overlap_px: u32) -> TileGrid {
        TileGrid {
            rows,
            cols,
            overlap_px,
        }
    }

    #[test]
    fn test_default_grid_shape() {
        let cells = grid(3, 2, 20).cells(1000, 900);
        assert_eq!(cells.len(), 6);
        assert_eq!((cells[0].0, cells[0].1), (0, 0));
        assert_eq!((cells[5].0, cells[5].1), (2, 1));

        // tileW = 500, tileH = 300
        assert_eq!(cells[0].2, PixelRect { x: 0, y: 0, w: 520, h: 320 });
        assert_eq!(cells[3].2, PixelRect { x: 480, y: 280, w: 520, h: 340 });
        assert_eq!(cells[5].2, PixelRect { x: 480, y: 580, w: 520, h: 320 });
    }

    #[test]
    fn test_tiles_never_exceed_page() {
        for (w, h) in [(1, 1), (7, 13), (2551, 3301), (10800, 7200)] {
            for overlap in [0, 20, 500] {
                for cell in grid(3, 2, overlap).cells(w, h) {
                    let r = cell.2;
                    assert!(r.right() <= w, "{:?} exceeds width {}", r, w);
                    assert!(r.bottom() <= h, "{:?} exceeds height {}", r, h);
                    assert!(r.w > 0 && r.h > 0);
                }
            }
        }
    }

    #[test]
    fn test_tiles_cover_page() {
        let cells = grid(3, 2, 0).cells(1001, 901);
        let area: u64 = cells.iter().map(|c| c.2.w as u64 * c.2.h as u64).sum();
        assert_eq!(area, 1001 * 901);
    }

    #[test]
    fn test_empty_page_has_no_tiles() {
        assert!(grid(3, 2, 20).cells(0, 100).is_empty());
        assert!(grid(0, 2, 20).cells(100, 100).is_empty());
    }
}
