//! Takeoff entities: tiles, code placements, reconciled quantities and line items.
//!
//! All of these live for a single extraction run. Persisting them is the
//! caller's concern.

use serde::{Deserialize, Serialize};

/// A crop rectangle in page-pixel space at the tiling DPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelRect {
    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    /// True if `other` lies entirely inside this rectangle.
    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// True if the two rectangles share a region of positive area.
    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// One OCR'd tile of a rasterized page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrTile {
    pub page_number: u32,
    pub row: u32,
    pub col: u32,
    pub dpi: u32,
    pub overlap_px: u32,
    #[serde(flatten)]
    pub rect: PixelRect,
    /// Normalized OCR text; empty when render or OCR failed.
    pub text: String,
}

/// A code promoted by discovery, with its cross-tile occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeToken {
    pub code: String,
    pub occurrences: usize,
}

/// Where a placement came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementMeta {
    /// Extraction method, e.g. "tile_ocr".
    pub method: String,
    pub row: u32,
    pub col: u32,
    #[serde(flatten)]
    pub rect: PixelRect,
    pub dpi: u32,
    pub overlap_px: u32,
}

/// One located occurrence of a discovered code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub code: String,
    pub page_number: u32,
    /// Whitespace-collapsed context clipped around the match.
    pub evidence_text: String,
    /// Short context around the match, used to recognize the same occurrence
    /// seen through two overlapping tiles.
    pub local_context: String,
    pub meta: PlacementMeta,
}

/// Per-code quantity after combining all independent sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledQuantity {
    /// Mentions in native plan text.
    pub text_qty: u32,
    /// Authoritative schedule/legend count (0 when absent).
    pub primary_qty: u32,
    /// Placements found by tiled OCR verification.
    pub verify_qty: u32,
    pub final_qty: u32,
}

/// Confidence bucket for an export row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Bucket a 0.0 - 1.0 score.
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ungrouped line item, as produced by the engine or the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLineItem {
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub pages: Vec<u32>,
    /// Free-form quantity: "4", "TBD", "4 to 6".
    pub estimated_qty: String,
    pub unit: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub sheet_reference: Option<String>,
    /// Source documents, when file paths are exported.
    #[serde(default)]
    pub file_paths: Vec<String>,
    /// 0.0 - 1.0.
    pub confidence: f32,
}

/// A grouped export row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeoffLineItem {
    pub category: String,
    pub description: String,
    pub pages: Vec<u32>,
    pub estimated_qty: String,
    pub unit: String,
    pub notes: String,
    pub file_paths: Vec<String>,
    pub sheet_reference: String,
    pub confidence: Confidence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_buckets() {
        assert_eq!(Confidence::from_score(0.95), Confidence::High);
        assert_eq!(Confidence::from_score(0.8), Confidence::High);
        assert_eq!(Confidence::from_score(0.79), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.5), Confidence::Medium);
        assert_eq!(Confidence::from_score(0.1), Confidence::Low);
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }

    #[test]
    fn test_rect_contains() {
        let outer = PixelRect { x: 0, y: 0, w: 100, h: 100 };
        assert!(outer.contains(&PixelRect { x: 10, y: 10, w: 20, h: 20 }));
        assert!(!outer.contains(&PixelRect { x: 90, y: 10, w: 20, h: 20 }));
    }
}
