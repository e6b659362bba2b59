//! Data models for the takeoff engine.

mod document;
mod evidence;
mod takeoff;

pub use document::{Document, Page, PageText, TextMethod};
pub use evidence::{EvidenceKind, EvidenceSnippet};
pub use takeoff::{
    CodeToken, Confidence, OcrTile, PixelRect, Placement, PlacementMeta, RawLineItem,
    ReconciledQuantity, TakeoffLineItem,
};
