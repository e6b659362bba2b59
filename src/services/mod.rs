//! Takeoff engine services.
//!
//! Everything except the pipeline is pure and synchronous.

pub mod classify;
pub mod codes;
pub mod export;
pub mod pipeline;
pub mod reconcile;
pub mod triage;

pub use classify::{classify_page, detect_sheet_reference, infer_category, select_snippets};
pub use codes::{discover_codes, extract_placements, verify_counts, PlacementScan};
pub use export::{combine_quantities, normalize_quantity_range, ExportFormat};
pub use pipeline::{DocumentAnalysis, PageAnalysis, TakeoffEvent, TakeoffReport, TakeoffService};
pub use reconcile::{reconcile_counts, CodeTally};
pub use triage::{triage, TriageResult};
