//! Takeoff pipeline types and events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::llm::QualitativeReport;
use crate::models::{
    CodeToken, EvidenceKind, EvidenceSnippet, OcrTile, Placement, ReconciledQuantity,
    TakeoffLineItem, TextMethod,
};
use crate::services::reconcile::CodeTally;
use crate::services::triage::TriageResult;

/// Events emitted while a takeoff runs.
#[derive(Debug, Clone)]
pub enum TakeoffEvent {
    /// Triage finished
    TriageComplete {
        total_documents: usize,
        selected: usize,
        fallback: bool,
    },
    /// Page acquisition started for the selected documents
    PagesStarted { total_pages: usize },
    /// Document page count could not be read
    DocumentFailed { document_id: String, error: String },
    /// One page acquired and classified
    PageAcquired {
        document_id: String,
        page_number: u32,
        method: TextMethod,
        kind: EvidenceKind,
    },
    /// Tiled scan of one page finished
    TilesScanned {
        document_id: String,
        page_number: u32,
        tiles: usize,
        empty_tiles: usize,
    },
    /// Codes promoted by discovery
    CodesDiscovered { count: usize },
    /// Placement extraction for one document finished
    DocumentCompleted {
        document_id: String,
        pages: usize,
        placements: usize,
    },
    /// A document hit the placement cap
    PlacementCapReached { document_id: String, cap: usize },
    /// Per-code reconciliation finished
    ReconciliationComplete { codes: usize },
    /// Collaborator returned a report
    CollaboratorComplete { entries: usize },
    /// Collaborator failed; the deterministic result stands
    CollaboratorDegraded { reason: String },
}

/// Everything learned about one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageAnalysis {
    pub page_number: u32,
    pub method: TextMethod,
    pub needs_ocr: bool,
    pub kind: EvidenceKind,
    pub sheet_reference: Option<String>,
    pub text: String,
    pub snippets: Vec<EvidenceSnippet>,
    pub tiles: Vec<OcrTile>,
}

/// Per-document results.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalysis {
    pub document_id: String,
    pub filename: String,
    pub pages: Vec<PageAnalysis>,
    pub placements: Vec<Placement>,
    /// Placement extraction stopped at the cap.
    pub truncated: bool,
    pub tallies: BTreeMap<String, CodeTally>,
    pub sightings: BTreeMap<String, CodeSighting>,
}

/// Where one code was seen within one document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CodeSighting {
    pub pages: Vec<u32>,
    pub sheet_reference: Option<String>,
    /// Placement evidence and page lines that mention the code.
    pub context: Vec<String>,
}

/// Result of a full takeoff run. Always produced, possibly partial.
#[derive(Debug, Clone, Serialize)]
pub struct TakeoffReport {
    pub job_id: String,
    pub generated_at: DateTime<Utc>,
    pub triage: TriageResult,
    pub codes: Vec<CodeToken>,
    pub documents: Vec<DocumentAnalysis>,
    /// Job-wide counts per code.
    pub tallies: BTreeMap<String, CodeTally>,
    pub quantities: BTreeMap<String, ReconciledQuantity>,
    /// Export rows; quantities come from `quantities`.
    pub line_items: Vec<TakeoffLineItem>,
    pub qualitative: Option<QualitativeReport>,
    /// Non-fatal problems worth showing to a reviewer.
    pub warnings: Vec<String>,
}

impl TakeoffReport {
    /// All placements across documents, for audit display.
    pub fn placements(&self) -> impl Iterator<Item = &Placement> {
        self.documents.iter().flat_map(|d| d.placements.iter())
    }

    pub fn page_count(&self) -> usize {
        self.documents.iter().map(|d| d.pages.len()).sum()
    }
}
