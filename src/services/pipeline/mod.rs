//! Takeoff pipeline.
//!
//! Triage selects documents, every selected page is acquired and classified
//! (with a tiled scan when its native text is sparse), codes are discovered
//! across the whole job, placements are extracted and counted per document,
//! and every code is reconciled once all counts are in. Export rows are built
//! from the reconciled quantities. Emits events for progress tracking.

mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::config::{Config, TileScanMode};
use crate::llm::{DocumentUnderstanding, QualitativeReport, UnderstandingRequest};
use crate::models::{
    CodeToken, Document, EvidenceKind, EvidenceSnippet, OcrTile, RawLineItem, ReconciledQuantity,
    TakeoffLineItem, TextMethod,
};
use crate::ocr::{TextExtractor, TiledScanner, Toolchain};

use super::classify::{classify_page, detect_sheet_reference, infer_category, select_snippets};
use super::codes::{
    count_occurrences, discover_codes, extract_placements, schedule_quantity, token_matcher,
    verify_counts,
};
use super::export::{aggregate, merge_across_documents};
use super::reconcile::{reconcile_all, CodeTally};
use super::triage::triage;

pub use types::{CodeSighting, DocumentAnalysis, PageAnalysis, TakeoffEvent, TakeoffReport};

/// Runs takeoffs over a set of bid documents.
pub struct TakeoffService {
    config: Config,
    tools: Toolchain,
    collaborator: Option<Arc<dyn DocumentUnderstanding>>,
}

impl TakeoffService {
    pub fn new(config: Config, tools: Toolchain) -> Self {
        Self {
            config,
            tools,
            collaborator: None,
        }
    }

    /// Attach a document-understanding collaborator for the qualitative pass.
    pub fn with_collaborator(mut self, collaborator: Arc<dyn DocumentUnderstanding>) -> Self {
        self.collaborator = Some(collaborator);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn extractor(&self) -> TextExtractor {
        TextExtractor::new(self.tools.clone(), &self.config.ocr)
    }

    fn scanner(&self) -> TiledScanner {
        TiledScanner::new(self.tools.clone(), &self.config.ocr)
    }

    /// Acquire, classify and (when configured) tile-scan one page.
    pub async fn analyze_page(&self, document: &Document, page_number: u32) -> PageAnalysis {
        let acquired = self
            .extractor()
            .acquire(&document.id, &document.path, page_number)
            .await;

        let kind = classify_page(&acquired.text.text);
        let snippets = select_snippets(
            &document.filename,
            page_number,
            kind,
            &acquired.text.text,
            &self.config.snippets,
        );

        let scan = match self.config.ocr.tile_scan {
            TileScanMode::All => true,
            TileScanMode::Sparse => acquired.page.needs_ocr,
            TileScanMode::Never => false,
        };
        let tiles = if scan {
            self.scanner().scan_page(&document.path, page_number).await
        } else {
            Vec::new()
        };

        PageAnalysis {
            page_number,
            method: acquired.text.method,
            needs_ocr: acquired.page.needs_ocr,
            kind,
            sheet_reference: detect_sheet_reference(&acquired.text.text),
            text: acquired.text.text,
            snippets,
            tiles,
        }
    }

    async fn page_count(&self, document: &Document) -> Result<u32, String> {
        if let Some(n) = document.page_count {
            return Ok(n);
        }
        self.tools
            .text
            .page_count(&document.path)
            .await
            .map_err(|e| e.to_string())
    }

    /// Run the full takeoff. Never fails; problems are logged, reported as
    /// events and listed in the report's warnings.
    pub async fn run(
        &self,
        job_id: &str,
        documents: &[Document],
        event_tx: mpsc::Sender<TakeoffEvent>,
    ) -> TakeoffReport {
        let mut warnings = Vec::new();

        // ==================== Triage ====================
        let selection = triage(job_id, documents, &self.config.triage);
        let _ = event_tx
            .send(TakeoffEvent::TriageComplete {
                total_documents: documents.len(),
                selected: selection.selected.len(),
                fallback: selection.fallback,
            })
            .await;

        let selected: Vec<&Document> = selection
            .selected
            .iter()
            .filter_map(|s| documents.iter().find(|d| d.id == s.id))
            .collect();

        // ==================== Page acquisition ====================
        let mut units: Vec<(usize, u32)> = Vec::new();
        for (idx, document) in selected.iter().enumerate() {
            match self.page_count(document).await {
                Ok(n) => units.extend((1..=n).map(|page| (idx, page))),
                Err(error) => {
                    tracing::warn!("cannot read page count of {}: {}", document.filename, error);
                    warnings.push(format!("{}: {}", document.filename, error));
                    let _ = event_tx
                        .send(TakeoffEvent::DocumentFailed {
                            document_id: document.id.clone(),
                            error,
                        })
                        .await;
                }
            }
        }

        let _ = event_tx
            .send(TakeoffEvent::PagesStarted {
                total_pages: units.len(),
            })
            .await;

        let workers = self.config.workers.max(1);
        let analyzed: Vec<(usize, PageAnalysis)> = stream::iter(units)
            .map(|(idx, page_number)| {
                let document = selected[idx];
                let tx = event_tx.clone();
                async move {
                    let analysis = self.analyze_page(document, page_number).await;
                    let _ = tx
                        .send(TakeoffEvent::PageAcquired {
                            document_id: document.id.clone(),
                            page_number,
                            method: analysis.method,
                            kind: analysis.kind,
                        })
                        .await;
                    if !analysis.tiles.is_empty() {
                        let _ = tx
                            .send(TakeoffEvent::TilesScanned {
                                document_id: document.id.clone(),
                                page_number,
                                tiles: analysis.tiles.len(),
                                empty_tiles: analysis
                                    .tiles
                                    .iter()
                                    .filter(|t| t.text.is_empty())
                                    .count(),
                            })
                            .await;
                    }
                    (idx, analysis)
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut pages_by_doc: Vec<Vec<PageAnalysis>> = vec![Vec::new(); selected.len()];
        for (idx, analysis) in analyzed {
            pages_by_doc[idx].push(analysis);
        }
        for pages in &mut pages_by_doc {
            pages.sort_by_key(|p| p.page_number);
        }

        // ==================== Discovery ====================
        let codes = discover_codes(
            pages_by_doc.iter().flatten().flat_map(|page| {
                let native = (page.method == TextMethod::Native).then_some(page.text.as_str());
                page.tiles
                    .iter()
                    .map(|t| t.text.as_str())
                    .chain(native)
            }),
            &self.config.discovery,
        );
        tracing::info!("job {}: discovered {} codes", job_id, codes.len());
        let _ = event_tx
            .send(TakeoffEvent::CodesDiscovered { count: codes.len() })
            .await;

        // ==================== Placements and counts ====================
        let mut analyses = Vec::with_capacity(selected.len());
        let mut job_tallies: BTreeMap<String, CodeTally> = BTreeMap::new();
        for (document, pages) in selected.iter().zip(pages_by_doc) {
            let analysis = self.analyze_document(document, pages, &codes);
            if analysis.truncated {
                warnings.push(format!(
                    "{}: placement cap of {} reached",
                    document.filename, self.config.discovery.max_placements
                ));
                let _ = event_tx
                    .send(TakeoffEvent::PlacementCapReached {
                        document_id: document.id.clone(),
                        cap: self.config.discovery.max_placements,
                    })
                    .await;
            }
            for (code, tally) in &analysis.tallies {
                job_tallies.entry(code.clone()).or_default().absorb(*tally);
            }
            let _ = event_tx
                .send(TakeoffEvent::DocumentCompleted {
                    document_id: document.id.clone(),
                    pages: analysis.pages.len(),
                    placements: analysis.placements.len(),
                })
                .await;
            analyses.push(analysis);
        }

        // ==================== Reconciliation ====================
        let quantities = reconcile_all(&job_tallies, &self.config.reconcile);
        let _ = event_tx
            .send(TakeoffEvent::ReconciliationComplete {
                codes: quantities.len(),
            })
            .await;

        // ==================== Qualitative pass ====================
        let qualitative = self
            .consult_collaborator(&analyses, &job_tallies, &event_tx, &mut warnings)
            .await;

        let mut rows =
            self.job_line_items(&codes, &selected, &analyses, &job_tallies, &quantities);
        if let Some(report) = &qualitative {
            rows.extend(aggregate(&report.to_raw_items(None), &self.config.export));
        }
        let line_items = merge_across_documents(rows, self.config.export.page_cap);

        TakeoffReport {
            job_id: job_id.to_string(),
            generated_at: chrono::Utc::now(),
            triage: selection,
            codes,
            documents: analyses,
            tallies: job_tallies,
            quantities,
            line_items,
            qualitative,
            warnings,
        }
    }

    /// Placements, per-code counts and sightings for one document.
    fn analyze_document(
        &self,
        document: &Document,
        pages: Vec<PageAnalysis>,
        codes: &[CodeToken],
    ) -> DocumentAnalysis {
        let tiles: Vec<OcrTile> = pages.iter().flat_map(|p| p.tiles.iter().cloned()).collect();
        let scan = extract_placements(&tiles, codes, &self.config.discovery);
        let verified = verify_counts(&scan.placements);

        let mut tallies: BTreeMap<String, CodeTally> = BTreeMap::new();
        let mut sightings: BTreeMap<String, CodeSighting> = BTreeMap::new();
        for token in codes {
            let Some(matcher) = token_matcher(&token.code) else {
                continue;
            };

            let mut tally = CodeTally {
                verify_qty: verified.get(&token.code).copied().unwrap_or(0),
                ..Default::default()
            };
            let mut found_on: Vec<&PageAnalysis> = Vec::new();
            for page in &pages {
                let mut present = scan
                    .placements
                    .iter()
                    .any(|p| p.code == token.code && p.page_number == page.page_number);
                if page.kind.is_authoritative() {
                    if let Some(qty) = schedule_quantity(&page.text, &matcher) {
                        tally.primary_qty = tally.primary_qty.max(qty);
                        present = true;
                    }
                } else if page.method == TextMethod::Native {
                    let n = count_occurrences(&page.text, &matcher);
                    tally.text_qty += n;
                    present |= n > 0;
                }
                if present {
                    found_on.push(page);
                }
            }

            if found_on.is_empty() {
                continue;
            }

            let context = scan
                .placements
                .iter()
                .filter(|p| p.code == token.code)
                .map(|p| p.evidence_text.clone())
                .chain(found_on.iter().flat_map(|page| {
                    page.text
                        .lines()
                        .filter(|line| line.to_uppercase().contains(&token.code))
                        .map(str::to_string)
                }))
                .collect();
            tallies.insert(token.code.clone(), tally);
            sightings.insert(
                token.code.clone(),
                CodeSighting {
                    pages: found_on.iter().map(|p| p.page_number).collect(),
                    sheet_reference: found_on.iter().find_map(|p| p.sheet_reference.clone()),
                    context,
                },
            );
        }

        tracing::info!(
            "{}: {} pages, {} placements, {} codes present",
            document.filename,
            pages.len(),
            scan.placements.len(),
            tallies.len()
        );

        DocumentAnalysis {
            document_id: document.id.clone(),
            filename: document.filename.clone(),
            pages,
            placements: scan.placements,
            truncated: scan.truncated,
            tallies,
            sightings,
        }
    }

    /// One raw item per code, carrying the job-wide reconciled quantity and
    /// the pages and evidence of every document the code was seen in, then
    /// grouped by category.
    fn job_line_items(
        &self,
        codes: &[CodeToken],
        documents: &[&Document],
        analyses: &[DocumentAnalysis],
        tallies: &BTreeMap<String, CodeTally>,
        quantities: &BTreeMap<String, ReconciledQuantity>,
    ) -> Vec<TakeoffLineItem> {
        let mut raw_items = Vec::new();
        for token in codes {
            let code = token.code.as_str();
            let (Some(tally), Some(quantity)) = (tallies.get(code), quantities.get(code)) else {
                continue;
            };

            let mut pages = BTreeSet::new();
            let mut context: Vec<&str> = Vec::new();
            let mut sheet_reference = None;
            let mut file_paths = Vec::new();
            for (document, analysis) in documents.iter().zip(analyses) {
                let Some(sighting) = analysis.sightings.get(code) else {
                    continue;
                };
                pages.extend(sighting.pages.iter().copied());
                context.extend(sighting.context.iter().map(String::as_str));
                if sheet_reference.is_none() {
                    sheet_reference = sighting.sheet_reference.clone();
                }
                if self.config.export.include_file_path {
                    file_paths.push(document.path.display().to_string());
                }
            }

            raw_items.push(RawLineItem {
                category: infer_category(&context.join("\n")).to_string(),
                description: format!("Type {}", code),
                pages: pages.into_iter().collect(),
                estimated_qty: quantity.final_qty.to_string(),
                unit: "EA".to_string(),
                notes: format!(
                    "{}: text {}, schedule {}, verify {}",
                    code, quantity.text_qty, quantity.primary_qty, quantity.verify_qty
                ),
                sheet_reference,
                file_paths,
                confidence: source_confidence(*tally),
            });
        }
        aggregate(&raw_items, &self.config.export)
    }

    /// Ask the collaborator for a qualitative review. Any failure or timeout
    /// degrades to `None`.
    async fn consult_collaborator(
        &self,
        analyses: &[DocumentAnalysis],
        tallies: &BTreeMap<String, CodeTally>,
        event_tx: &mpsc::Sender<TakeoffEvent>,
        warnings: &mut Vec<String>,
    ) -> Option<QualitativeReport> {
        let collaborator = self.collaborator.as_ref()?;
        if !self.config.llm.enabled {
            return None;
        }

        let mut snippets: Vec<EvidenceSnippet> = analyses
            .iter()
            .flat_map(|a| a.pages.iter())
            .filter(|p| p.kind != EvidenceKind::Unknown)
            .flat_map(|p| p.snippets.iter().cloned())
            .collect();
        // Schedules and legends first.
        snippets.sort_by_key(|s| s.kind);
        if snippets.is_empty() {
            tracing::debug!("no classified evidence; skipping collaborator");
            return None;
        }

        let request = UnderstandingRequest::new(&self.config.llm, snippets);
        let limit = Duration::from_secs(self.config.llm.timeout_secs);
        let outcome = match tokio::time::timeout(limit, collaborator.understand(&request)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("timed out after {}s", limit.as_secs())),
        };

        match outcome {
            Ok(mut report) => {
                report.clamp_quantities(tallies, &self.config.reconcile);
                let _ = event_tx
                    .send(TakeoffEvent::CollaboratorComplete {
                        entries: report.entries.len(),
                    })
                    .await;
                Some(report)
            }
            Err(reason) => {
                tracing::warn!("document understanding unavailable: {}", reason);
                warnings.push(format!("qualitative pass skipped: {}", reason));
                let _ = event_tx
                    .send(TakeoffEvent::CollaboratorDegraded { reason })
                    .await;
                None
            }
        }
    }
}

/// Confidence score from which independent sources agree.
fn source_confidence(tally: CodeTally) -> f32 {
    let plan_evidence = tally.verify_qty > 0 || tally.text_qty > 0;
    match (tally.primary_qty > 0, plan_evidence) {
        (true, true) => 0.9,
        (true, false) => 0.55,
        (false, true) if tally.verify_qty > 0 && tally.text_qty > 0 => 0.6,
        _ => 0.35,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_confidence() {
        let t = |text_qty, primary_qty, verify_qty| {
            source_confidence(CodeTally {
                text_qty,
                primary_qty,
                verify_qty,
            })
        };
        assert_eq!(t(1, 4, 3), 0.9);
        assert_eq!(t(0, 4, 0), 0.55);
        assert_eq!(t(2, 0, 3), 0.6);
        assert_eq!(t(0, 0, 3), 0.35);
    }
}
