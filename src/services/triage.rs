//! Document triage: decide which files in a bid folder are worth the
//! expensive per-page work.
//!
//! Folders routinely hold hundreds of PDFs. Filenames are scored by
//! keyword families, ranked, and the top slice is kept.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::TriageConfig;
use crate::models::Document;

/// Keyword families and their weights, evaluated against a normalized
/// (lowercase, punctuation-as-space) filename. Each family scores once.
static FILENAME_WEIGHTS: LazyLock<Vec<(Regex, u32)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"schedule|\bsched\b|legend|exhibit").unwrap(), 50),
        (
            Regex::new(r"signage|\bsigns?\b|\bada\b|tactile|wayfinding|braille").unwrap(),
            30,
        ),
        (
            Regex::new(
                r"\bspecs?\b|specification|project manual|\bdiv(ision)? ?10\b|\b10 ?14 ?\d{2}\b",
            )
            .unwrap(),
            20,
        ),
        (Regex::new(r"\baddend|\brfi\b").unwrap(), 10),
        (Regex::new(r"\b[a-z]{1,2} ?\d{1,3}\b").unwrap(), 5),
    ]
});

/// A document with its triage score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredDocument {
    pub id: String,
    pub filename: String,
    pub score: u32,
}

/// Outcome of triaging one job's documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriageResult {
    pub job_id: String,
    /// Maximum number of documents selected.
    pub cap: usize,
    /// Selected documents, highest score first.
    pub selected: Vec<ScoredDocument>,
    /// True when nothing scored and the first documents were taken instead.
    pub fallback: bool,
}

impl TriageResult {
    pub fn selected_ids(&self) -> Vec<&str> {
        self.selected.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|d| d.id == id)
    }
}

fn normalize_filename(filename: &str) -> String {
    filename
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect()
}

/// Score a filename by keyword family.
pub fn score_filename(filename: &str) -> u32 {
    let normalized = normalize_filename(filename);
    FILENAME_WEIGHTS
        .iter()
        .filter(|(pattern, _)| pattern.is_match(&normalized))
        .map(|(_, weight)| weight)
        .sum()
}

/// Selection cap for a folder of `n` documents.
pub fn selection_cap(n: usize, config: &TriageConfig) -> usize {
    let raw = (config.fraction * n as f64).ceil().max(0.0) as usize;
    raw.max(config.min_docs).min(config.max_docs)
}

/// Rank documents and keep the ones worth processing.
pub fn triage(job_id: &str, documents: &[Document], config: &TriageConfig) -> TriageResult {
    let cap = selection_cap(documents.len(), config);

    let mut scored: Vec<ScoredDocument> = documents
        .iter()
        .map(|doc| ScoredDocument {
            id: doc.id.clone(),
            filename: doc.filename.clone(),
            score: score_filename(&doc.filename),
        })
        .collect();

    // Stable: equal scores keep caller order.
    scored.sort_by(|a, b| b.score.cmp(&a.score));

    let selected: Vec<ScoredDocument> = scored
        .iter()
        .filter(|d| d.score > 0)
        .take(cap)
        .cloned()
        .collect();

    if !selected.is_empty() || documents.is_empty() {
        tracing::info!(
            "triage {}: selected {} of {} documents (cap {})",
            job_id,
            selected.len(),
            documents.len(),
            cap
        );
        return TriageResult {
            job_id: job_id.to_string(),
            cap,
            selected,
            fallback: false,
        };
    }

    let take = documents.len().min(config.min_docs);
    tracing::info!(
        "triage {}: no filename matched, falling back to first {} documents",
        job_id,
        take
    );
    TriageResult {
        job_id: job_id.to_string(),
        cap,
        selected: documents
            .iter()
            .take(take)
            .map(|doc| ScoredDocument {
                id: doc.id.clone(),
                filename: doc.filename.clone(),
                score: 0,
            })
            .collect(),
        fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn docs(names: &[&str]) -> Vec<Document> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Document::new(format!("d{}", i), *n, PathBuf::from(n)))
            .collect()
    }

    #[test]
    fn test_score_filename() {
        assert_eq!(score_filename("Signage Schedule.pdf"), 80);
        assert_eq!(score_filename("ADA_Tactile_Signs.pdf"), 30);
        assert_eq!(score_filename("Division-10 Specifications.pdf"), 20);
        assert_eq!(score_filename("Addendum 2.pdf"), 10);
        assert_eq!(score_filename("A1.pdf"), 5);
        assert_eq!(score_filename("S2 Framing.pdf"), 5);
        assert_eq!(score_filename("geotechnical report.pdf"), 0);
        assert_eq!(score_filename("canada_geese.pdf"), 0);
    }

    #[test]
    fn test_selection_cap() {
        let config = TriageConfig::default();
        assert_eq!(selection_cap(0, &config), 8);
        assert_eq!(selection_cap(10, &config), 8);
        assert_eq!(selection_cap(100, &config), 12);
        assert_eq!(selection_cap(101, &config), 13);
        assert_eq!(selection_cap(1000, &config), 25);
    }

    #[test]
    fn test_ranks_by_score() {
        let documents = docs(&[
            "geotech.pdf",
            "A101.pdf",
            "Sign Legend.pdf",
            "Addendum 1.pdf",
            "Door Schedule.pdf",
        ]);
        let result = triage("job", &documents, &TriageConfig::default());
        assert!(!result.fallback);
        assert_eq!(result.selected_ids(), vec!["d2", "d4", "d3", "d1"]);
        assert!(!result.is_selected("d0"));
    }

    #[test]
    fn test_cap_bounds_selection() {
        let names: Vec<String> = (0..300).map(|i| format!("Sign Schedule {}.pdf", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let result = triage("job", &docs(&refs), &TriageConfig::default());
        assert_eq!(result.cap, 25);
        assert_eq!(result.selected.len(), 25);
    }

    #[test]
    fn test_fallback_when_nothing_scores() {
        let names: Vec<String> = (0..20).map(|i| format!("scan_{:03}.pdf", i * 1000)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let documents = docs(&refs);
        let result = triage("job", &documents, &TriageConfig::default());
        assert!(result.fallback);
        assert_eq!(result.selected.len(), 8);
        assert_eq!(result.selected[0].id, "d0");
    }

    #[test]
    fn test_empty_input() {
        let result = triage("job", &[], &TriageConfig::default());
        assert!(result.selected.is_empty());
        assert!(!result.fallback);
    }

    #[test]
    fn test_idempotent() {
        let documents = docs(&["A2.pdf", "Legend.pdf", "RFI 12.pdf", "misc.pdf"]);
        let a = triage("job", &documents, &TriageConfig::default());
        let b = triage("job", &documents, &TriageConfig::default());
        assert_eq!(a, b);
    }
}
