//! Evidence classification, snippet selection, sheet references and
//! category inference.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::SnippetConfig;
use crate::models::{EvidenceKind, EvidenceSnippet};
use crate::ocr::{collapse_whitespace, matching_form, truncate_chars};

use super::codes::has_code_shape;

/// Page classifiers in priority order. First match wins.
static KIND_PATTERNS: LazyLock<Vec<(Regex, EvidenceKind)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"\bSCHEDULES?\b|\bSCHED\b").unwrap(),
            EvidenceKind::Schedule,
        ),
        (
            Regex::new(r"\bLEGEND\b|\bSYMBOLS?\s+(LIST|KEY)\b").unwrap(),
            EvidenceKind::Legend,
        ),
        (
            Regex::new(
                r"\bEGRESS\b|\bEXIT\s+(SIGNS?|ACCESS|DISCHARGE|ROUTE|PLAN)\b|\bOCCUPANT\s+LOAD\b|\bLIFE\s+SAFETY\b",
            )
            .unwrap(),
            EvidenceKind::Egress,
        ),
        (
            Regex::new(r"\bKEY\s?NOTES?\b|\bSHEET\s+NOTES\b|\bGENERAL\s+NOTES\b").unwrap(),
            EvidenceKind::Keynote,
        ),
        (
            Regex::new(
                r"\b(IBC|NFPA|CBC|ICC|ANSI\s*A117(\.1)?)\b|\bBUILDING\s+CODE\b|\bCODE\s+(ANALYSIS|SUMMARY|REVIEW)\b|\bADA\s+STANDARDS\b",
            )
            .unwrap(),
            EvidenceKind::Code,
        ),
        (
            Regex::new(r"\bPLANS?\b|\bELEVATIONS?\b|\bSCALE\s*:").unwrap(),
            EvidenceKind::Plan,
        ),
    ]
});

static QTY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(QTY|QUANTITY|COUNT|EA|EACH)\b|\bNO\.").unwrap());

static DOMAIN_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(SIGNS?|SIGNAGE|EXIT|EGRESS|ADA|TACTILE)\b").unwrap());

static SHEET_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bSHEET\s*(?:NO\.?|NUMBER|#)?\s*:?\s*([A-Z]{1,2}-?\d{1,3}(?:\.\d{1,2})?)\b").unwrap()
});

static TITLE_BLOCK_SHEET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{1,2}-?\d{1,2}\.\d{1,2}|[A-Z]-?\d{3})\b").unwrap()
});

/// Line-item categories in priority order.
static CATEGORY_KEYWORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"\b(SIGNS?|SIGNAGE|TACTILE|BRAILLE|ADA|PLAQUES?|WAYFINDING|PICTOGRAMS?)\b")
                .unwrap(),
            "Signage",
        ),
        (
            Regex::new(r"\b(EXITS?|EGRESS|EVACUATION|EMERGENCY)\b").unwrap(),
            "Egress",
        ),
        (
            Regex::new(r"\b(DOORS?|FRAMES?|HARDWARE)\b").unwrap(),
            "Doors",
        ),
        (
            Regex::new(
                r"\b(PLUMBING|LAVATOR(Y|IES)|LAV|WATER\s+CLOSETS?|WC|URINALS?|SINKS?|DRINKING\s+FOUNTAINS?)\b",
            )
            .unwrap(),
            "Plumbing Fixtures",
        ),
        (
            Regex::new(
                r"\b(ELECTRICAL|RECEPTACLES?|LUMINAIRES?|LIGHTING|LIGHTS?|PANELS?|SWITCH(ES)?|OUTLETS?)\b",
            )
            .unwrap(),
            "Electrical",
        ),
    ]
});

/// Fallback category when nothing in the context is recognized.
pub const DEFAULT_CATEGORY: &str = "Type Codes";

/// Minimum length of a line considered for snippets.
const MIN_SNIPPET_LINE: usize = 8;

/// Classify a page by its text.
pub fn classify_page(text: &str) -> EvidenceKind {
    let normalized = matching_form(text);
    KIND_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&normalized))
        .map(|(_, kind)| *kind)
        .unwrap_or(EvidenceKind::Unknown)
}

/// Score one line for snippet selection.
pub fn score_line(line: &str) -> u32 {
    let normalized = matching_form(line);
    let mut score = 0;
    if QTY_TOKEN.is_match(&normalized) {
        score += 3;
    }
    if has_code_shape(line) {
        score += 3;
    }
    if DOMAIN_KEYWORD.is_match(&normalized) {
        score += 2;
    }
    if line.chars().count() > 80 {
        score += 1;
    }
    score
}

/// Pick the densest lines of a classified page.
pub fn select_snippets(
    filename: &str,
    page: u32,
    kind: EvidenceKind,
    text: &str,
    config: &SnippetConfig,
) -> Vec<EvidenceSnippet> {
    let mut seen = HashSet::new();
    let mut candidates: Vec<(u32, String)> = text
        .lines()
        .map(collapse_whitespace)
        .filter(|line| line.chars().count() >= MIN_SNIPPET_LINE)
        .filter(|line| seen.insert(line.clone()))
        .map(|line| (score_line(&line), line))
        .collect();

    // Stable: ties keep page order.
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    candidates
        .into_iter()
        .take(config.per_page)
        .map(|(_, line)| EvidenceSnippet {
            filename: filename.to_string(),
            page,
            kind,
            text: truncate_chars(&line, config.max_chars).to_string(),
        })
        .collect()
}

/// Sheet number of a page, e.g. `A1.01` or `A-101`.
///
/// An explicit `SHEET` label wins; otherwise the last title-block style
/// number on the page is used, since title blocks sit at the end of the
/// extracted text.
pub fn detect_sheet_reference(text: &str) -> Option<String> {
    let normalized = matching_form(text);
    if let Some(caps) = SHEET_LABEL.captures(&normalized) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    TITLE_BLOCK_SHEET
        .find_iter(&normalized)
        .last()
        .map(|m| m.as_str().to_string())
}

/// Category for a code, inferred from the text around its occurrences.
pub fn infer_category(context: &str) -> &'static str {
    let normalized = matching_form(context);
    CATEGORY_KEYWORDS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&normalized))
        .map(|(_, category)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}
