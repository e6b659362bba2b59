//! Parsing of collaborator responses.
//!
//! Models wrap their JSON in prose or code fences and drift from the schema,
//! so parsing is lenient: the first balanced `{...}` block is taken and
//! every field is optional.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ReconcileConfig;
use crate::models::RawLineItem;
use crate::ocr::matching_form;
use crate::services::export::{normalize_quantity_range, TBD};
use crate::services::reconcile::{reconcile_counts, CodeTally};

use super::client::CollaboratorError;

static LEADING_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)(?:\s*to\s*(\d+))?(.*)$").unwrap());

/// Find the first balanced JSON object in `text`, skipping braces inside
/// string literals.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// One item reported by the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub category: String,
    pub description: String,
    pub code: Option<String>,
    pub pages: Vec<u32>,
    /// "4", "4 to 6", "TBD".
    pub estimated_qty: String,
    pub unit: String,
    pub notes: String,
    pub sheet_reference: Option<String>,
    pub confidence: f32,
}

/// Qualitative findings returned by the collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualitativeReport {
    pub entries: Vec<ReportEntry>,
    pub discrepancy_log: Vec<String>,
    pub missing_items: Vec<String>,
    pub review_flags: Vec<String>,
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireReport {
    entries: Vec<WireEntry>,
    #[serde(alias = "discrepancy_log")]
    discrepancy_log: Vec<Value>,
    #[serde(alias = "missing_items")]
    missing_items: Vec<Value>,
    #[serde(alias = "review_flags")]
    review_flags: Vec<Value>,
    notes: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireEntry {
    category: String,
    description: String,
    code: Option<String>,
    pages: Vec<Value>,
    #[serde(alias = "estimated_qty", alias = "quantity", alias = "qty")]
    estimated_qty: Value,
    unit: String,
    notes: String,
    #[serde(alias = "sheet_reference", alias = "sheetRef")]
    sheet_reference: Option<String>,
    confidence: Value,
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn value_page(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_confidence(value: &Value) -> f32 {
    match value {
        Value::Number(n) => n.as_f64().map_or(0.5, |f| f.clamp(0.0, 1.0) as f32),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "high" => 0.9,
            "medium" => 0.65,
            "low" => 0.3,
            other => other.parse::<f32>().map_or(0.5, |f| f.clamp(0.0, 1.0)),
        },
        _ => 0.5,
    }
}

impl From<WireEntry> for ReportEntry {
    fn from(wire: WireEntry) -> Self {
        let qty = value_text(&wire.estimated_qty);
        Self {
            category: wire.category.trim().to_string(),
            description: wire.description.trim().to_string(),
            code: wire
                .code
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            pages: wire.pages.iter().filter_map(value_page).collect(),
            estimated_qty: if qty.is_empty() {
                TBD.to_string()
            } else {
                normalize_quantity_range(&qty)
            },
            unit: wire.unit.trim().to_string(),
            notes: wire.notes.trim().to_string(),
            sheet_reference: wire.sheet_reference.filter(|s| !s.trim().is_empty()),
            confidence: value_confidence(&wire.confidence),
        }
    }
}

/// Parse a raw collaborator reply.
pub fn parse_report(text: &str) -> Result<QualitativeReport, CollaboratorError> {
    let block = extract_json_block(text).ok_or_else(|| {
        CollaboratorError::MalformedResponse("no JSON object in response".to_string())
    })?;
    let wire: WireReport = serde_json::from_str(block)
        .map_err(|e| CollaboratorError::MalformedResponse(e.to_string()))?;

    let strings = |values: Vec<Value>| -> Vec<String> {
        values
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect()
    };

    Ok(QualitativeReport {
        entries: wire
            .entries
            .into_iter()
            .map(ReportEntry::from)
            .filter(|e| !e.category.is_empty() || !e.description.is_empty())
            .collect(),
        discrepancy_log: strings(wire.discrepancy_log),
        missing_items: strings(wire.missing_items),
        review_flags: strings(wire.review_flags),
        notes: value_text(&wire.notes),
    })
}

/// Pass a reported quantity through the same reconciliation as the
/// deterministic counts, treating it as the text estimate.
fn clamp_quantity(qty: &str, tally: CodeTally, config: &ReconcileConfig) -> String {
    let Some(caps) = LEADING_RANGE.captures(qty) else {
        return qty.to_string();
    };
    let clamp = |m: Option<regex::Match>| -> Option<u32> {
        let n: u32 = m?.as_str().parse().ok()?;
        Some(reconcile_counts(n, tally.primary_qty, tally.verify_qty, config))
    };
    let Some(lo) = clamp(caps.get(1)) else {
        return qty.to_string();
    };
    let hi = clamp(caps.get(2)).unwrap_or(lo);
    let rest = caps.get(3).map_or("", |m| m.as_str());

    let (lo, hi) = (lo.min(hi), lo.max(hi));
    if lo == hi {
        format!("{}{}", lo, rest)
    } else {
        format!("{} to {}{}", lo, hi, rest)
    }
}

impl QualitativeReport {
    /// Clamp every reported quantity against the deterministic tallies.
    /// Entries without a known code are clamped against empty tallies.
    pub fn clamp_quantities(
        &mut self,
        tallies: &BTreeMap<String, CodeTally>,
        config: &ReconcileConfig,
    ) {
        for entry in &mut self.entries {
            let tally = entry
                .code
                .as_deref()
                .and_then(|code| tallies.get(&matching_form(code)))
                .copied()
                .unwrap_or_default();
            entry.estimated_qty = clamp_quantity(&entry.estimated_qty, tally, config);
        }
    }

    /// Convert entries into raw line items for aggregation.
    pub fn to_raw_items(&self, file_path: Option<&str>) -> Vec<RawLineItem> {
        self.entries
            .iter()
            .map(|entry| RawLineItem {
                category: entry.category.clone(),
                description: match &entry.code {
                    Some(code) if !entry.description.contains(code.as_str()) => {
                        format!("{} ({})", entry.description, code)
                    }
                    _ => entry.description.clone(),
                },
                pages: entry.pages.clone(),
                estimated_qty: entry.estimated_qty.clone(),
                unit: if entry.unit.is_empty() {
                    "EA".to_string()
                } else {
                    entry.unit.clone()
                },
                notes: entry.notes.clone(),
                sheet_reference: entry.sheet_reference.clone(),
                file_paths: file_path.map(str::to_string).into_iter().collect(),
                confidence: entry.confidence,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_block() {
        assert_eq!(extract_json_block("Sure! {\"a\": 1} done"), Some("{\"a\": 1}"));
        assert_eq!(
            extract_json_block("```json\n{\"a\": {\"b\": \"}{\"}}\n```"),
            Some("{\"a\": {\"b\": \"}{\"}}")
        );
        assert_eq!(
            extract_json_block(r#"x {"q": "say \"hi\" }"} y"#),
            Some(r#"{"q": "say \"hi\" }"}"#)
        );
        assert_eq!(extract_json_block("no json"), None);
        assert_eq!(extract_json_block("{ unterminated"), None);
    }

    #[test]
    fn test_parse_report_with_prose() {
        let text = r#"Here is the takeoff:
{
  "entries": [
    {"category": "Signage", "description": "Exit sign", "code": "D7",
     "pages": [1, "2", "A1"], "estimatedQty": 12, "unit": "EA", "confidence": "high"},
    {"category": "Doors", "description": "Door type 3", "estimated_qty": "4-6"},
    {}
  ],
  "discrepancyLog": ["schedule says 4, plan shows 6", {"page": 3}],
  "reviewFlags": [],
  "notes": "partial set"
}
Let me know if you need more."#;
        let report = parse_report(text).unwrap();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].pages, vec![1, 2]);
        assert_eq!(report.entries[0].estimated_qty, "12");
        assert_eq!(report.entries[0].confidence, 0.9);
        assert_eq!(report.entries[1].estimated_qty, "4 to 6");
        assert_eq!(report.entries[1].confidence, 0.5);
        assert_eq!(report.discrepancy_log.len(), 2);
        assert_eq!(report.notes, "partial set");
    }

    #[test]
    fn test_parse_report_malformed() {
        assert!(matches!(
            parse_report("I could not find anything."),
            Err(CollaboratorError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_report("{\"entries\": 5}"),
            Err(CollaboratorError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_clamp_quantities() {
        let mut report = parse_report(
            r#"{"entries": [
                {"category": "Signage", "description": "Exit", "code": "d7", "estimatedQty": "12 EA"},
                {"category": "Signage", "description": "Room ID", "code": "WS-01", "estimatedQty": "2 to 9"},
                {"category": "Doors", "description": "Other", "estimatedQty": "TBD"}
            ]}"#,
        )
        .unwrap();

        let mut tallies = BTreeMap::new();
        tallies.insert("D7".to_string(), CodeTally { text_qty: 1, primary_qty: 4, verify_qty: 3 });
        tallies.insert("WS-01".to_string(), CodeTally { text_qty: 0, primary_qty: 5, verify_qty: 0 });

        report.clamp_quantities(&tallies, &ReconcileConfig::default());
        assert_eq!(report.entries[0].estimated_qty, "4 EA");
        assert_eq!(report.entries[1].estimated_qty, "2 to 5");
        assert_eq!(report.entries[2].estimated_qty, "TBD");
    }

    #[test]
    fn test_to_raw_items() {
        let report = parse_report(
            r#"{"entries": [{"category": "Signage", "description": "Exit sign", "code": "D7", "estimatedQty": 3}]}"#,
        )
        .unwrap();
        let items = report.to_raw_items(Some("plans.pdf"));
        assert_eq!(items[0].description, "Exit sign (D7)");
        assert_eq!(items[0].unit, "EA");
        assert_eq!(items[0].file_paths, vec!["plans.pdf".to_string()]);
    }
}
