//! Line-item aggregation and export rendering.
//!
//! Quantity ranges are always written as "X to Y". Spreadsheet imports read
//! "4-6" as a date.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{EqualQuantityPolicy, ExportConfig};
use crate::models::{Confidence, RawLineItem, TakeoffLineItem};
use crate::ocr::normalize_dashes;

/// Placeholder for an unknown quantity.
pub const TBD: &str = "TBD";

static HYPHEN_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\s*-\s*(\d+)\b").unwrap());

static RANGE_BOUNDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*(?:to\s*(\d+))?\s*(\+)?").unwrap());

/// Export output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

/// Rewrite "X-Y" ranges as "X to Y".
pub fn normalize_quantity_range(qty: &str) -> String {
    HYPHEN_RANGE
        .replace_all(&normalize_dashes(qty), "$1 to $2")
        .into_owned()
}

fn leading_integer(entry: &str) -> Option<u32> {
    let digits: String = entry
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn render_bounds(min: u32, max: u32, open_ended: bool) -> String {
    if min == max {
        if open_ended {
            format!("{}+", min)
        } else {
            min.to_string()
        }
    } else {
        format!("{} to {}", min, max)
    }
}

/// Merge a group's raw quantity strings into one.
///
/// Entries are read by their leading integer. "TBD" and blank entries are
/// ignored but mark the result open-ended ("4+"). With no numbers at all
/// the result is "TBD". Under [`EqualQuantityPolicy::Sum`] several equal
/// values add up (5 and 5 give 10); under `Confirm` they stand as one.
pub fn combine_quantities<S: AsRef<str>>(entries: &[S], policy: EqualQuantityPolicy) -> String {
    let mut values = Vec::new();
    let mut saw_unknown = false;
    for entry in entries {
        let entry = entry.as_ref().trim();
        if entry.is_empty() || entry.eq_ignore_ascii_case(TBD) {
            saw_unknown = true;
            continue;
        }
        if let Some(n) = leading_integer(entry) {
            values.push(n);
        }
    }

    let (Some(&min), Some(&max)) = (values.iter().min(), values.iter().max()) else {
        return TBD.to_string();
    };

    if min == max {
        let value = match policy {
            EqualQuantityPolicy::Sum => values.iter().fold(0u32, |acc, v| acc.saturating_add(*v)),
            EqualQuantityPolicy::Confirm => min,
        };
        return render_bounds(value, value, saw_unknown);
    }
    render_bounds(min, max, false)
}

/// Parse an already-combined quantity ("4", "4+", "4 to 6").
fn quantity_bounds(qty: &str) -> Option<(u32, u32, bool)> {
    let normalized = normalize_quantity_range(qty);
    let caps = RANGE_BOUNDS.captures(&normalized)?;
    let lo: u32 = caps.get(1)?.as_str().parse().ok()?;
    let hi: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => lo,
    };
    Some((lo.min(hi), lo.max(hi), caps.get(3).is_some()))
}

fn push_distinct(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[derive(Default)]
struct Group {
    descriptions: Vec<String>,
    pages: BTreeSet<u32>,
    sheet_refs: Vec<String>,
    file_paths: Vec<String>,
    quantities: Vec<String>,
    units: Vec<String>,
    notes: Vec<String>,
    confidence: f32,
}

/// Group raw items by category, in first-seen order.
pub fn aggregate(items: &[RawLineItem], config: &ExportConfig) -> Vec<TakeoffLineItem> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();

    for item in items {
        let group = groups.entry(item.category.clone()).or_insert_with(|| {
            order.push(item.category.clone());
            Group::default()
        });
        push_distinct(&mut group.descriptions, &item.description);
        group.pages.extend(item.pages.iter().copied());
        if let Some(sheet) = &item.sheet_reference {
            push_distinct(&mut group.sheet_refs, sheet);
        }
        for path in &item.file_paths {
            push_distinct(&mut group.file_paths, path);
        }
        group.quantities.push(item.estimated_qty.clone());
        push_distinct(&mut group.units, &item.unit);
        push_distinct(&mut group.notes, &item.notes);
        group.confidence = group.confidence.max(item.confidence);
    }

    order
        .into_iter()
        .filter_map(|category| {
            let group = groups.remove(&category)?;
            Some(TakeoffLineItem {
                description: group.descriptions.join("; "),
                pages: group.pages.into_iter().take(config.page_cap).collect(),
                estimated_qty: combine_quantities(&group.quantities, config.equal_quantities),
                unit: group.units.first().cloned().unwrap_or_else(|| "EA".to_string()),
                notes: group.notes.join("; "),
                file_paths: group.file_paths,
                sheet_reference: group.sheet_refs.join(", "),
                confidence: Confidence::from_score(group.confidence),
                category,
            })
        })
        .collect()
}

/// Merge rows from several documents. Rows of the same category have their
/// pages unioned (capped), quantities widened to cover both, and the higher
/// confidence kept.
pub fn merge_across_documents<I>(rows: I, page_cap: usize) -> Vec<TakeoffLineItem>
where
    I: IntoIterator<Item = TakeoffLineItem>,
{
    let mut merged: Vec<TakeoffLineItem> = Vec::new();
    for row in rows {
        let Some(existing) = merged.iter_mut().find(|m| m.category == row.category) else {
            merged.push(row);
            continue;
        };

        let mut descriptions: Vec<String> = existing
            .description
            .split("; ")
            .map(str::to_string)
            .collect();
        for d in row.description.split("; ") {
            push_distinct(&mut descriptions, d);
        }
        existing.description = descriptions.join("; ");

        let pages: BTreeSet<u32> = existing.pages.iter().chain(row.pages.iter()).copied().collect();
        existing.pages = pages.into_iter().take(page_cap).collect();

        existing.estimated_qty = widen_quantity(&existing.estimated_qty, &row.estimated_qty);

        for path in &row.file_paths {
            push_distinct(&mut existing.file_paths, path);
        }
        let mut sheets: Vec<String> = existing
            .sheet_reference
            .split(", ")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        for s in row.sheet_reference.split(", ") {
            push_distinct(&mut sheets, s);
        }
        existing.sheet_reference = sheets.join(", ");

        if !row.notes.is_empty() && !existing.notes.contains(&row.notes) {
            if !existing.notes.is_empty() {
                existing.notes.push_str("; ");
            }
            existing.notes.push_str(&row.notes);
        }
        existing.confidence = existing.confidence.max(row.confidence);
    }
    merged
}

fn widen_quantity(a: &str, b: &str) -> String {
    match (quantity_bounds(a), quantity_bounds(b)) {
        (Some((lo_a, hi_a, open_a)), Some((lo_b, hi_b, open_b))) => {
            render_bounds(lo_a.min(lo_b), hi_a.max(hi_b), open_a || open_b)
        }
        (Some((lo, hi, _)), None) | (None, Some((lo, hi, _))) => render_bounds(lo, hi, true),
        (None, None) => TBD.to_string(),
    }
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn join_pages(pages: &[u32]) -> String {
    pages
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// CSV header for the configured column set.
pub fn csv_header(include_file_path: bool) -> Vec<&'static str> {
    let mut header = vec!["Category", "Description", "Pages", "Est Qty", "Unit", "Notes"];
    if include_file_path {
        header.push("File Path");
    }
    header.extend(["Sheet Ref", "Confidence"]);
    header
}

/// Render rows as CSV with a fixed header.
pub fn render_csv(rows: &[TakeoffLineItem], include_file_path: bool) -> String {
    let mut output = String::new();
    writeln!(output, "{}", csv_header(include_file_path).join(",")).ok();

    for row in rows {
        let mut fields = vec![
            escape_csv(&row.category),
            escape_csv(&row.description),
            escape_csv(&join_pages(&row.pages)),
            escape_csv(&normalize_quantity_range(&row.estimated_qty)),
            escape_csv(&row.unit),
            escape_csv(&row.notes),
        ];
        if include_file_path {
            fields.push(escape_csv(&row.file_paths.join("; ")));
        }
        fields.push(escape_csv(&row.sheet_reference));
        fields.push(row.confidence.as_str().to_string());
        writeln!(output, "{}", fields.join(",")).ok();
    }
    output
}

/// Render rows as pretty JSON, ranges normalized.
pub fn render_json(rows: &[TakeoffLineItem]) -> serde_json::Result<String> {
    let normalized: Vec<TakeoffLineItem> = rows
        .iter()
        .cloned()
        .map(|mut row| {
            row.estimated_qty = normalize_quantity_range(&row.estimated_qty);
            row
        })
        .collect();
    serde_json::to_string_pretty(&normalized)
}

/// Render rows in the requested format.
pub fn render(
    rows: &[TakeoffLineItem],
    format: ExportFormat,
    config: &ExportConfig,
) -> serde_json::Result<String> {
    match format {
        ExportFormat::Csv => Ok(render_csv(rows, config.include_file_path)),
        ExportFormat::Json => render_json(rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combine(list: &[&str]) -> String {
        combine_quantities(list, EqualQuantityPolicy::Sum)
    }

    fn raw(category: &str, description: &str, pages: &[u32], qty: &str, confidence: f32) -> RawLineItem {
        RawLineItem {
            category: category.to_string(),
            description: description.to_string(),
            pages: pages.to_vec(),
            estimated_qty: qty.to_string(),
            unit: "EA".to_string(),
            notes: String::new(),
            sheet_reference: Some("A1.01".to_string()),
            file_paths: vec!["plans.pdf".to_string()],
            confidence,
        }
    }

    #[test]
    fn test_combine_quantities() {
        assert_eq!(combine(&["5", "7"]), "5 to 7");
        assert_eq!(combine(&["TBD"]), "TBD");
        assert_eq!(combine(&[]), "TBD");
        assert_eq!(combine(&["", "tbd"]), "TBD");
        assert_eq!(combine(&["4"]), "4");
        assert_eq!(combine(&["4", "TBD"]), "4+");
        assert_eq!(combine(&["12 EA", "3"]), "3 to 12");
        assert_eq!(combine(&["7", "5", "TBD"]), "5 to 7");
    }

    #[test]
    fn test_equal_quantity_policy() {
        assert_eq!(combine(&["5", "5"]), "10");
        assert_eq!(combine_quantities(&["5", "5"], EqualQuantityPolicy::Confirm), "5");
    }

    #[test]
    fn test_normalize_quantity_range() {
        assert_eq!(normalize_quantity_range("4-6"), "4 to 6");
        assert_eq!(normalize_quantity_range("4 \u{2013} 6 EA"), "4 to 6 EA");
        assert_eq!(normalize_quantity_range("4 to 6"), "4 to 6");
        assert_eq!(normalize_quantity_range("WS-01"), "WS-01");
    }

    #[test]
    fn test_aggregate_groups_by_category() {
        let items = vec![
            raw("Signage", "Type D7", &[2, 1], "4", 0.9),
            raw("Doors", "Type 101", &[3], "2", 0.4),
            raw("Signage", "Type WS-01", &[2, 5], "6", 0.6),
        ];
        let rows = aggregate(&items, &ExportConfig::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category, "Signage");
        assert_eq!(rows[0].description, "Type D7; Type WS-01");
        assert_eq!(rows[0].pages, vec![1, 2, 5]);
        assert_eq!(rows[0].estimated_qty, "4 to 6");
        assert_eq!(rows[0].confidence, Confidence::High);
        assert_eq!(rows[0].sheet_reference, "A1.01");
        assert_eq!(rows[1].confidence, Confidence::Low);
    }

    #[test]
    fn test_aggregate_page_cap() {
        let pages: Vec<u32> = (1..=30).collect();
        let rows = aggregate(&[raw("Signage", "x", &pages, "1", 0.5)], &ExportConfig::default());
        assert_eq!(rows[0].pages.len(), 10);
    }

    #[test]
    fn test_merge_across_documents() {
        let config = ExportConfig::default();
        let a = aggregate(&[raw("Signage", "Type D7", &[1, 2], "4", 0.55)], &config);
        let b = aggregate(&[raw("Signage", "Type D8", &[2, 9], "6+", 0.85)], &config);
        let merged = merge_across_documents(a.into_iter().chain(b), 3);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].pages, vec![1, 2, 9]);
        assert_eq!(merged[0].estimated_qty, "4 to 6");
        assert_eq!(merged[0].confidence, Confidence::High);
        assert_eq!(merged[0].description, "Type D7; Type D8");
    }

    #[test]
    fn test_render_csv() {
        let mut rows = aggregate(&[raw("Signage", "Type D7, exit", &[1, 2], "4", 0.9)], &ExportConfig::default());
        rows[0].estimated_qty = "4-6".to_string();

        let csv = render_csv(&rows, false);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("Category,Description,Pages,Est Qty,Unit,Notes,Sheet Ref,Confidence")
        );
        assert_eq!(lines.next(), Some("Signage,\"Type D7, exit\",\"1, 2\",4 to 6,EA,,A1.01,High"));

        let with_path = render_csv(&rows, true);
        assert!(with_path.starts_with("Category,Description,Pages,Est Qty,Unit,Notes,File Path,Sheet Ref,Confidence"));
        assert!(with_path.contains(",plans.pdf,"));
    }

    #[test]
    fn test_render_json() {
        let mut rows = aggregate(&[raw("Signage", "Type D7", &[1], "4", 0.9)], &ExportConfig::default());
        rows[0].estimated_qty = "2-3".to_string();
        let json = render_json(&rows).unwrap();
        let parsed: Vec<TakeoffLineItem> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].estimated_qty, "2 to 3");
    }
}
