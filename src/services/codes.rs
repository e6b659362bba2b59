//! Type-code discovery, placement extraction and per-code counting.
//!
//! Codes are short identifiers such as `D7`, `WS-01` or `EX-12` that tag
//! catalog items on drawings. Discovery only promotes a token after it has
//! recurred, which filters most one-off OCR noise. Placement matching is
//! exact on token boundaries; there is no fuzzy matching.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::DiscoveryConfig;
use crate::models::{CodeToken, OcrTile, PixelRect, Placement, PlacementMeta};
use crate::ocr::{collapse_whitespace, matching_form};

/// Characters of context kept on each side of a match for deduplication.
const LOCAL_CONTEXT_CHARS: usize = 24;

/// Method tag recorded on tile placements.
pub const TILE_OCR_METHOD: &str = "tile_ocr";

static CODE_FAMILIES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // hyphenated: WS-01, A1-2B, EX-D12
        Regex::new(r"\b[A-Z]{1,4}\d{0,3}-[A-Z]?\d{1,4}[A-Z]?\b").unwrap(),
        // compact: D7, S12, AB101C
        Regex::new(r"\b[A-Z]{1,2}\d{1,3}[A-Z]?\b").unwrap(),
        // prefixed-dash: EX-12, SGN-101
        Regex::new(r"\b[A-Z]{2,4}-\d{2,3}\b").unwrap(),
    ]
});

static SCHEDULE_QTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b(?:QTY|QUANTITY|COUNT)|\bNO\.)\s*[:=#]?\s*(\d{1,4})\b|\b(\d{1,4})\s*(?:EA|EACH)\b")
        .unwrap()
});

/// Byte spans of code-shaped tokens in already-normalized text. Identical
/// spans found by several families are kept once, and spans inside a longer
/// span are dropped.
fn code_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = CODE_FAMILIES
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.end())))
        .collect();
    spans.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)).then(a.0.cmp(&b.0)));
    spans.dedup();

    let mut kept: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for span in spans {
        if !kept.iter().any(|k| k.0 <= span.0 && span.1 <= k.1) {
            kept.push(span);
        }
    }
    kept.sort_unstable();
    kept
}

/// True if the text contains anything shaped like a type code.
pub fn has_code_shape(text: &str) -> bool {
    let normalized = matching_form(text);
    CODE_FAMILIES.iter().any(|re| re.is_match(&normalized))
}

/// Find recurring codes across a set of texts (tile OCR output and sparse
/// native text). Sorted by frequency, most common first, then by code.
pub fn discover_codes<'a, I>(texts: I, config: &DiscoveryConfig) -> Vec<CodeToken>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tally: HashMap<String, usize> = HashMap::new();
    for text in texts {
        let normalized = matching_form(text);
        for (start, end) in code_spans(&normalized) {
            *tally.entry(normalized[start..end].to_string()).or_insert(0) += 1;
        }
    }

    let mut codes: Vec<CodeToken> = tally
        .into_iter()
        .filter(|(_, n)| *n >= config.min_occurrences)
        .map(|(code, occurrences)| CodeToken { code, occurrences })
        .collect();
    codes.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then(a.code.cmp(&b.code)));
    codes.truncate(config.max_codes);
    codes
}

/// Exact token-boundary matcher for one code.
pub fn token_matcher(code: &str) -> Option<Regex> {
    match Regex::new(&format!(r"\b{}\b", regex::escape(&matching_form(code)))) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("cannot build matcher for code {:?}: {}", code, e);
            None
        }
    }
}

/// Clip `radius` characters either side of the byte span `start..end`.
fn clip_context(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let lo = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(start, |(i, _)| i);
    let hi = text[end..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(i, _)| end + i);
    &text[lo..hi]
}

/// Placements found in one scan.
#[derive(Debug, Clone, Default)]
pub struct PlacementScan {
    pub placements: Vec<Placement>,
    /// The placement cap was reached and matching stopped early.
    pub truncated: bool,
}

/// Locate every occurrence of every known code in the tiles.
///
/// Stops once `max_placements` have been collected; the accumulator is local
/// to the call.
pub fn extract_placements(
    tiles: &[OcrTile],
    codes: &[CodeToken],
    config: &DiscoveryConfig,
) -> PlacementScan {
    let matchers: Vec<(&str, Regex)> = codes
        .iter()
        .filter_map(|c| token_matcher(&c.code).map(|re| (c.code.as_str(), re)))
        .collect();

    let mut scan = PlacementScan::default();
    'tiles: for tile in tiles {
        if tile.text.is_empty() {
            continue;
        }
        let normalized = matching_form(&tile.text);
        for (code, re) in &matchers {
            for m in re.find_iter(&normalized) {
                if scan.placements.len() >= config.max_placements {
                    scan.truncated = true;
                    break 'tiles;
                }
                scan.placements.push(Placement {
                    code: code.to_string(),
                    page_number: tile.page_number,
                    evidence_text: collapse_whitespace(clip_context(
                        &normalized,
                        m.start(),
                        m.end(),
                        config.evidence_radius,
                    )),
                    local_context: collapse_whitespace(clip_context(
                        &normalized,
                        m.start(),
                        m.end(),
                        LOCAL_CONTEXT_CHARS,
                    )),
                    meta: PlacementMeta {
                        method: TILE_OCR_METHOD.to_string(),
                        row: tile.row,
                        col: tile.col,
                        rect: tile.rect,
                        dpi: tile.dpi,
                        overlap_px: tile.overlap_px,
                    },
                });
            }
        }
    }

    if scan.truncated {
        tracing::warn!(
            "placement cap of {} reached; remaining matches ignored",
            config.max_placements
        );
    }
    scan
}

/// Count placements per code, collapsing an occurrence seen through two
/// overlapping tiles into one.
///
/// Placements sharing code, page and local context are candidates for the
/// same occurrence. A match in one tile is folded into an earlier occurrence
/// only when every tile that already saw that occurrence overlaps it, so the
/// match can lie in their shared band. Within one tile each match counts.
pub fn verify_counts(placements: &[Placement]) -> BTreeMap<String, u32> {
    let mut per_tile: HashMap<(&str, u32, &str), BTreeMap<(u32, u32), (PixelRect, u32)>> =
        HashMap::new();
    for p in placements {
        per_tile
            .entry((p.code.as_str(), p.page_number, p.local_context.as_str()))
            .or_default()
            .entry((p.meta.row, p.meta.col))
            .or_insert((p.meta.rect, 0))
            .1 += 1;
    }

    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    for ((code, _, _), tiles) in per_tile {
        *counts.entry(code.to_string()).or_insert(0) += distinct_occurrences(&tiles);
    }
    counts
}

/// Greedy fold of per-tile match counts into physical occurrences.
fn distinct_occurrences(tiles: &BTreeMap<(u32, u32), (PixelRect, u32)>) -> u32 {
    // Each occurrence is the list of tiles it was seen through.
    let mut occurrences: Vec<Vec<((u32, u32), PixelRect)>> = Vec::new();
    for (&cell, &(rect, matches)) in tiles {
        for _ in 0..matches {
            let slot = occurrences
                .iter()
                .position(|seen| seen.iter().all(|(c, r)| *c != cell && r.intersects(&rect)));
            match slot {
                Some(i) => occurrences[i].push((cell, rect)),
                None => occurrences.push(vec![(cell, rect)]),
            }
        }
    }
    occurrences.len() as u32
}

/// Token-boundary occurrences of a code in a text.
pub fn count_occurrences(text: &str, matcher: &Regex) -> u32 {
    matcher.find_iter(&matching_form(text)).count() as u32
}

/// Largest quantity stated for a code on schedule lines, if any.
///
/// Only lines that mention the code as a token are considered. A quantity
/// follows `QTY`, `QUANTITY`, `COUNT` or `NO.`, or precedes `EA`/`EACH`.
pub fn schedule_quantity(text: &str, matcher: &Regex) -> Option<u32> {
    matching_form(text)
        .lines()
        .filter(|line| matcher.is_match(line))
        .flat_map(|line| {
            SCHEDULE_QTY
                .captures_iter(line)
                .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
                .filter_map(|m| m.as_str().parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(list: &[&str]) -> Vec<String> {
        discover_codes(list.iter().copied(), &DiscoveryConfig::default())
            .into_iter()
            .map(|c| c.code)
            .collect()
    }

    fn tile(page: u32, row: u32, col: u32, text: &str) -> OcrTile {
        OcrTile {
            page_number: page,
            row,
            col,
            dpi: 300,
            overlap_px: 20,
            rect: PixelRect { x: 0, y: 0, w: 100, h: 100 },
            text: text.to_string(),
        }
    }

    fn token(code: &str) -> CodeToken {
        CodeToken {
            code: code.to_string(),
            occurrences: 2,
        }
    }

    #[test]
    fn test_singletons_are_filtered() {
        assert_eq!(codes(&["D7 SIGN", "D7 TYPE", "XQ9Z stray"]), vec!["D7"]);
    }

    #[test]
    fn test_families_and_ordering() {
        let found = codes(&[
            "WS-01 at door, WS\u{2013}01 at stair",
            "ex-12 and EX-12 and EX-12",
            "S12 S12 / D7 D7",
        ]);
        assert_eq!(found, vec!["EX-12", "D7", "S12", "WS-01"]);
    }

    #[test]
    fn test_contained_spans_not_double_counted() {
        // "A1" inside "A1-2" should not count as a separate token.
        assert_eq!(codes(&["A1-2", "A1-2"]), vec!["A1-2"]);
    }

    #[test]
    fn test_max_codes_cap() {
        let text: String = (10..99).map(|i| format!("P{} P{} ", i, i)).collect();
        let config = DiscoveryConfig {
            max_codes: 5,
            ..Default::default()
        };
        assert_eq!(discover_codes([text.as_str()], &config).len(), 5);
    }

    #[test]
    fn test_exact_token_boundaries() {
        let tiles = vec![tile(1, 0, 0, "D7 D70 AD7 D7A (D7)")];
        let scan = extract_placements(&tiles, &[token("D7")], &DiscoveryConfig::default());
        assert_eq!(scan.placements.len(), 2);
        assert!(!scan.truncated);
        assert_eq!(scan.placements[0].meta.method, TILE_OCR_METHOD);
    }

    #[test]
    fn test_evidence_is_clipped() {
        let long = format!("{} D7 {}", "x ".repeat(200), "y ".repeat(200));
        let scan = extract_placements(
            &[tile(1, 0, 0, &long)],
            &[token("D7")],
            &DiscoveryConfig::default(),
        );
        let evidence = &scan.placements[0].evidence_text;
        assert!(evidence.contains("D7"));
        assert!(evidence.chars().count() <= 140 * 2 + 2);
    }

    #[test]
    fn test_placement_cap() {
        let text = "D7 ".repeat(50);
        let config = DiscoveryConfig {
            max_placements: 10,
            ..Default::default()
        };
        let scan = extract_placements(&[tile(1, 0, 0, &text)], &[token("D7")], &config);
        assert_eq!(scan.placements.len(), 10);
        assert!(scan.truncated);
    }

    #[test]
    fn test_overlap_duplicates_collapse() {
        let tiles = vec![
            tile(1, 0, 0, "STAIR 2 EXIT TYPE D7"),
            tile(1, 0, 1, "STAIR 2 EXIT TYPE D7"),
            tile(1, 1, 0, "CORRIDOR D7 AND D7"),
        ];
        let scan = extract_placements(&tiles, &[token("D7")], &DiscoveryConfig::default());
        assert_eq!(scan.placements.len(), 4);
        assert_eq!(verify_counts(&scan.placements).get("D7"), Some(&3));
    }

    fn tile_at(page: u32, row: u32, col: u32, rect: PixelRect, text: &str) -> OcrTile {
        OcrTile {
            rect,
            ..tile(page, row, col, text)
        }
    }

    #[test]
    fn test_same_context_in_separate_tiles_counts_twice() {
        let tiles = vec![
            tile_at(1, 0, 0, PixelRect { x: 0, y: 0, w: 1295, h: 1120 }, "D7"),
            tile_at(1, 2, 1, PixelRect { x: 1255, y: 2180, w: 1295, h: 1120 }, "D7"),
        ];
        let scan = extract_placements(&tiles, &[token("D7")], &DiscoveryConfig::default());
        assert_eq!(scan.placements.len(), 2);
        assert_eq!(verify_counts(&scan.placements).get("D7"), Some(&2));
    }

    #[test]
    fn test_overlap_chain_keeps_far_tiles_apart() {
        // Three tiles in a row: the middle one overlaps both neighbours, the
        // outer two do not touch. The middle tile sees one tag in its band.
        let tiles = vec![
            tile_at(1, 0, 0, PixelRect { x: 0, y: 0, w: 120, h: 100 }, "EXIT D7"),
            tile_at(1, 0, 1, PixelRect { x: 80, y: 0, w: 140, h: 100 }, "EXIT D7"),
            tile_at(1, 0, 2, PixelRect { x: 180, y: 0, w: 120, h: 100 }, "EXIT D7"),
        ];
        let scan = extract_placements(&tiles, &[token("D7")], &DiscoveryConfig::default());
        assert_eq!(verify_counts(&scan.placements).get("D7"), Some(&2));
    }

    #[test]
    fn test_four_tile_corner_is_one_occurrence() {
        let rects = [
            (0, 0, PixelRect { x: 0, y: 0, w: 120, h: 120 }),
            (0, 1, PixelRect { x: 80, y: 0, w: 120, h: 120 }),
            (1, 0, PixelRect { x: 0, y: 80, w: 120, h: 120 }),
            (1, 1, PixelRect { x: 80, y: 80, w: 120, h: 120 }),
        ];
        let tiles: Vec<OcrTile> = rects
            .iter()
            .map(|&(r, c, rect)| tile_at(1, r, c, rect, "VALVE D7"))
            .collect();
        let scan = extract_placements(&tiles, &[token("D7")], &DiscoveryConfig::default());
        assert_eq!(verify_counts(&scan.placements).get("D7"), Some(&1));
    }

    #[test]
    fn test_schedule_quantity() {
        let matcher = token_matcher("D7").unwrap();
        let text = "SIGN SCHEDULE\nD7 EXIT SIGN QTY: 4\nD7 TACTILE 6 EA\nD8 QTY 40";
        assert_eq!(schedule_quantity(text, &matcher), Some(6));
        assert_eq!(schedule_quantity("D7 EXIT SIGN", &matcher), None);
        assert_eq!(schedule_quantity("NO. 3 D7", &matcher), Some(3));
    }

    #[test]
    fn test_count_occurrences() {
        let matcher = token_matcher("WS-01").unwrap();
        assert_eq!(count_occurrences("ws-01, WS\u{2014}01; WS-011", &matcher), 2);
    }

    #[test]
    fn test_has_code_shape() {
        assert!(has_code_shape("type d7 sign"));
        assert!(!has_code_shape("general notes"));
    }
}
