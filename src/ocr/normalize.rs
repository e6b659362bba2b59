//! Text normalization shared by OCR output, discovery and matching.

/// Replace typographic dash variants with ASCII '-'.
pub fn normalize_dashes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{FE58}' | '\u{FE63}' | '\u{FF0D}' => '-',
            other => other,
        })
        .collect()
}

/// Collapse every whitespace run (including newlines) into a single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize raw OCR output: dashes unified, whitespace collapsed within each
/// line, blank lines dropped. Line structure is kept.
pub fn normalize_ocr_text(text: &str) -> String {
    normalize_dashes(text)
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Uppercased, dash-normalized form used for code discovery and matching.
pub fn matching_form(text: &str) -> String {
    normalize_dashes(text).to_uppercase()
}

/// Clip `text` to at most `max_chars` characters (UTF-8 safe).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_dashes() {
        assert_eq!(normalize_dashes("WS\u{2013}01 and WS\u{2014}02"), "WS-01 and WS-02");
        assert_eq!(normalize_dashes("A\u{2212}3"), "A-3");
    }

    #[test]
    fn test_normalize_ocr_text() {
        let raw = "  D7   SIGN \n\n\t EXIT\u{2010}1  \n";
        assert_eq!(normalize_ocr_text(raw), "D7 SIGN\nEXIT-1");
    }

    #[test]
    fn test_truncate_chars_utf8() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
