//! String-literal aware scanning helpers

use once_cell::sync::Lazy;
use regex::Regex;

static RE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("valid regex"));

/// Piece of almost-JSON text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    /// Text between string literals
    Structure(&'a str),
    /// A double-quoted literal including its quotes (closing quote may be missing)
    Literal(&'a str),
}

/// Byte offset just past the string literal starting at `start`
///
/// `text[start]` must be `"`. Returns `text.len()` for an unterminated literal.
pub(crate) fn literal_end(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    text.len()
}

/// Split into structure and double-quoted literal segments
pub(crate) fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut plain_start = 0;
    let mut i = 0;
    while let Some(offset) = text[i..].find('"') {
        let start = i + offset;
        if start > plain_start {
            out.push(Segment::Structure(&text[plain_start..start]));
        }
        let end = literal_end(text, start).min(text.len());
        out.push(Segment::Literal(&text[start..end]));
        plain_start = end;
        i = end;
        if i >= text.len() {
            break;
        }
    }
    if plain_start < text.len() {
        out.push(Segment::Structure(&text[plain_start..]));
    }
    out
}

/// Apply `f` to structure segments only, leaving literals untouched
pub(crate) fn map_structure(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    for seg in segments(text) {
        match seg {
            Segment::Structure(s) => out.push_str(&f(s)),
            Segment::Literal(s) => out.push_str(s),
        }
    }
    out
}

/// Apply `f` to literal segments only
pub(crate) fn map_literals(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    for seg in segments(text) {
        match seg {
            Segment::Structure(s) => out.push_str(s),
            Segment::Literal(s) => out.push_str(&f(s)),
        }
    }
    out
}

/// Byte offset just past the balanced container opening at `start`
///
/// `text[start]` must be `{` or `[`. Brackets inside string literals are
/// ignored. Returns `None` when the container never closes.
pub(crate) fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = literal_end(text, i);
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Remove HTML/XML tags
pub(crate) fn strip_tags(text: &str) -> String {
    RE_TAG.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_respect_escaped_quotes() {
        let segs = segments(r#"{"a\"b": 1}"#);
        assert_eq!(
            segs,
            vec![
                Segment::Structure("{"),
                Segment::Literal(r#""a\"b""#),
                Segment::Structure(": 1}"),
            ]
        );
    }

    #[test]
    fn unterminated_literal_runs_to_end() {
        let segs = segments(r#"{"a": "open"#);
        assert_eq!(segs.last(), Some(&Segment::Literal(r#""open"#)));
    }

    #[test]
    fn balanced_end_skips_brackets_in_strings() {
        let text = r#"{"a": "}]", "b": [1]} trailing"#;
        assert_eq!(balanced_end(text, 0), Some(text.find(" trailing").unwrap_or(0)));
        assert_eq!(balanced_end("{\"a\": [1", 0), None);
    }

    #[test]
    fn strip_tags_keeps_comparisons() {
        assert_eq!(strip_tags("<p>[1, 2]</p>"), "[1, 2]");
        assert_eq!(strip_tags("a < b"), "a < b");
    }
}
