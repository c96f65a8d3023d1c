//! Candidate extraction from free-form model text
//!
//! Strips code fences and surrounding prose, leaving candidate object
//! literals. A truncated object is kept up to end of text so later stages can
//! close it. Prose may itself contain braces, so every top-level object is a
//! candidate and the engine picks the one that matches the target shape.

use crate::text::balanced_end;
use once_cell::sync::Lazy;
use regex::Regex;

/// Upper bound on spans considered per text
const MAX_SPANS: usize = 8;

static RE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:json5?|javascript|js|JSON)?[ \t]*\r?\n?(.*?)```").expect("valid regex")
});

static RE_OPEN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^```[ \t]*[A-Za-z0-9]*[ \t]*\r?$").expect("valid regex"));

/// Remove Markdown code fences, keeping their contents
#[must_use]
pub fn strip_fences(text: &str) -> String {
    let closed = RE_FENCE.replace_all(text.trim(), "$1");
    // A fence left open by truncation
    RE_OPEN_FENCE.replace_all(&closed, "").trim().to_string()
}

/// Outermost object literal in `text`
///
/// Returns the balanced `{...}` span starting at the first `{`, or the rest
/// of the text when the object never closes. Falls back to a top-level array
/// span, then to the trimmed text itself.
#[must_use]
pub fn object_span(text: &str) -> &str {
    if let Some(start) = text.find('{') {
        let end = balanced_end(text, start).unwrap_or(text.len());
        return &text[start..end];
    }
    if let Some(start) = text.find('[') {
        let end = balanced_end(text, start).unwrap_or(text.len());
        return &text[start..end];
    }
    text.trim()
}

/// Candidate object spans in `text`, in order of appearance
///
/// Every top-level `{...}` span, then the greedy span from the first `{` to
/// the last `}` when it is not already listed. Without braces the only
/// candidate is [`object_span`].
#[must_use]
pub fn object_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut from = 0;
    while spans.len() < MAX_SPANS {
        let Some(offset) = text[from..].find('{') else {
            break;
        };
        let start = from + offset;
        let end = balanced_end(text, start).unwrap_or(text.len());
        spans.push(&text[start..end]);
        from = end;
    }
    if spans.is_empty() {
        return vec![object_span(text)];
    }
    if let (Some(first), Some(last)) = (text.find('{'), text.rfind('}')) {
        if last > first {
            let greedy = &text[first..=last];
            if !spans.contains(&greedy) {
                spans.push(greedy);
            }
        }
    }
    spans
}

/// Fence-stripped text and the candidate spans within it
#[must_use]
pub fn extract_candidates(text: &str) -> (String, Vec<String>) {
    let unfenced = strip_fences(text);
    let spans = object_spans(&unfenced).into_iter().map(str::to_string).collect();
    (unfenced, spans)
}
