//! Structural repair rules
//!
//! Each rule is a pure text-to-text transform targeting one malformation
//! that generative models produce:
//! - `unstringify_nested`: a field value that is a string holding an array or object literal
//! - `insert_missing_commas`: adjacent containers with no separator (`}{`)
//! - `drop_trailing_commas`: a comma right before `]` or `}`
//! - `fix_invalid_escapes`: backslash escapes outside the JSON escape set
//! - `escape_control_chars`: raw newlines and tabs inside string literals
//!
//! Rules run in list order. Append to [`default_rules`] to handle a new
//! malformation without touching the existing ones.

use crate::text::{literal_end, map_literals, map_structure};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_ADJACENT_OBJECTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\}(\s*)\{").expect("valid regex"));
static RE_ADJACENT_ARRAYS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\](\s*)\[").expect("valid regex"));
static RE_TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*)([\]}])").expect("valid regex"));

/// A named text transform
#[derive(Clone, Copy)]
pub struct RepairRule {
    /// Stable rule name, recorded when the rule changes the text
    pub name: &'static str,
    apply: fn(&str) -> String,
}

impl RepairRule {
    /// Create a rule
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str, apply: fn(&str) -> String) -> Self {
        Self { name, apply }
    }

    /// Run the rule
    #[inline]
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        (self.apply)(text)
    }
}

impl std::fmt::Debug for RepairRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairRule").field("name", &self.name).finish()
    }
}

/// Standard rule list in application order
#[must_use]
pub fn default_rules() -> Vec<RepairRule> {
    vec![
        RepairRule::new("unstringify_nested", unstringify_nested),
        RepairRule::new("insert_missing_commas", insert_missing_commas),
        RepairRule::new("drop_trailing_commas", drop_trailing_commas),
        RepairRule::new("fix_invalid_escapes", fix_invalid_escapes),
        RepairRule::new("escape_control_chars", escape_control_chars),
    ]
}

/// Apply `rules` in order, returning the text and names of rules that changed it
#[must_use]
pub fn apply_rules(text: &str, rules: &[RepairRule]) -> (String, Vec<&'static str>) {
    let mut current = text.to_string();
    let mut applied = Vec::new();
    for rule in rules {
        let next = rule.apply(&current);
        if next != current {
            tracing::debug!(rule = rule.name, "repair rule applied");
            applied.push(rule.name);
            current = next;
        }
    }
    (current, applied)
}

/// Inline field values that are strings holding an array or object literal
///
/// `"findings": "[{\"insight\": \"x\"}]"` becomes `"findings": [{"insight": "x"}]`.
/// Only literals in value position (after a `:`) are considered.
#[must_use]
pub fn unstringify_nested(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_significant = None;
    let mut i = 0;
    while i < text.len() {
        let Some(offset) = text[i..].find('"') else {
            out.push_str(&text[i..]);
            break;
        };
        let start = i + offset;
        let before = &text[i..start];
        out.push_str(before);
        if let Some(c) = before.chars().rev().find(|c| !c.is_whitespace()) {
            last_significant = Some(c);
        }
        let end = literal_end(text, start);
        let literal = &text[start..end];
        match (last_significant, decode_container_literal(literal)) {
            (Some(':'), Some(inner)) => out.push_str(&inner),
            _ => out.push_str(literal),
        }
        last_significant = Some('"');
        i = end;
    }
    out
}

/// Decoded content of a string literal when it holds a container literal
fn decode_container_literal(literal: &str) -> Option<String> {
    if literal.len() < 2 || !literal.ends_with('"') {
        return None;
    }
    let decoded = serde_json::from_str::<String>(literal)
        .ok()
        .unwrap_or_else(|| unescape_loose(&literal[1..literal.len() - 1]));
    let trimmed = decoded.trim();
    let looks_nested = (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.starts_with('{') && trimmed.ends_with('}'));
    looks_nested.then(|| trimmed.to_string())
}

/// Best-effort unescape of literal content that serde_json rejected
fn unescape_loose(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Insert commas between adjacent objects or arrays
#[must_use]
pub fn insert_missing_commas(text: &str) -> String {
    map_structure(text, |s| {
        let s = RE_ADJACENT_OBJECTS.replace_all(s, "},$1{");
        RE_ADJACENT_ARRAYS.replace_all(&s, "],$1[").into_owned()
    })
}

/// Remove commas directly before a closing bracket
#[must_use]
pub fn drop_trailing_commas(text: &str) -> String {
    map_structure(text, |s| RE_TRAILING_COMMA.replace_all(s, "$1$2").into_owned())
}

/// Drop the backslash from escapes JSON does not define
///
/// `\q` becomes `q`; `\u` not followed by four hex digits becomes `u`.
#[must_use]
pub fn fix_invalid_escapes(text: &str) -> String {
    map_literals(text, |lit| {
        let mut out = String::with_capacity(lit.len());
        let mut chars = lit.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                    out.push('\\');
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                Some('u') => {
                    let hex: String = chars.clone().skip(1).take(4).collect();
                    if hex.len() == 4 && hex.chars().all(|h| h.is_ascii_hexdigit()) {
                        out.push('\\');
                    }
                }
                _ => {}
            }
        }
        out
    })
}

/// Escape raw control characters inside string literals
#[must_use]
pub fn escape_control_chars(text: &str) -> String {
    map_literals(text, |lit| {
        let mut out = String::with_capacity(lit.len());
        for c in lit.chars() {
            match c {
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {}
                c => out.push(c),
            }
        }
        out
    })
}
