//! Field-level extraction, the last resort when no parser accepts the text
//!
//! Scans for `"field": <value>` occurrences and assembles a flat object.
//! Containers are captured by balanced scanning and parsed leniently;
//! anything nested inside a captured container is not pulled up to the top
//! level.

use crate::lenient::parse_lenient;
use crate::text::{balanced_end, literal_end};
use delve_schema::Shape;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

static RE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(\w+)"\s*:\s*"#).expect("valid regex"));
static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?").expect("valid regex"));
static RE_BOOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:true|false)\b").expect("valid regex"));

/// Extract top-level fields from `text`
///
/// The first occurrence of a field wins. Returns an empty map when nothing
/// recognizable is found.
#[must_use]
pub fn extract_fields(text: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    let mut pos = 0;
    while let Some(caps) = RE_FIELD.captures_at(text, pos) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let value_start = whole.end();
        let rest = &text[value_start..];
        let (value, consumed) = match rest.chars().next() {
            Some('[') => container(text, value_start, Value::Array(Vec::new())),
            Some('{') => container(text, value_start, Value::Object(Map::new())),
            Some('"') => {
                let end = literal_end(text, value_start);
                let literal = &text[value_start..end];
                let decoded = serde_json::from_str::<String>(literal).unwrap_or_else(|_| {
                    literal
                        .trim_start_matches('"')
                        .trim_end_matches('"')
                        .to_string()
                });
                (Some(Value::String(decoded)), end - value_start)
            }
            _ => {
                if let Some(m) = RE_NUMBER.find(rest) {
                    let number = m
                        .as_str()
                        .parse::<i64>()
                        .map(Value::from)
                        .ok()
                        .or_else(|| {
                            m.as_str()
                                .parse::<f64>()
                                .ok()
                                .and_then(Number::from_f64)
                                .map(Value::Number)
                        });
                    (number, m.end())
                } else if let Some(m) = RE_BOOL.find(rest) {
                    (Some(Value::Bool(m.as_str() == "true")), m.end())
                } else {
                    (None, 0)
                }
            }
        };
        if let Some(value) = value {
            fields.entry(name.as_str().to_string()).or_insert(value);
        }
        pos = if consumed > 0 {
            value_start + consumed
        } else {
            whole.end().max(pos + 1)
        };
        if pos >= text.len() {
            break;
        }
    }
    fields
}

/// Parse the container at `start`, falling back to `empty` when unparseable
fn container(text: &str, start: usize, empty: Value) -> (Option<Value>, usize) {
    let end = balanced_end(text, start).unwrap_or(text.len());
    let slice = &text[start..end];
    let parsed = serde_json::from_str::<Value>(slice)
        .ok()
        .or_else(|| parse_lenient(slice).ok())
        .filter(|v| std::mem::discriminant(v) == std::mem::discriminant(&empty))
        .unwrap_or(empty);
    (Some(parsed), end - start)
}

/// Extract fields and fill every unmatched top-level shape field with its empty value
#[must_use]
pub fn extract_for_shape(text: &str, shape: &Shape) -> Map<String, Value> {
    let mut fields = extract_fields(text);
    if let Some(obj) = shape.as_object() {
        for (name, field) in &obj.fields {
            if !fields.contains_key(name) && !field.is_optional() {
                fields.insert(name.clone(), field.empty_value());
            }
        }
    }
    fields
}
