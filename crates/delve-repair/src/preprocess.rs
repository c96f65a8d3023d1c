//! Value preprocessing before validation
//!
//! Walks a parsed value and decodes object fields whose string value itself
//! holds an array or object literal, optionally wrapped in HTML/XML tags.
//! Bracketed strings that cannot be parsed are split on commas or newlines.

use crate::engine::parse_with_repair;
use crate::text::strip_tags;
use serde_json::{Map, Value};

/// Recursively decode stringified containers in `value`
#[must_use]
pub fn preprocess(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(preprocess_object(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(preprocess).collect()),
        other => other,
    }
}

fn preprocess_object(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => decode_string_field(s),
                nested @ (Value::Object(_) | Value::Array(_)) => preprocess(nested),
                other => other,
            };
            (key, value)
        })
        .collect()
}

fn decode_string_field(raw: String) -> Value {
    let untagged = if raw.contains('<') { strip_tags(&raw) } else { raw.clone() };
    let trimmed = untagged.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        if let Some(Value::Array(items)) = parse_with_repair(trimmed) {
            return preprocess(Value::Array(items));
        }
        if let Some(parts) = split_list(&trimmed[1..trimmed.len() - 1]) {
            return Value::Array(parts);
        }
    } else if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Some(obj @ Value::Object(_)) = parse_with_repair(trimmed) {
            return preprocess(obj);
        }
    }
    Value::String(raw)
}

/// Split delimited list text into trimmed, unquoted string items
pub(crate) fn split_list(body: &str) -> Option<Vec<Value>> {
    let delimiter = if body.contains(',') {
        ','
    } else if body.contains('\n') {
        '\n'
    } else {
        return None;
    };
    Some(
        body.split(delimiter)
            .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').trim())
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    )
}
