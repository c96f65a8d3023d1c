//! Per-field coercion driven by schema errors
//!
//! Errors are grouped by path and each offending value is coerced toward
//! the shape expected at that path. Missing intermediate containers are
//! created on the way down, chosen by whether the next segment is an array
//! index or an object key.

use crate::engine::parse_with_repair;
use crate::preprocess::split_list;
use crate::text::strip_tags;
use delve_schema::{
    number_value, validate, FieldDefaultSource, FieldPath, PathSegment, SchemaError, Shape,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Hard ceiling on coercion passes
const MAX_PATCH_PASSES: usize = 32;

static RE_LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?").expect("valid regex")
});

/// Result of the bounded coercion loop
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    /// Coerced value
    pub value: Value,
    /// Errors left after the last pass; empty when valid
    pub remaining: Vec<SchemaError>,
    /// Passes performed
    pub passes: usize,
}

impl Coerced {
    /// Whether the value now satisfies the shape
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.remaining.is_empty()
    }

    /// The value, if valid
    #[must_use]
    pub fn into_valid(self) -> Option<Value> {
        self.remaining.is_empty().then_some(self.value)
    }
}

/// Coerce every path named in `errors` toward the shape expected there
///
/// Paths nested under an already-coerced path are left for the next pass,
/// since the coerced parent may have replaced them.
#[must_use]
pub fn coerce(
    mut root: Value,
    errors: &[SchemaError],
    shape: &Shape,
    defaults: &dyn FieldDefaultSource,
) -> Value {
    let grouped: BTreeSet<&FieldPath> = errors.iter().map(|e| &e.path).collect();
    let mut done: Vec<&FieldPath> = Vec::new();
    for path in grouped {
        if done.iter().any(|p| is_prefix(p, path)) {
            continue;
        }
        let Some(target) = shape.at_path(path) else {
            continue;
        };
        let default = default_at(path, target, defaults);
        let slot = slot_at(&mut root, path, shape, defaults);
        let current = std::mem::take(slot);
        *slot = coerce_value(current, target, default, defaults);
        done.push(path);
    }
    root
}

/// Coerce repeatedly until valid, bounded by the number of distinct error paths
///
/// When a pass makes no progress, the offending values are replaced with
/// field defaults or shape skeletons.
#[must_use]
pub fn coerce_until_valid(value: Value, shape: &Shape, defaults: &dyn FieldDefaultSource) -> Coerced {
    let mut current = value;
    let mut seen: BTreeSet<FieldPath> = BTreeSet::new();
    let mut budget = 0usize;
    let mut previous: Option<Vec<SchemaError>> = None;
    let mut passes = 0usize;

    loop {
        let errors = match validate(shape, &current) {
            Ok(()) => {
                return Coerced {
                    value: current,
                    remaining: Vec::new(),
                    passes,
                }
            }
            Err(errors) => errors,
        };
        for e in &errors {
            if seen.insert(e.path.clone()) {
                budget += 1;
            }
        }
        if passes >= budget.min(MAX_PATCH_PASSES) {
            tracing::debug!(passes, remaining = errors.len(), "coercion budget exhausted");
            return Coerced {
                value: current,
                remaining: errors,
                passes,
            };
        }
        passes += 1;
        current = if previous.as_ref() == Some(&errors) {
            replace_with_defaults(current, &errors, shape, defaults)
        } else {
            coerce(current, &errors, shape, defaults)
        };
        previous = Some(errors);
    }
}

fn replace_with_defaults(
    mut root: Value,
    errors: &[SchemaError],
    shape: &Shape,
    defaults: &dyn FieldDefaultSource,
) -> Value {
    let paths: BTreeSet<&FieldPath> = errors.iter().map(|e| &e.path).collect();
    let mut done: Vec<&FieldPath> = Vec::new();
    for path in paths {
        if done.iter().any(|p| is_prefix(p, path)) {
            continue;
        }
        let Some(target) = shape.at_path(path) else {
            continue;
        };
        let replacement =
            default_at(path, target, defaults).unwrap_or_else(|| target.skeleton(defaults));
        *slot_at(&mut root, path, shape, defaults) = replacement;
        done.push(path);
    }
    root
}

fn is_prefix(prefix: &FieldPath, path: &FieldPath) -> bool {
    path.segments().starts_with(prefix.segments())
}

/// Field default applicable at `path`, only if it satisfies `target`
///
/// An array element takes the first element of its array field's default.
fn default_at(path: &FieldPath, target: &Shape, defaults: &dyn FieldDefaultSource) -> Option<Value> {
    let candidate = match path.last()? {
        PathSegment::Key(k) => defaults.default_for(k),
        PathSegment::Index(_) => path
            .last_key()
            .and_then(|k| defaults.default_for(k))
            .and_then(|d| d.as_array().and_then(|a| a.first().cloned())),
    };
    candidate.filter(|d| target.accepts(d))
}

/// Mutable slot at `path`, creating containers along the way
fn slot_at<'v>(
    root: &'v mut Value,
    path: &FieldPath,
    shape: &Shape,
    defaults: &dyn FieldDefaultSource,
) -> &'v mut Value {
    let mut current = root;
    let mut prefix = FieldPath::root();
    for seg in path.segments() {
        current = match seg {
            PathSegment::Key(k) => {
                if !current.is_object() {
                    *current = Value::Object(Map::new());
                }
                prefix = prefix.key(k.as_str());
                match current {
                    Value::Object(map) => map.entry(k.clone()).or_insert(Value::Null),
                    other => other,
                }
            }
            PathSegment::Index(i) => {
                if !current.is_array() {
                    *current = Value::Array(Vec::new());
                }
                prefix = prefix.index(*i);
                let filler = shape
                    .at_path(&prefix)
                    .map_or(Value::Null, |s| s.skeleton(defaults));
                match current {
                    Value::Array(items) => {
                        while items.len() <= *i {
                            items.push(filler.clone());
                        }
                        &mut items[*i]
                    }
                    other => other,
                }
            }
        };
    }
    current
}

/// Coerce one value toward `target`
///
/// `default` must already satisfy `target` when present.
#[must_use]
pub fn coerce_value(
    value: Value,
    target: &Shape,
    default: Option<Value>,
    defaults: &dyn FieldDefaultSource,
) -> Value {
    let target = target.unwrap_optional();
    let fallback = |default: Option<Value>| default.unwrap_or_else(|| target.skeleton(defaults));

    match target {
        Shape::Array {
            items,
            min_items,
            max_items,
        } => {
            let mut elements = match value {
                Value::Null => return fallback(default),
                Value::Array(a) => a,
                Value::String(s) => string_to_array(&s),
                other => vec![other],
            };
            if let Some(min) = *min_items {
                let mut stock = default
                    .and_then(|d| d.as_array().cloned())
                    .unwrap_or_default()
                    .into_iter();
                while elements.len() < min {
                    elements.push(stock.next().unwrap_or_else(|| items.skeleton(defaults)));
                }
            }
            if let Some(max) = *max_items {
                elements.truncate(max);
            }
            Value::Array(elements)
        }
        Shape::Object(_) => match value {
            obj @ Value::Object(_) => obj,
            Value::String(s) => {
                let cleaned = strip_tags(&s);
                let trimmed = cleaned.trim();
                if trimmed.starts_with('{') && trimmed.ends_with('}') {
                    if let Some(obj @ Value::Object(_)) = parse_with_repair(trimmed) {
                        return obj;
                    }
                }
                fallback(default)
            }
            _ => fallback(default),
        },
        Shape::String => match value {
            s @ Value::String(_) => s,
            Value::Null => default.unwrap_or_else(|| Value::String(String::new())),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            Value::Array(items) => Value::String(
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            obj @ Value::Object(_) => Value::String(obj.to_string()),
        },
        Shape::Number { min, max, integer } => {
            let parsed = match &value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => leading_number(s),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            let Some(mut n) = parsed.filter(|n| n.is_finite()) else {
                return fallback(default);
            };
            if *integer {
                n = n.round();
            }
            if let Some(lo) = min {
                if n < *lo {
                    n = if *integer { lo.ceil() } else { *lo };
                }
            }
            if let Some(hi) = max {
                if n > *hi {
                    n = if *integer { hi.floor() } else { *hi };
                }
            }
            number_value(n, *integer)
        }
        Shape::Boolean => match value {
            b @ Value::Bool(_) => b,
            Value::String(s) => {
                let s = s.trim().to_ascii_lowercase();
                Value::Bool(!(s.is_empty() || s == "false" || s == "0" || s == "no"))
            }
            Value::Number(n) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
            Value::Null => default.unwrap_or(Value::Bool(false)),
            Value::Array(_) | Value::Object(_) => Value::Bool(true),
        },
        Shape::Literal { value: lit } => Value::String(lit.clone()),
        Shape::Enum { values } => {
            let matched = value.as_str().and_then(|s| {
                values
                    .iter()
                    .find(|v| v.eq_ignore_ascii_case(s.trim()))
                    .cloned()
            });
            match (matched, values.first()) {
                (Some(m), _) => Value::String(m),
                (None, Some(first)) => default.unwrap_or_else(|| Value::String(first.clone())),
                (None, None) => value,
            }
        }
        Shape::Any | Shape::Optional { .. } => match value {
            Value::Null => default.unwrap_or(Value::Null),
            other => other,
        },
    }
}

/// Numeric prefix of `s`, as parsed by lenient float readers
fn leading_number(s: &str) -> Option<f64> {
    RE_LEADING_NUMBER
        .find(s)
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
}

fn string_to_array(s: &str) -> Vec<Value> {
    let cleaned = strip_tags(s);
    let trimmed = cleaned.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        match parse_with_repair(trimmed) {
            Some(Value::Array(items)) => return items,
            Some(other) => return vec![other],
            None => {}
        }
    }
    if let Some(parts) = split_list(trimmed) {
        return parts;
    }
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![Value::String(trimmed.to_string())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FieldDefaults;
    use delve_schema::NoDefaults;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn finding() -> Shape {
        Shape::object([
            ("insight", Shape::string()),
            ("evidence", Shape::array(Shape::string())),
            ("confidence", Shape::number().range(0.0, 1.0)),
        ])
    }

    fn analysis() -> Shape {
        Shape::object([
            ("findings", Shape::array(finding())),
            ("implications", Shape::array(Shape::string())),
            ("limitations", Shape::array(Shape::string())),
        ])
    }

    #[test]
    fn numeric_string_is_coerced() {
        let shape = Shape::object([("count", Shape::number())]);
        let out = coerce_until_valid(json!({ "count": "42" }), &shape, &NoDefaults);
        assert!(out.is_valid());
        assert_eq!(out.value, json!({ "count": 42 }));
    }

    #[test]
    fn non_numeric_string_uses_field_default() {
        let shape = Shape::object([("priority", Shape::integer().range(1.0, 5.0))]);
        let out = coerce_until_valid(json!({ "priority": "not-a-number" }), &shape, FieldDefaults::standard());
        assert_eq!(out.value, json!({ "priority": 3 }));
    }

    #[test]
    fn non_numeric_without_default_uses_range_minimum() {
        let shape = Shape::object([("score", Shape::number().range(2.0, 10.0))]);
        let out = coerce_until_valid(json!({ "score": "n/a" }), &shape, &NoDefaults);
        assert_eq!(out.value, json!({ "score": 2 }));
    }

    #[test]
    fn out_of_range_numbers_clamp() {
        let shape = Shape::object([
            ("confidence", Shape::number().range(0.0, 1.0)),
            ("priority", Shape::integer().range(1.0, 5.0)),
        ]);
        let out = coerce_until_valid(json!({ "confidence": 7.5, "priority": 0 }), &shape, &NoDefaults);
        assert_eq!(out.value, json!({ "confidence": 1, "priority": 1 }));
    }

    #[test]
    fn string_lists_become_arrays() {
        let out = coerce_until_valid(
            json!({
                "findings": [],
                "implications": "faster delivery, fewer meetings",
                "limitations": "one\ntwo",
            }),
            &analysis(),
            &NoDefaults,
        );
        assert!(out.is_valid());
        assert_eq!(out.value["implications"], json!(["faster delivery", "fewer meetings"]));
        assert_eq!(out.value["limitations"], json!(["one", "two"]));
    }

    #[test]
    fn nested_paths_fixed_across_passes() {
        let value = json!({
            "findings": "[{\"insight\": 5, \"evidence\": \"a, b\", \"confidence\": \"0.9\"}]",
            "implications": [],
            "limitations": [],
        });
        let out = coerce_until_valid(value, &analysis(), &NoDefaults);
        assert!(out.is_valid(), "remaining: {:?}", out.remaining);
        assert_eq!(
            out.value["findings"],
            json!([{ "insight": "5", "evidence": ["a", "b"], "confidence": 0.9 }])
        );
        assert!(out.passes >= 2);
    }

    #[test]
    fn missing_fields_take_field_defaults() {
        let out = coerce_until_valid(json!({}), &analysis(), FieldDefaults::standard());
        assert!(out.is_valid());
        assert_eq!(out.value["implications"], json!(["Default implication"]));
        assert_eq!(out.value["findings"][0]["confidence"], json!(0.5));
    }

    #[test]
    fn array_length_pads_and_truncates() {
        let shape = Shape::object([
            ("few", Shape::array(Shape::string()).min_items(2)),
            ("many", Shape::array(Shape::string()).max_items(1)),
        ]);
        let out = coerce_until_valid(json!({ "few": ["a"], "many": ["a", "b"] }), &shape, &NoDefaults);
        assert_eq!(out.value, json!({ "few": ["a", ""], "many": ["a"] }));
    }

    #[test]
    fn literal_and_enum_fixed() {
        let shape = Shape::object([
            ("source", Shape::literal("web")),
            ("operation", Shape::one_of(["explore", "filter", "analyze", "summarize"])),
            ("mode", Shape::one_of(["a", "b"])),
        ]);
        let out = coerce_until_valid(
            json!({ "source": "google", "operation": "Filter", "mode": "zzz" }),
            &shape,
            &NoDefaults,
        );
        assert_eq!(out.value, json!({ "source": "web", "operation": "filter", "mode": "a" }));
    }

    #[test]
    fn intermediate_containers_follow_next_segment() {
        let shape = Shape::object([("outer", Shape::array(Shape::object([("k", Shape::boolean())])))]);
        let errors = vec![SchemaError {
            path: FieldPath::parse_dotted("outer.1.k"),
            code: delve_schema::IssueCode::InvalidType,
            expected: delve_schema::ExpectedType::Boolean,
            received: delve_schema::Received::Undefined,
        }];
        let out = coerce(json!({}), &errors, &shape, &NoDefaults);
        assert_eq!(out, json!({ "outer": [{ "k": false }, { "k": false }] }));
    }

    #[test]
    fn leading_number_matches_float_prefix() {
        assert_eq!(leading_number(" 42abc"), Some(42.0));
        assert_eq!(leading_number("-.5"), Some(-0.5));
        assert_eq!(leading_number("abc"), None);
    }
}
