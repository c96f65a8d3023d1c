//! Schema Repair Engine
//!
//! Turns raw model text into a best-effort JSON value in stages, each
//! consuming the previous stage's output:
//! 1. Extraction: strip fences and prose, collect candidate object spans
//! 2. Structural: ordered [`RepairRule`]s, then a strict parse
//! 3. Lenient: almost-JSON recursive descent
//! 4. Field extraction: per-field scanning of the unfenced text
//!
//! Stages 2 and 3 run per span. Among the spans that parse, the first one
//! sharing the most top-level keys with the shape wins; with no overlap the
//! first parsed span is used.
//!
//! A recovered value that does not yet satisfy the shape is also passed
//! through [`preprocess`] so stringified containers are decoded. Repair never
//! fails. When no stage recognizes anything the shape's empty value is
//! returned.

use crate::extract::extract_candidates;
use crate::fields::extract_for_shape;
use crate::lenient::parse_lenient;
use crate::preprocess::preprocess;
use crate::rules::{apply_rules, default_rules, RepairRule};
use delve_schema::Shape;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static DEFAULT_ENGINE: Lazy<RepairEngine> = Lazy::new(RepairEngine::new);

/// Stage that produced a repaired candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStage {
    /// Extracted text was already valid JSON
    Clean,
    /// Valid after structural rules
    Structural,
    /// Accepted by the lenient parser
    Lenient,
    /// Assembled field by field
    FieldExtraction,
    /// Nothing recognizable; shape-empty value
    Empty,
}

/// Best-effort value recovered from raw text
///
/// Not yet validated: callers must check it against the shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairedCandidate {
    /// Recovered value
    pub value: Value,
    /// Stage that produced it
    pub stage: RepairStage,
    /// Names of structural rules that changed the text
    pub applied_rules: Vec<&'static str>,
}

impl RepairedCandidate {
    fn finish(value: Value, stage: RepairStage, applied_rules: Vec<&'static str>, shape: &Shape) -> Self {
        let value = if shape.accepts(&value) {
            value
        } else {
            preprocess(value)
        };
        Self {
            value,
            stage,
            applied_rules,
        }
    }
}

/// Ordered repair pipeline
#[derive(Debug, Clone)]
pub struct RepairEngine {
    rules: Vec<RepairRule>,
}

impl Default for RepairEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RepairEngine {
    /// Engine with the standard rule list
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Engine with a custom rule list
    #[inline]
    #[must_use]
    pub fn with_rules(rules: Vec<RepairRule>) -> Self {
        Self { rules }
    }

    /// Append a rule after the existing ones
    #[inline]
    #[must_use]
    pub fn with_rule(mut self, rule: RepairRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Active rules in application order
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &[RepairRule] {
        &self.rules
    }

    /// Recover a value from `raw`
    #[must_use]
    pub fn repair(&self, raw: &str, shape: &Shape) -> RepairedCandidate {
        if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
            return RepairedCandidate::finish(value, RepairStage::Clean, Vec::new(), shape);
        }

        let (unfenced, spans) = extract_candidates(raw);
        let mut parsed = Vec::new();
        let mut applied_rules = Vec::new();
        for (i, span) in spans.iter().enumerate() {
            let (recovered, applied) = self.parse_span(span);
            match recovered {
                Some((value, stage)) => parsed.push((value, stage, applied)),
                None if i == 0 => applied_rules = applied,
                None => {}
            }
        }
        if !parsed.is_empty() {
            let chosen = best_span(&parsed, shape);
            if spans.len() > 1 {
                tracing::debug!(spans = spans.len(), chosen, "picked candidate span");
            }
            let (value, stage, applied) = parsed.swap_remove(chosen);
            return RepairedCandidate::finish(value, stage, applied, shape);
        }

        let fields = extract_for_shape(&unfenced, shape);
        if fields.values().any(|v| !is_empty_like(v)) {
            tracing::debug!(fields = fields.len(), "recovered by field extraction");
            return RepairedCandidate::finish(
                Value::Object(fields),
                RepairStage::FieldExtraction,
                applied_rules,
                shape,
            );
        }

        tracing::debug!(len = raw.len(), "no recoverable structure");
        RepairedCandidate {
            value: shape.empty_value(),
            stage: RepairStage::Empty,
            applied_rules,
        }
    }

    /// Strict, structural and lenient parsing of one span
    fn parse_span(&self, span: &str) -> (Option<(Value, RepairStage)>, Vec<&'static str>) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return (Some((value, RepairStage::Clean)), Vec::new());
        }
        let (fixed, applied) = apply_rules(span, &self.rules);
        if let Ok(value) = serde_json::from_str::<Value>(&fixed) {
            return (Some((value, RepairStage::Structural)), applied);
        }
        let lenient = lenient_container(&fixed)
            .or_else(|| lenient_container(span))
            .map(|value| (value, RepairStage::Lenient));
        (lenient, applied)
    }

    /// Parse almost-JSON text without a target shape
    ///
    /// Strict parse first, then structural rules, then the lenient parser.
    #[must_use]
    pub fn parse(&self, text: &str) -> Option<Value> {
        if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
            return Some(value);
        }
        let (fixed, _) = apply_rules(text.trim(), &self.rules);
        serde_json::from_str::<Value>(&fixed)
            .ok()
            .or_else(|| parse_lenient(&fixed).ok())
    }
}

/// Only containers count as a lenient success; a bare word is not a recovery
fn lenient_container(text: &str) -> Option<Value> {
    parse_lenient(text)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

/// Index of the first parsed span with the most keys known to `shape`
fn best_span(parsed: &[(Value, RepairStage, Vec<&'static str>)], shape: &Shape) -> usize {
    parsed
        .iter()
        .enumerate()
        .map(|(i, (value, ..))| (shape_overlap(value, shape), i))
        .filter(|(overlap, _)| *overlap > 0)
        .min_by_key(|&(overlap, i)| (std::cmp::Reverse(overlap), i))
        .map_or(0, |(_, i)| i)
}

fn shape_overlap(value: &Value, shape: &Shape) -> usize {
    match (value.as_object(), shape.as_object()) {
        (Some(fields), Some(object)) => fields.keys().filter(|k| object.get(k.as_str()).is_some()).count(),
        _ => 0,
    }
}

fn is_empty_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}

/// Repair `raw` with the standard engine
#[must_use]
pub fn repair(raw: &str, shape: &Shape) -> RepairedCandidate {
    DEFAULT_ENGINE.repair(raw, shape)
}

/// Parse almost-JSON text with the standard engine
#[must_use]
pub fn parse_with_repair(text: &str) -> Option<Value> {
    DEFAULT_ENGINE.parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn analysis() -> Shape {
        Shape::object([
            (
                "findings",
                Shape::array(Shape::object([
                    ("insight", Shape::string()),
                    ("evidence", Shape::array(Shape::string())),
                    ("confidence", Shape::number().range(0.0, 1.0)),
                ])),
            ),
            ("implications", Shape::array(Shape::string())),
            ("limitations", Shape::array(Shape::string())),
        ])
    }

    #[test]
    fn valid_json_is_clean() {
        let raw = r#"{"findings": [], "implications": ["a"], "limitations": []}"#;
        let candidate = repair(raw, &analysis());
        assert_eq!(candidate.stage, RepairStage::Clean);
        assert_eq!(candidate.value, serde_json::from_str::<Value>(raw).unwrap_or_default());
    }

    #[test]
    fn fenced_json_is_clean() {
        let raw = "Sure!\n```json\n{\"implications\": []}\n```";
        let candidate = repair(raw, &analysis());
        assert_eq!(candidate.stage, RepairStage::Clean);
        assert_eq!(candidate.value, json!({ "implications": [] }));
    }

    #[test]
    fn doubly_stringified_findings_become_an_array() {
        let raw = r#"{"findings": "[{\"insight\":\"x\",\"evidence\":[],\"confidence\":0.5}]"}"#;
        let candidate = repair(raw, &analysis());
        assert_eq!(candidate.stage, RepairStage::Clean);
        assert_eq!(
            candidate.value["findings"],
            json!([{ "insight": "x", "evidence": [], "confidence": 0.5 }])
        );
    }

    #[test]
    fn structural_rules_fix_commas() {
        let raw = r#"{"findings": [{"insight": "a", "evidence": [], "confidence": 0.1} {"insight": "b", "evidence": [], "confidence": 0.2},], }"#;
        let candidate = repair(raw, &analysis());
        assert_eq!(candidate.stage, RepairStage::Structural);
        assert!(candidate.applied_rules.contains(&"insert_missing_commas"));
        assert_eq!(candidate.value["findings"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn truncated_output_is_lenient() {
        let raw = r#"{"implications": ["a", "b"], "limitations": ["cut"#;
        let candidate = repair(raw, &analysis());
        assert_eq!(candidate.stage, RepairStage::Lenient);
        assert_eq!(candidate.value["limitations"], json!(["cut"]));
    }

    #[test]
    fn prose_without_structure_is_empty() {
        let candidate = repair("I cannot help with that.", &analysis());
        assert_eq!(candidate.stage, RepairStage::Empty);
        assert_eq!(
            candidate.value,
            json!({ "findings": [], "implications": [], "limitations": [] })
        );
    }

    #[test]
    fn braces_in_leading_prose_do_not_hide_the_payload() {
        let raw = "Filling in the {template} you gave:\n{\"implications\": [\"real\"], \"limitations\": [\"kept\"]}";
        let candidate = repair(raw, &analysis());
        assert_eq!(candidate.stage, RepairStage::Clean);
        assert_eq!(candidate.value["implications"], json!(["real"]));
        assert_eq!(candidate.value["limitations"], json!(["kept"]));
    }

    #[test]
    fn first_span_wins_without_shape_overlap() {
        let candidate = repair(r#"{"x": 1} then {"y": 2}"#, &analysis());
        assert_eq!(candidate.value["x"], json!(1));
    }

    #[test]
    fn custom_rule_is_appended() {
        fn smart_quotes(text: &str) -> String {
            text.replace(['\u{201c}', '\u{201d}'], "\"")
        }
        let engine = RepairEngine::new().with_rule(RepairRule::new("smart_quotes", smart_quotes));
        let candidate = engine.repair("{\u{201c}a\u{201d}: 1}", &Shape::any());
        assert_eq!(candidate.value, json!({ "a": 1 }));
        assert!(candidate.applied_rules.contains(&"smart_quotes"));
    }
}
