//! Canonical objects and last-resort construction
//!
//! - [`fallback_object`]: shape skeleton overlaid with whatever fields survived
//! - [`minimal_valid_object`]: canonical objects for known shapes, then the skeleton
//! - [`example_payload`]: illustrative payload for the explicit re-ask prompt

use super::coerce::coerce_until_valid;
use super::defaults::FieldDefaults;
use delve_schema::Shape;
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

/// Minimal objects for the known stage shapes, tried in order
static CANONICAL: Lazy<Vec<(&'static str, Value)>> = Lazy::new(|| {
    vec![
        (
            "analysis",
            json!({
                "findings": [{
                    "insight": "Analysis finding",
                    "evidence": ["Evidence"],
                    "confidence": 0.5,
                }],
                "implications": ["Implication"],
                "limitations": ["Limitation"],
            }),
        ),
        (
            "gap_analysis",
            json!({
                "limitations": [{
                    "type": "limitation",
                    "description": "Research limitation",
                    "severity": 5,
                    "potential_solutions": ["Further research"],
                }],
                "knowledge_gaps": [{
                    "topic": "Research gap",
                    "reason": "Insufficient data",
                    "additional_queries": ["Query"],
                }],
                "recommended_followup": [{
                    "action": "Follow-up action",
                    "rationale": "Rationale",
                    "priority": 3,
                }],
            }),
        ),
        (
            "synthesis",
            json!({
                "key_findings": [{
                    "finding": "Finding",
                    "supporting_evidence": ["Evidence"],
                    "confidence": 0.7,
                }],
                "remaining_uncertainties": ["Uncertainty"],
            }),
        ),
        (
            "research_plan",
            json!({
                "search_queries": [{
                    "query": "Query",
                    "rationale": "Rationale",
                    "source": "web",
                    "priority": 3,
                }],
                "required_analyses": [{
                    "type": "analysis",
                    "description": "Description",
                    "importance": 3,
                }],
            }),
        ),
        (
            "data_plan",
            json!({
                "analyses": [{
                    "type": "overview",
                    "description": "Description",
                    "importance": 3,
                }],
                "queries": [{
                    "query": "Query",
                    "rationale": "Rationale",
                    "operation": "explore",
                    "priority": 3,
                }],
            }),
        ),
    ]
});

/// Richer sample content used for example payloads
static EXAMPLE: Lazy<Value> = Lazy::new(|| {
    json!({
        "findings": [{
            "insight": "Main finding from analysis",
            "evidence": ["Supporting evidence 1", "Supporting evidence 2"],
            "confidence": 0.8,
        }],
        "implications": ["Key implication 1", "Key implication 2"],
        "limitations": ["Limitation in analysis"],
        "search_queries": [{
            "query": "Example search query",
            "rationale": "Reason for the query",
            "source": "web",
            "priority": 3,
        }],
        "required_analyses": [{
            "type": "comparative",
            "description": "Analysis description",
            "importance": 4,
        }],
        "knowledge_gaps": [{
            "topic": "Area needing more research",
            "reason": "Why this is a gap",
            "additional_queries": ["Follow-up query 1"],
        }],
        "recommended_followup": [{
            "action": "Recommended next step",
            "rationale": "Reason for recommendation",
            "priority": 4,
        }],
        "key_findings": [{
            "finding": "Key research finding",
            "supporting_evidence": ["Evidence for finding"],
            "confidence": 0.7,
        }],
        "remaining_uncertainties": ["Area of uncertainty 1", "Area of uncertainty 2"],
        "analyses": [{
            "type": "distribution",
            "description": "Distribution of key values",
            "importance": 4,
        }],
        "queries": [{
            "query": "SELECT category, COUNT(*) FROM \"table\" GROUP BY category",
            "rationale": "Understand category balance",
            "operation": "summarize",
            "priority": 4,
        }],
    })
});

/// Schema-shaped object built from surviving fields of `original`
///
/// Starts from the shape skeleton, overlays every non-empty field that the
/// shape declares, then runs the bounded coercion loop. The result is not
/// guaranteed valid; callers re-validate.
#[must_use]
pub fn fallback_object(shape: &Shape, original: &Value) -> Value {
    let defaults = FieldDefaults::standard();
    let mut base = shape.skeleton(defaults);
    if let (Value::Object(target), Value::Object(source)) = (&mut base, original) {
        let declared = shape.as_object();
        for (key, value) in source {
            if declared.is_some_and(|o| o.get(key).is_none()) || !is_surviving(value) {
                continue;
            }
            target.insert(key.clone(), value.clone());
        }
    }
    coerce_until_valid(base, shape, defaults).value
}

fn is_surviving(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => true,
    }
}

/// Object that satisfies `shape` without any model output
///
/// Tries each canonical object, then their union, then the shape skeleton.
/// The skeleton is valid by construction, so this always succeeds for a
/// satisfiable shape.
#[must_use]
pub fn minimal_valid_object(shape: &Shape) -> Value {
    for (name, candidate) in CANONICAL.iter() {
        if shape.accepts(candidate) {
            tracing::debug!(canonical = name, "minimal object from canonical");
            return candidate.clone();
        }
    }
    let mut union = Map::new();
    for (_, candidate) in CANONICAL.iter() {
        if let Value::Object(fields) = candidate {
            for (k, v) in fields {
                union.insert(k.clone(), v.clone());
            }
        }
    }
    let union = Value::Object(union);
    if shape.accepts(&union) {
        return union;
    }
    shape.skeleton(FieldDefaults::standard())
}

/// Pretty-printed example payload for `shape`
///
/// Known fields take sample content; the rest come from field defaults and
/// the shape skeleton. Falls back to the bare skeleton when the merged
/// example does not validate.
#[must_use]
pub fn example_payload(shape: &Shape) -> String {
    let defaults = FieldDefaults::standard();
    let skeleton = shape.skeleton(defaults);
    let mut example = skeleton.clone();
    if let (Value::Object(target), Value::Object(sample)) = (&mut example, &*EXAMPLE) {
        for (key, value) in target.iter_mut() {
            if let Some(sample_value) = sample.get(key) {
                *value = sample_value.clone();
            }
        }
    }
    let chosen = if shape.accepts(&example) { example } else { skeleton };
    serde_json::to_string_pretty(&chosen).unwrap_or_else(|_| chosen.to_string())
}
