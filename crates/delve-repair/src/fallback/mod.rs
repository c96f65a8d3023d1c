//! Fallback Constructor
//!
//! Schema-aware coercion and default construction used when repaired text
//! still fails validation:
//! - [`coerce`] / [`coerce_until_valid`]: per-path coercion toward the expected shape
//! - [`FieldDefaults`]: field-name keyed defaults for absent fields
//! - [`fallback_object`], [`minimal_valid_object`], [`example_payload`]

mod canonical;
mod coerce;
mod defaults;

pub use canonical::{example_payload, fallback_object, minimal_valid_object};
pub use coerce::{coerce, coerce_until_valid, coerce_value, Coerced};
pub use defaults::FieldDefaults;

use crate::engine::{repair, RepairStage};
use delve_schema::{validate, Shape};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Step of the salvage branch that produced a valid value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalvageStep {
    /// Repaired (and preprocessed) text validated directly
    Repaired,
    /// Valid after per-field coercion
    Coerced,
    /// Valid only as a skeleton overlaid with surviving fields
    Fallback,
}

/// Valid value recovered from raw text
#[derive(Debug, Clone, PartialEq)]
pub struct Salvaged {
    /// Schema-valid value
    pub value: Value,
    /// Salvage step that succeeded
    pub step: SalvageStep,
    /// Repair stage the candidate came from
    pub stage: RepairStage,
}

/// Repair, then coerce, then build a fallback object, accepting the first valid result
///
/// Returns `None` when even the fallback object fails validation.
#[must_use]
pub fn salvage(raw: &str, shape: &Shape) -> Option<Salvaged> {
    let candidate = repair(raw, shape);
    let stage = candidate.stage;

    let errors = match validate(shape, &candidate.value) {
        Ok(()) => {
            return Some(Salvaged {
                value: candidate.value,
                step: SalvageStep::Repaired,
                stage,
            })
        }
        Err(errors) => errors,
    };
    tracing::debug!(?stage, errors = errors.len(), "repaired candidate rejected, coercing");

    let coerced = coerce_until_valid(candidate.value.clone(), shape, FieldDefaults::standard());
    if coerced.is_valid() {
        return Some(Salvaged {
            value: coerced.value,
            step: SalvageStep::Coerced,
            stage,
        });
    }

    let fallback = fallback_object(shape, &candidate.value);
    if shape.accepts(&fallback) {
        return Some(Salvaged {
            value: fallback,
            step: SalvageStep::Fallback,
            stage,
        });
    }
    tracing::debug!(?stage, "fallback object rejected");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn plan() -> Shape {
        Shape::object([
            (
                "search_queries",
                Shape::array(Shape::object([
                    ("query", Shape::string()),
                    ("rationale", Shape::string()),
                    ("source", Shape::literal("web")),
                    ("priority", Shape::integer().range(1.0, 5.0)),
                ])),
            ),
            (
                "required_analyses",
                Shape::array(Shape::object([
                    ("type", Shape::string()),
                    ("description", Shape::string()),
                    ("importance", Shape::integer().range(1.0, 5.0)),
                ])),
            ),
        ])
    }

    #[test]
    fn valid_text_is_repaired_step() {
        let raw = r#"{"search_queries": [], "required_analyses": []}"#;
        let out = salvage(raw, &plan());
        assert_eq!(out.map(|s| s.step), Some(SalvageStep::Repaired));
    }

    #[test]
    fn mistyped_priority_is_coerced() {
        let raw = r#"```json
{"search_queries": [{"query": "q", "rationale": "r", "source": "web", "priority": "high"}], "required_analyses": []}
```"#;
        let out = salvage(raw, &plan());
        let out = out.map(|s| (s.step, s.value["search_queries"][0]["priority"].clone()));
        assert_eq!(out, Some((SalvageStep::Coerced, json!(3))));
    }

    #[test]
    fn prose_still_yields_a_valid_object() {
        let out = salvage("The model refused.", &plan());
        assert!(out.is_some_and(|s| plan().accepts(&s.value)));
    }
}
