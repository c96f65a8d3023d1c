//! Field-name keyed default values
//!
//! Used when a field is missing entirely, so fallback objects carry
//! plausible content instead of bare zero values.

use delve_schema::FieldDefaultSource;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;

static STANDARD: Lazy<FieldDefaults> = Lazy::new(FieldDefaults::build_standard);

/// Lookup table from field name to default value
#[derive(Debug, Clone, Default)]
pub struct FieldDefaults {
    table: HashMap<String, Value>,
}

impl FieldDefaults {
    /// Empty table
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Shared standard table for analysis, plan, gap-analysis and synthesis fields
    #[must_use]
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    /// Add or replace a default
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.table.insert(field.into(), value);
        self
    }

    /// Default for `field`
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.table.get(field)
    }

    /// Number of known fields
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn build_standard() -> Self {
        Self::empty()
            // Analysis
            .with(
                "findings",
                json!([{
                    "insight": "Default insight",
                    "evidence": ["Default evidence"],
                    "confidence": 0.5,
                }]),
            )
            .with("implications", json!(["Default implication"]))
            .with("limitations", json!(["Default limitation"]))
            // Research plan
            .with(
                "search_queries",
                json!([{
                    "query": "Default query",
                    "rationale": "Default rationale",
                    "source": "web",
                    "priority": 3,
                }]),
            )
            .with(
                "required_analyses",
                json!([{
                    "type": "overview",
                    "description": "Default analysis",
                    "importance": 3,
                }]),
            )
            // Gap analysis
            .with(
                "knowledge_gaps",
                json!([{
                    "topic": "Default topic",
                    "reason": "Default reason",
                    "additional_queries": ["Default query"],
                }]),
            )
            .with(
                "recommended_followup",
                json!([{
                    "action": "Default action",
                    "rationale": "Default rationale",
                    "priority": 3,
                }]),
            )
            // Synthesis
            .with(
                "key_findings",
                json!([{
                    "finding": "Default finding",
                    "supporting_evidence": ["Default evidence"],
                    "confidence": 0.7,
                }]),
            )
            .with("remaining_uncertainties", json!(["Default uncertainty"]))
            // Data plan
            .with(
                "analyses",
                json!([{
                    "type": "overview",
                    "description": "Default analysis",
                    "importance": 3,
                }]),
            )
            .with(
                "queries",
                json!([{
                    "query": "Default query",
                    "rationale": "Default rationale",
                    "operation": "explore",
                    "priority": 3,
                }]),
            )
            // Leaf fields
            .with("insight", json!("Default insight"))
            .with("evidence", json!(["Default evidence item"]))
            .with("confidence", json!(0.5))
            .with("finding", json!("Default finding"))
            .with("supporting_evidence", json!(["Default supporting evidence"]))
            .with("description", json!("Default description"))
            .with("type", json!("default"))
            .with("importance", json!(3))
            .with("priority", json!(3))
            .with("query", json!("Default query"))
            .with("rationale", json!("Default rationale"))
            .with("action", json!("Default action"))
            .with("topic", json!("Default topic"))
            .with("reason", json!("Default reason"))
            .with("severity", json!(5))
            .with("potential_solutions", json!(["Default solution"]))
            .with("additional_queries", json!(["Default query"]))
            .with("operation", json!("explore"))
            .with("source", json!("web"))
    }
}

impl FieldDefaultSource for FieldDefaults {
    fn default_for(&self, field: &str) -> Option<Value> {
        self.table.get(field).cloned()
    }
}
