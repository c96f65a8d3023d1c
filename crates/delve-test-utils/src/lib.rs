//! Testing utilities for the Delve workspace
//!
//! Scripted collaborators and JSON fixtures for pipeline tests.

#![allow(missing_docs)]

use delve_generation::{ModelCall, ModelCaller, ModelError};
use delve_pipeline::{SearchHit, StepDefinition, StepError, StepExecutor, StepKind, StepOutput};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Which pipeline stage a model call belongs to, read off its schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    ResearchPlan,
    Analysis,
    GapAnalysis,
    Synthesis,
    DataPlan,
    DataSummary,
}

impl CallKind {
    /// Classify by the top-level schema properties
    pub fn of(call: &ModelCall) -> Option<Self> {
        let props = call.schema.get("properties")?.as_object()?;
        [
            ("search_queries", Self::ResearchPlan),
            ("knowledge_gaps", Self::GapAnalysis),
            ("key_findings", Self::Synthesis),
            ("queries", Self::DataPlan),
            ("overview", Self::DataSummary),
            ("findings", Self::Analysis),
        ]
        .into_iter()
        .find(|(key, _)| props.contains_key(*key))
        .map(|(_, kind)| kind)
    }
}

type Reply = Result<String, ModelError>;

/// Model caller answering from per-stage scripts
///
/// Replies are consumed in order; the last one repeats. A stage without a
/// script is rejected, which drives the ladder to its minimal object.
#[derive(Debug, Default)]
pub struct ScriptedModelCaller {
    scripts: Mutex<HashMap<CallKind, VecDeque<Reply>>>,
    calls: Mutex<Vec<(Option<CallKind>, ModelCall)>>,
}

impl ScriptedModelCaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue raw response text for a stage
    #[must_use]
    pub fn with_reply(self, kind: CallKind, text: impl Into<String>) -> Self {
        self.push(kind, Ok(text.into()));
        self
    }

    /// Queue a JSON response for a stage
    #[must_use]
    pub fn with_json(self, kind: CallKind, value: &Value) -> Self {
        self.with_reply(kind, value.to_string())
    }

    /// Queue a failure for a stage
    #[must_use]
    pub fn with_failure(self, kind: CallKind, error: ModelError) -> Self {
        self.push(kind, Err(error));
        self
    }

    fn push(&self, kind: CallKind, reply: Reply) {
        self.scripts.lock().entry(kind).or_default().push_back(reply);
    }

    /// Every call received, in order
    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Number of calls received for a stage
    pub fn count(&self, kind: CallKind) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(k, _)| *k == Some(kind))
            .count()
    }
}

#[async_trait::async_trait]
impl ModelCaller for ScriptedModelCaller {
    async fn call(&self, call: &ModelCall) -> Result<String, ModelError> {
        let kind = CallKind::of(call);
        self.calls.lock().push((kind, call.clone()));
        let Some(kind) = kind else {
            return Err(ModelError::Rejected("unrecognized schema".into()));
        };
        let reply = match self.scripts.lock().get_mut(&kind) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        reply.unwrap_or_else(|| Err(ModelError::Rejected(format!("no script for {kind:?}"))))
    }
}

/// Step executor answering by query substring
///
/// Unmatched web searches return one hit and unmatched queries one row.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    outcomes: Vec<(String, Result<StepOutput, StepError>)>,
    delay: Option<Duration>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps whose text contains `needle` get `outcome`
    #[must_use]
    pub fn with_outcome(mut self, needle: impl Into<String>, outcome: Result<StepOutput, StepError>) -> Self {
        self.outcomes.push((needle.into(), outcome));
        self
    }

    /// Steps whose text contains `needle` fail with `error`
    #[must_use]
    pub fn with_failure(self, needle: impl Into<String>, error: StepError) -> Self {
        self.with_outcome(needle, Err(error))
    }

    /// Sleep before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Ids of executed steps, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait::async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, step: &StepDefinition, _timeout: Duration) -> Result<StepOutput, StepError> {
        self.executed.lock().push(step.id.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((_, outcome)) = self.outcomes.iter().find(|(n, _)| step.text().contains(n.as_str())) {
            return outcome.clone();
        }
        Ok(match &step.kind {
            StepKind::WebSearch { query, .. } => StepOutput::Search(vec![hit(query)]),
            StepKind::Query { .. } => StepOutput::Rows(vec![row(&[("count", json!(42))])]),
        })
    }
}

/// Search hit for a query
pub fn hit(query: &str) -> SearchHit {
    SearchHit {
        source: "web".to_string(),
        title: format!("About {query}"),
        url: format!("https://example.com/{}", query.replace(' ', "-")),
        content: format!("Reporting on {query}."),
    }
}

/// Result row from column/value pairs
pub fn row(cells: &[(&str, Value)]) -> Map<String, Value> {
    cells.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

pub mod fixtures {
    //! Well-formed stage responses
    use serde_json::{json, Value};

    pub fn research_plan(queries: &[&str]) -> Value {
        let queries: Vec<Value> = queries
            .iter()
            .map(|q| json!({ "query": q, "rationale": format!("Learn about {q}"), "source": "web", "priority": 3 }))
            .collect();
        json!({
            "search_queries": queries,
            "required_analyses": [
                { "type": "trend", "description": "Identify trends", "importance": 4 }
            ]
        })
    }

    pub fn analysis(insight: &str) -> Value {
        json!({
            "findings": [
                { "insight": insight, "evidence": ["Survey data"], "confidence": 0.8 }
            ],
            "implications": ["Policies may need revision"],
            "limitations": ["Small sample"]
        })
    }

    pub fn gap_analysis(gap_queries: &[&str]) -> Value {
        json!({
            "limitations": [
                { "type": "coverage", "description": "Few longitudinal studies", "severity": 4, "potential_solutions": ["Search academic sources"] }
            ],
            "knowledge_gaps": [
                { "topic": "Long-term effects", "reason": "Little multi-year data", "additional_queries": gap_queries }
            ],
            "recommended_followup": [
                { "action": "Review longitudinal studies", "rationale": "Fill the time gap", "priority": 6 }
            ]
        })
    }

    pub fn synthesis() -> Value {
        json!({
            "key_findings": [
                { "finding": "Productivity holds steady", "supporting_evidence": ["Multiple surveys"], "confidence": 0.75 }
            ],
            "remaining_uncertainties": ["Sector differences"]
        })
    }

    pub fn data_plan(queries: &[&str]) -> Value {
        let queries: Vec<Value> = queries
            .iter()
            .enumerate()
            .map(|(i, q)| json!({ "query": q, "rationale": format!("Query {i}"), "operation": "explore", "priority": 3 }))
            .collect();
        json!({
            "analyses": [
                { "type": "distribution", "description": "Distribution of values", "importance": 4 }
            ],
            "queries": queries
        })
    }

    pub fn data_summary(overview: &str) -> Value {
        json!({
            "overview": overview,
            "findings": [
                { "insight": "Sales peak in Q4", "evidence": ["Monthly totals"], "confidence": 0.9 }
            ],
            "implications": ["Stock up before Q4"],
            "limitations": []
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_for(schema: Value) -> ModelCall {
        ModelCall {
            model: "m".into(),
            prompt: "p".into(),
            system: String::new(),
            schema,
            temperature: 0.1,
            primer: None,
        }
    }

    #[test]
    fn classifies_summary_before_analysis() {
        let call = call_for(json!({ "properties": { "overview": {}, "findings": {} } }));
        assert_eq!(CallKind::of(&call), Some(CallKind::DataSummary));
        let call = call_for(json!({ "properties": { "findings": {} } }));
        assert_eq!(CallKind::of(&call), Some(CallKind::Analysis));
    }

    #[tokio::test]
    async fn last_reply_repeats() {
        let caller = ScriptedModelCaller::new()
            .with_reply(CallKind::Analysis, "a")
            .with_reply(CallKind::Analysis, "b");
        let call = call_for(json!({ "properties": { "findings": {} } }));
        assert_eq!(caller.call(&call).await, Ok("a".to_string()));
        assert_eq!(caller.call(&call).await, Ok("b".to_string()));
        assert_eq!(caller.call(&call).await, Ok("b".to_string()));
        assert_eq!(caller.count(CallKind::Analysis), 3);
    }
}
