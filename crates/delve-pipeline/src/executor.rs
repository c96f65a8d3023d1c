//! Step executor collaborator
//!
//! Web search and tabular query services plug in behind [`StepExecutor`].
//! The orchestrator wraps every call in a timeout and turns failures into
//! [`StepResult`]s with a remediation hint; nothing here aborts a run.

use crate::types::QueryOperation;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Result limit for gap-fill searches
pub const GAP_SEARCH_LIMIT: usize = 2;

static RE_MISSING_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"column "([^"]*)" does not exist"#).expect("valid regex"));
static RE_MISSING_RELATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"relation "([^"]*)" does not exist"#).expect("valid regex"));

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Web search
    WebSearch {
        /// Query text
        query: String,
        /// Why this search
        rationale: String,
        /// Maximum hits to fetch
        result_limit: usize,
    },
    /// Tabular query
    Query {
        /// SQL text
        sql: String,
        /// Why this query
        rationale: String,
        /// Operation kind
        operation: QueryOperation,
    },
}

/// One executable step of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Timeline id, unique within a run
    pub id: String,
    /// What to execute
    pub kind: StepKind,
    /// Plan priority
    pub priority: u8,
}

impl StepDefinition {
    /// Web search step; the result limit follows from priority
    #[must_use]
    pub fn web_search(id: impl Into<String>, query: impl Into<String>, rationale: impl Into<String>, priority: u8) -> Self {
        Self {
            id: id.into(),
            kind: StepKind::WebSearch {
                query: query.into(),
                rationale: rationale.into(),
                result_limit: search_result_limit(priority),
            },
            priority,
        }
    }

    /// Tabular query step
    #[must_use]
    pub fn query(
        id: impl Into<String>,
        sql: impl Into<String>,
        rationale: impl Into<String>,
        operation: QueryOperation,
        priority: u8,
    ) -> Self {
        Self {
            id: id.into(),
            kind: StepKind::Query {
                sql: sql.into(),
                rationale: rationale.into(),
                operation,
            },
            priority,
        }
    }

    /// With an explicit search result limit; no-op for queries
    #[inline]
    #[must_use]
    pub fn with_result_limit(mut self, limit: usize) -> Self {
        if let StepKind::WebSearch { result_limit, .. } = &mut self.kind {
            *result_limit = limit.max(1);
        }
        self
    }

    /// Query or SQL text
    #[must_use]
    pub fn text(&self) -> &str {
        match &self.kind {
            StepKind::WebSearch { query, .. } => query,
            StepKind::Query { sql, .. } => sql,
        }
    }

    /// Rationale from the plan
    #[must_use]
    pub fn rationale(&self) -> &str {
        match &self.kind {
            StepKind::WebSearch { rationale, .. } | StepKind::Query { rationale, .. } => rationale,
        }
    }
}

/// Search result limit for a plan priority: `min(6 - priority, 10)`, at least 1
#[inline]
#[must_use]
pub fn search_result_limit(priority: u8) -> usize {
    (6usize.saturating_sub(usize::from(priority))).clamp(1, 10)
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchHit {
    /// Origin, e.g. "web"
    pub source: String,
    /// Page title
    pub title: String,
    /// Page URL
    pub url: String,
    /// Extracted content
    pub content: String,
}

/// Successful step output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum StepOutput {
    /// Search hits
    Search(Vec<SearchHit>),
    /// Result rows
    Rows(Vec<Map<String, Value>>),
}

impl StepOutput {
    /// Number of hits or rows
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Search(hits) => hits.len(),
            Self::Rows(rows) => rows.len(),
        }
    }

    /// Whether nothing came back
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Step failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    /// Call exceeded its timeout
    #[error("step timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed
        secs: u64,
    },

    /// Service unreachable
    #[error("network error: {0}")]
    Network(String),

    /// Query rejected by the database
    #[error("query error: {0}")]
    Query(String),

    /// Any other failure
    #[error("{0}")]
    Failed(String),
}

/// Heuristic suggestion for fixing a failed step
#[must_use]
pub fn remediation_hint(error: &StepError) -> Option<String> {
    match error {
        StepError::Timeout { .. } => {
            Some("The service did not answer in time. Narrow the query or raise the step timeout.".to_string())
        }
        StepError::Network(_) => {
            Some("The service could not be reached. Check connectivity and retry.".to_string())
        }
        StepError::Query(message) | StepError::Failed(message) => sql_hint(message),
    }
}

fn sql_hint(message: &str) -> Option<String> {
    if let Some(caps) = RE_MISSING_COLUMN.captures(message) {
        return Some(format!(
            "Column \"{}\" doesn't exist. Check the column name and quotes.",
            &caps[1]
        ));
    }
    if let Some(caps) = RE_MISSING_RELATION.captures(message) {
        return Some(format!(
            "Table \"{}\" doesn't exist. Check the table name and quotes.",
            &caps[1]
        ));
    }
    if message.contains("syntax error") {
        return Some("SQL syntax error. Check the query structure.".to_string());
    }
    None
}

/// Outcome of one step, kept in the run whether it succeeded or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Executed step
    pub step: StepDefinition,
    /// Whether the executor succeeded
    pub success: bool,
    /// Output on success
    pub output: Option<StepOutput>,
    /// Error text on failure
    pub error: Option<String>,
    /// Suggested fix on failure
    pub remediation: Option<String>,
}

impl StepResult {
    /// Result for a successful step
    #[must_use]
    pub fn succeeded(step: StepDefinition, output: StepOutput) -> Self {
        Self {
            step,
            success: true,
            output: Some(output),
            error: None,
            remediation: None,
        }
    }

    /// Result for a failed step
    #[must_use]
    pub fn failed(step: StepDefinition, error: &StepError) -> Self {
        Self {
            step,
            success: false,
            output: None,
            error: Some(error.to_string()),
            remediation: remediation_hint(error),
        }
    }

    /// Hits or rows returned
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.output.as_ref().map_or(0, StepOutput::len)
    }
}

/// External step service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute one step; `timeout` is advisory for the service
    async fn execute(&self, step: &StepDefinition, timeout: Duration) -> Result<StepOutput, StepError>;
}

/// Execute `step` under a hard timeout, never failing
pub async fn run_step(executor: &dyn StepExecutor, step: StepDefinition, timeout: Duration) -> StepResult {
    let outcome = match tokio::time::timeout(timeout, executor.execute(&step, timeout)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(StepError::Timeout {
            secs: timeout.as_secs(),
        }),
    };
    match outcome {
        Ok(output) => {
            tracing::debug!(step = %step.id, items = output.len(), "step completed");
            StepResult::succeeded(step, output)
        }
        Err(e) => {
            tracing::warn!(step = %step.id, error = %e, "step failed");
            StepResult::failed(step, &e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn result_limit_follows_priority() {
        assert_eq!(search_result_limit(1), 5);
        assert_eq!(search_result_limit(3), 3);
        assert_eq!(search_result_limit(5), 1);
        assert_eq!(search_result_limit(9), 1);
    }

    #[test]
    fn missing_column_hint() {
        let err = StepError::Query(r#"ERROR: column "prce" does not exist"#.into());
        assert_eq!(
            remediation_hint(&err).as_deref(),
            Some("Column \"prce\" doesn't exist. Check the column name and quotes.")
        );
    }

    #[test]
    fn relation_and_syntax_hints() {
        let err = StepError::Query(r#"relation "sales" does not exist"#.into());
        assert!(remediation_hint(&err).is_some_and(|h| h.contains("\"sales\"")));
        let err = StepError::Failed("syntax error at or near \"FROM\"".into());
        assert_eq!(
            remediation_hint(&err).as_deref(),
            Some("SQL syntax error. Check the query structure.")
        );
        assert_eq!(remediation_hint(&StepError::Failed("boom".into())), None);
    }

    #[tokio::test]
    async fn failures_become_step_results() {
        let mut mock = MockStepExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Err(StepError::Network("connection refused".into())));
        let step = StepDefinition::web_search("search-web-0", "remote work", "baseline", 3);

        let result = run_step(&mock, step, Duration::from_secs(5)).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("network error: connection refused"));
        assert!(result.remediation.is_some());
        assert_eq!(result.item_count(), 0);
    }

    #[tokio::test]
    async fn successes_carry_output() {
        let mut mock = MockStepExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Ok(StepOutput::Search(vec![SearchHit::default(); 2])));
        let step = StepDefinition::web_search("search-web-0", "q", "r", 5);

        let result = run_step(&mock, step, Duration::from_secs(5)).await;

        assert!(result.success);
        assert_eq!(result.item_count(), 2);
    }
}
