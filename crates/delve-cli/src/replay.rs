//! Replay a pipeline run from a YAML fixture
//!
//! ```yaml
//! variant: research
//! topic: impact of remote work on productivity
//! depth: advanced
//! responses:
//!   plan: ['{"search_queries": [...], "required_analyses": [...]}']
//!   analysis: ['{"findings": [...], "implications": [], "limitations": []}']
//! steps:
//!   - matches: collaboration
//!     error: network
//!     message: connection reset
//! ```
//!
//! Responses are consumed in order per stage and the last one repeats. A
//! stage without responses is rejected, so it degrades to fallback content.

use anyhow::{Context, Result};
use delve_generation::{ModelCall, ModelCaller, ModelError};
use delve_pipeline::{
    DataRequest, Depth, Orchestrator, PipelineConfig, ResearchRequest, SearchHit, StepDefinition,
    StepError, StepExecutor, StepKind, StepOutput, TableContext,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Variant {
    #[default]
    Research,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Stage {
    Plan,
    Analysis,
    Gap,
    Synthesis,
    DataPlan,
    DataSummary,
}

impl Stage {
    fn of(call: &ModelCall) -> Option<Self> {
        let props = call.schema.get("properties")?.as_object()?;
        [
            ("search_queries", Self::Plan),
            ("knowledge_gaps", Self::Gap),
            ("key_findings", Self::Synthesis),
            ("queries", Self::DataPlan),
            ("overview", Self::DataSummary),
            ("findings", Self::Analysis),
        ]
        .into_iter()
        .find(|(key, _)| props.contains_key(*key))
        .map(|(_, stage)| stage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FailureKind {
    Timeout,
    Network,
    Query,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct StepScript {
    /// Substring of the query or SQL text
    matches: String,
    #[serde(default)]
    error: Option<FailureKind>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    hits: Vec<SearchHit>,
    #[serde(default)]
    rows: Vec<Map<String, Value>>,
}

impl StepScript {
    fn outcome(&self, step: &StepDefinition, timeout: Duration) -> Result<StepOutput, StepError> {
        if let Some(kind) = self.error {
            let message = self.message.clone();
            return Err(match kind {
                FailureKind::Timeout => StepError::Timeout {
                    secs: timeout.as_secs(),
                },
                FailureKind::Network => StepError::Network(message),
                FailureKind::Query => StepError::Query(message),
                FailureKind::Failed => StepError::Failed(message),
            });
        }
        Ok(match step.kind {
            StepKind::WebSearch { .. } => StepOutput::Search(self.hits.clone()),
            StepKind::Query { .. } => StepOutput::Rows(self.rows.clone()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Fixture {
    #[serde(default)]
    variant: Variant,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    depth: Depth,
    #[serde(default)]
    table: Option<TableContext>,
    #[serde(default)]
    responses: HashMap<Stage, Vec<String>>,
    #[serde(default)]
    steps: Vec<StepScript>,
}

struct FixtureCaller {
    responses: Mutex<HashMap<Stage, VecDeque<String>>>,
}

#[async_trait::async_trait]
impl ModelCaller for FixtureCaller {
    async fn call(&self, call: &ModelCall) -> Result<String, ModelError> {
        let stage = Stage::of(call).ok_or_else(|| ModelError::Rejected("unrecognized schema".into()))?;
        let reply = match self.responses.lock().get_mut(&stage) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        reply.ok_or_else(|| ModelError::Rejected(format!("fixture has no {stage:?} response")))
    }
}

struct FixtureExecutor {
    steps: Vec<StepScript>,
}

#[async_trait::async_trait]
impl StepExecutor for FixtureExecutor {
    async fn execute(&self, step: &StepDefinition, timeout: Duration) -> Result<StepOutput, StepError> {
        match self.steps.iter().find(|s| step.text().contains(s.matches.as_str())) {
            Some(script) => script.outcome(step, timeout),
            None => Ok(match step.kind {
                StepKind::WebSearch { .. } => StepOutput::Search(Vec::new()),
                StepKind::Query { .. } => StepOutput::Rows(Vec::new()),
            }),
        }
    }
}

fn parse_fixture(text: &str) -> Result<Fixture> {
    serde_yaml::from_str(text).context("parsing replay fixture")
}

pub(crate) async fn run(path: &Path, config: PipelineConfig) -> Result<()> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let fixture = parse_fixture(&text)?;
    tracing::info!(fixture = %path.display(), variant = ?fixture.variant, "replaying fixture");

    let caller = Arc::new(FixtureCaller {
        responses: Mutex::new(
            fixture
                .responses
                .into_iter()
                .map(|(stage, replies)| (stage, replies.into()))
                .collect(),
        ),
    });
    let executor = Arc::new(FixtureExecutor { steps: fixture.steps });
    let orchestrator = Orchestrator::new(caller, executor).with_config(config);

    let mut handle = match fixture.variant {
        Variant::Research => {
            orchestrator.spawn_research(ResearchRequest::new(fixture.topic).with_depth(fixture.depth))
        }
        Variant::Data => orchestrator.spawn_data_analysis(DataRequest {
            topic: fixture.topic,
            table: fixture.table,
        }),
    };
    while let Some(event) = handle.next_event().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    let (_, outcome) = handle.finish().await;
    let outcome = outcome?;
    tracing::info!(status = ?outcome.status, "replay finished");
    println!("{}", serde_json::to_string_pretty(&outcome.result)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FIXTURE: &str = r#"
variant: data
topic: Which region sells most?
table:
  table_name: sales
  columns:
    - { name: region, data_type: text }
responses:
  data_plan:
    - '{"analyses": [], "queries": []}'
steps:
  - matches: revenue
    error: query
    message: column "revenue" does not exist
  - matches: region
    rows:
      - { region: West, total: 10 }
"#;

    #[test]
    fn parses_data_fixture() {
        let fixture = parse_fixture(FIXTURE).expect("valid fixture");
        assert_eq!(fixture.variant, Variant::Data);
        assert_eq!(fixture.depth, Depth::Basic);
        assert_eq!(fixture.table.map(|t| t.table_name), Some("sales".to_string()));
        assert_eq!(fixture.responses[&Stage::DataPlan].len(), 1);
        assert_eq!(fixture.steps[0].error, Some(FailureKind::Query));
        assert_eq!(fixture.steps[1].rows[0]["region"], "West");
    }

    #[test]
    fn scripted_failure_becomes_step_error() {
        let fixture = parse_fixture(FIXTURE).expect("valid fixture");
        let step = StepDefinition::query(
            "query-0",
            r#"SELECT "revenue" FROM "sales""#,
            "r",
            delve_pipeline::QueryOperation::Explore,
            3,
        );
        let outcome = fixture.steps[0].outcome(&step, Duration::from_secs(15));
        assert_eq!(outcome, Err(StepError::Query(r#"column "revenue" does not exist"#.to_string())));
    }

    #[tokio::test]
    async fn unscripted_stage_is_rejected() {
        let caller = FixtureCaller {
            responses: Mutex::new(HashMap::new()),
        };
        let call = ModelCall {
            model: "m".into(),
            prompt: "p".into(),
            system: String::new(),
            schema: serde_json::json!({ "properties": { "findings": {} } }),
            temperature: 0.1,
            primer: None,
        };
        assert!(matches!(caller.call(&call).await, Err(ModelError::Rejected(_))));
    }
}
