//! Data-analysis variant
//!
//! Plans SQL queries against a caller-described table, executes them in
//! priority order, runs one analysis call per planned analysis and closes
//! with a summary call. The "Queries" stage row updates in place while
//! each query appends its own row.

use crate::error::PipelineError;
use crate::event::{EventPayload, PipelineStage, PlanPayload, StageStatus, SynthesisPayload, UpdateEvent};
use crate::executor::StepDefinition;
use crate::result::{AnalysisOutcome, FinalResult, PlanRecord};
use crate::stages::{dedupe, step_payload, RunContext};
use crate::types::{DataPlan, DataSummary, Followup, KnowledgeGap, RequiredAnalysis};
use delve_generation::MIN_TEMPERATURE;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Table name used when the request carries no table description
pub const DEFAULT_TABLE: &str = "data";

const PLAN_ID: &str = "plan-design";
const QUERIES_ID: &str = "query-execution";
const SUMMARY_ID: &str = "final-analysis";

/// Column description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Database type
    pub data_type: String,
    /// Rows with no value
    #[serde(default)]
    pub missing_count: Option<u64>,
}

/// Table the analysis runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableContext {
    /// Table name as used in SQL
    pub table_name: String,
    /// Columns in table order
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
    /// Row count, if known
    #[serde(default)]
    pub row_count: Option<u64>,
}

impl TableContext {
    /// Table without column details
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            row_count: None,
        }
    }

    /// With a column
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, data_type: impl Into<String>, missing_count: Option<u64>) -> Self {
        self.columns.push(ColumnInfo {
            name: name.into(),
            data_type: data_type.into(),
            missing_count,
        });
        self
    }

    fn columns_text(&self) -> String {
        let mut text = String::new();
        for col in &self.columns {
            let _ = write!(text, "- {} ({}", col.name, col.data_type);
            if let Some(missing) = col.missing_count.filter(|n| *n > 0) {
                let _ = write!(text, ", {missing} missing values");
            }
            text.push_str(")\n");
        }
        text
    }
}

/// Data-analysis request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataRequest {
    /// Question about the data
    #[serde(default)]
    pub topic: String,
    /// Table description
    #[serde(default)]
    pub table: Option<TableContext>,
}

impl DataRequest {
    /// Request for a question
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            table: None,
        }
    }

    /// With a table description
    #[inline]
    #[must_use]
    pub fn with_table(mut self, table: TableContext) -> Self {
        self.table = Some(table);
        self
    }

    /// Table name used in queries
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.table.as_ref().map_or(DEFAULT_TABLE, |t| t.table_name.as_str())
    }

    /// Question, or a description request when only a table was given
    #[must_use]
    pub fn question(&self) -> String {
        let topic = self.topic.trim();
        if topic.is_empty() {
            format!("Describe the contents of table \"{}\"", self.table_name())
        } else {
            topic.to_string()
        }
    }
}

pub(crate) async fn run_data_analysis(ctx: &mut RunContext, request: &DataRequest) -> Result<FinalResult, PipelineError> {
    tracing::info!(run = %ctx.run.id, table = request.table_name(), "data analysis run started");

    if request.topic.trim().is_empty() && request.table.is_none() {
        let reason = "neither a question nor a table was provided".to_string();
        ctx.emit(
            UpdateEvent::new(PLAN_ID, PipelineStage::Plan, StageStatus::Failed, "Analysis Plan")
                .with_message(format!("Cannot create an analysis plan: {reason}")),
        )
        .await?;
        return Err(PipelineError::Setup(reason));
    }
    ctx.emit(
        UpdateEvent::new(QUERIES_ID, PipelineStage::Step, StageStatus::Pending, "Queries")
            .with_message("Waiting for query execution..."),
    )
    .await?;
    let question = request.question();

    // Plan
    ctx.emit(
        UpdateEvent::new(PLAN_ID, PipelineStage::Plan, StageStatus::Running, "Analysis Plan")
            .with_message("Creating analysis plan..."),
    )
    .await?;
    let generated = ctx
        .generate::<DataPlan>(plan_prompt(&question, request), MIN_TEMPERATURE)
        .await;
    let (plan, fallback) = if generated.is_degraded() {
        tracing::warn!(run = %ctx.run.id, "using fallback data plan");
        (DataPlan::fallback(request.table_name()), true)
    } else {
        (generated.value, false)
    };

    let mut queries = plan.queries;
    // Priority 1 is the most important
    queries.sort_by_key(|q| q.priority);
    queries.truncate(ctx.config.max_plan_steps);
    let steps: Vec<StepDefinition> = queries
        .into_iter()
        .enumerate()
        .map(|(i, q)| StepDefinition::query(format!("query-{i}"), q.query, q.rationale, q.operation, q.priority))
        .collect();
    let analyses = plan.analyses;

    ctx.emit(
        UpdateEvent::new(PLAN_ID, PipelineStage::Plan, StageStatus::Completed, "Analysis Plan")
            .with_message(format!(
                "Created analysis plan with {} queries and {} analyses",
                steps.len(),
                analyses.len()
            ))
            .with_payload(EventPayload::Plan(PlanPayload {
                steps: steps.clone(),
                analyses: analyses.clone(),
                total_steps: steps.len() + analyses.len(),
            }))
            .overwriting(),
    )
    .await?;
    for (i, analysis) in analyses.iter().enumerate() {
        ctx.emit(
            UpdateEvent::new(
                format!("analysis-{i}"),
                PipelineStage::Analysis,
                StageStatus::Pending,
                format!("{} Analysis", analysis.kind),
            )
            .with_message(format!("Waiting for {} analysis...", analysis.kind)),
        )
        .await?;
    }

    // Queries
    let total = steps.len();
    ctx.emit(
        UpdateEvent::new(QUERIES_ID, PipelineStage::Step, StageStatus::Running, "Executing Queries")
            .with_message(format!("Running {total} SQL queries..."))
            .overwriting(),
    )
    .await?;
    let timeout = ctx.config.step_timeout(crate::config::Depth::Basic);
    for (i, step) in steps.iter().enumerate() {
        ctx.ensure_active()?;
        let n = i + 1;
        ctx.emit(
            UpdateEvent::new(QUERIES_ID, PipelineStage::Step, StageStatus::Running, "Executing Queries")
                .with_message(format!("Executing query {n}/{total}: {}", step.rationale()))
                .overwriting(),
        )
        .await?;
        ctx.emit(
            UpdateEvent::new(&step.id, PipelineStage::Step, StageStatus::Running, format!("Query {n}"))
                .with_message(step.rationale().to_string()),
        )
        .await?;

        let result = ctx.execute(step.clone(), timeout).await;
        let event = if result.success {
            UpdateEvent::new(&step.id, PipelineStage::Step, StageStatus::Completed, format!("Query {n}"))
                .with_message(format!("Completed query {n}/{total}: Retrieved {} rows", result.item_count()))
        } else {
            let reason = result
                .remediation
                .clone()
                .or_else(|| result.error.clone())
                .unwrap_or_default();
            UpdateEvent::new(&step.id, PipelineStage::Step, StageStatus::Failed, format!("Query {n}"))
                .with_message(format!("Failed query {n}/{total}: {reason}"))
        };
        ctx.emit(event.with_payload(step_payload(&result)).overwriting()).await?;
    }
    let succeeded = ctx.run.steps().iter().filter(|s| s.success).count();
    ctx.emit(
        UpdateEvent::new(QUERIES_ID, PipelineStage::Step, StageStatus::Completed, "Queries Executed")
            .with_message(format!("Retrieved data from {succeeded}/{total} queries"))
            .overwriting(),
    )
    .await?;
    tracing::info!(run = %ctx.run.id, succeeded, total, "queries executed");

    // Analyses
    let mut outcomes = Vec::with_capacity(analyses.len());
    for (i, analysis) in analyses.iter().enumerate() {
        let prompt = analysis_prompt(analysis, &results_context(ctx), &ctx.step_context());
        outcomes.push(ctx.analyze(format!("analysis-{i}"), analysis.clone(), prompt).await?);
    }

    // Summary
    let summary = summarize(ctx, &question, &outcomes).await?;

    let limitations = dedupe(
        ctx.failure_limitation()
            .into_iter()
            .chain(summary.limitations.iter().cloned())
            .chain(outcomes.iter().flat_map(|a| a.limitations.iter().cloned())),
    );
    let failed_queries: Vec<String> = ctx.run.failed_steps().map(|s| s.step.text().to_string()).collect();
    let gaps = query_gaps(failed_queries);
    let recommendations = recommendations(!summary.limitations.is_empty());

    let uncertainties = if summary.limitations.is_empty() {
        vec!["No significant limitations identified".to_string()]
    } else {
        summary.limitations.clone()
    };
    ctx.emit(
        UpdateEvent::new(SUMMARY_ID, PipelineStage::GapSynthesis, StageStatus::Completed, "Analysis Complete")
            .with_message(format!("Generated {} insights", summary.findings.len()))
            .with_payload(EventPayload::Synthesis(SynthesisPayload {
                findings: summary.findings.clone(),
                gaps: gaps.clone(),
                recommendations: recommendations.clone(),
                uncertainties,
            }))
            .overwriting(),
    )
    .await?;

    Ok(FinalResult {
        topic: question,
        plan: PlanRecord {
            steps,
            analyses,
            fallback,
        },
        step_results: Vec::new(),
        analyses: outcomes,
        limitations,
        recommendations,
        gaps,
        synthesis: None,
        summary: Some(summary.overview).filter(|s| !s.trim().is_empty()),
    })
}

async fn summarize(ctx: &mut RunContext, question: &str, outcomes: &[AnalysisOutcome]) -> Result<DataSummary, PipelineError> {
    ctx.ensure_active()?;
    ctx.emit(
        UpdateEvent::new(SUMMARY_ID, PipelineStage::GapSynthesis, StageStatus::Running, "Analysis Summary")
            .with_message("Summarizing findings...")
            .overwriting(),
    )
    .await?;
    let prompt = summary_prompt(question, &results_context(ctx), outcomes);
    let generated = ctx.generate::<DataSummary>(prompt, MIN_TEMPERATURE).await;
    if generated.is_degraded() {
        tracing::warn!(run = %ctx.run.id, "data summary degraded to fallback");
        return Ok(DataSummary::fallback());
    }
    Ok(generated.value)
}

/// Follow-ups: review insights, then data quality weighted by whether limitations exist
fn recommendations(has_limitations: bool) -> Vec<Followup> {
    vec![
        Followup {
            action: "Review insights and implications".to_string(),
            rationale: "To understand key findings from the data".to_string(),
            priority: 5,
        },
        Followup {
            action: "Consider data quality improvements".to_string(),
            rationale: "To address issues identified during analysis".to_string(),
            priority: if has_limitations { 4 } else { 2 },
        },
    ]
}

fn query_gaps(failed_queries: Vec<String>) -> Vec<KnowledgeGap> {
    if failed_queries.is_empty() {
        return Vec::new();
    }
    vec![KnowledgeGap {
        topic: "Query execution".to_string(),
        reason: "Some queries failed to execute properly".to_string(),
        additional_queries: failed_queries,
    }]
}

fn results_context(ctx: &RunContext) -> String {
    let steps = ctx.run.steps();
    let succeeded: Vec<_> = steps.iter().filter(|s| s.success).collect();
    let failed: Vec<_> = steps.iter().filter(|s| !s.success).collect();
    let mut text = format!(
        "You have {} successful and {} failed queries.\n",
        succeeded.len(),
        failed.len()
    );
    if succeeded.is_empty() {
        text.push_str("No successful queries.\n");
    } else {
        let rows: usize = succeeded.iter().map(|s| s.item_count()).sum();
        let _ = writeln!(text, "Successful queries returned a total of {rows} rows of data.");
    }
    if !failed.is_empty() {
        let errors: Vec<&str> = failed.iter().filter_map(|s| s.error.as_deref()).collect();
        let _ = writeln!(text, "Failed queries errors: {}", errors.join("; "));
    }
    text
}

fn plan_prompt(question: &str, request: &DataRequest) -> String {
    let table = request.table_name();
    let columns = request
        .table
        .as_ref()
        .map(TableContext::columns_text)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "(column details unavailable)\n".to_string());
    format!(
        r#"A user has this question: "{question}"

table name: {table}

available columns:
{columns}
Create a detailed fixed-step plan to answer the question with 1-2 analyses and 1-4 queries.

1. Use ONLY columns that exist in the table.
2. ALWAYS wrap both table names AND column names in double quotes in every query.
3. Escape the quotes in each query so the response stays valid JSON.
4. Use CAST with REPLACE ONLY for text columns that contain numeric values.
5. Use integer or numeric columns directly without CAST or REPLACE.
6. Each query's operation is one of: explore, filter, analyze, summarize."#
    )
}

fn analysis_prompt(analysis: &RequiredAnalysis, summary: &str, results: &str) -> String {
    format!(
        "Perform a {} analysis of the query results. {}\n\n\
         Context:\n{summary}\n\
         Query results: {results}\n\n\
         Create a focused analysis with key findings and supporting evidence, business implications, \
         and data limitations and caveats.",
        analysis.kind, analysis.description
    )
}

fn summary_prompt(question: &str, summary: &str, outcomes: &[AnalysisOutcome]) -> String {
    let findings: Vec<_> = outcomes
        .iter()
        .map(|o| serde_json::json!({ "analysis": o.analysis.kind, "findings": o.findings }))
        .collect();
    let findings = serde_json::to_string(&findings).unwrap_or_default();
    format!(
        "Summarize the analysis of this question: \"{question}\"\n\n\
         Context:\n{summary}\n\
         Analysis findings: {findings}\n\n\
         Give a one-paragraph overview answering the question, the most important findings, \
         business implications, and data limitations."
    )
}
