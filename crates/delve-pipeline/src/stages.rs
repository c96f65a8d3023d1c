//! Stage machinery shared by the research and data-analysis variants
//!
//! A [`RunContext`] owns one run and its collaborators. Every event goes
//! through [`RunContext::emit`], which records it in the run timeline and
//! then suspends until the consumer has room for it.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::event::{AnalysisPayload, EventPayload, PipelineStage, StageStatus, StepPayload, UpdateEvent};
use crate::executor::{run_step, StepDefinition, StepExecutor, StepResult};
use crate::result::{AnalysisOutcome, FinalResult, RunOutcome};
use crate::run::Run;
use crate::types::{AnalysisResult, Finding, RequiredAnalysis};
use delve_generation::{GenerationClient, GenerationRequest, Generated, StructuredOutput};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// System instructions for every pipeline model call
pub(crate) const SYSTEM_PROMPT: &str =
    "You are an AI assistant that provides valid JSON responses when requested.";

/// Marker appended to prompt context cut at the character bound
const TRUNCATION_MARKER: &str = " ...[truncated]";

/// One run with its collaborators
pub(crate) struct RunContext {
    pub(crate) run: Run,
    pub(crate) config: PipelineConfig,
    client: GenerationClient,
    executor: Arc<dyn StepExecutor>,
    tx: mpsc::Sender<UpdateEvent>,
}

impl RunContext {
    pub(crate) fn new(
        run: Run,
        config: PipelineConfig,
        client: GenerationClient,
        executor: Arc<dyn StepExecutor>,
        tx: mpsc::Sender<UpdateEvent>,
    ) -> Self {
        Self {
            run,
            config,
            client,
            executor,
            tx,
        }
    }

    /// Record and deliver an event
    pub(crate) async fn emit(&mut self, event: UpdateEvent) -> Result<(), PipelineError> {
        self.run.record(event.clone());
        self.tx.send(event).await.map_err(|_| {
            tracing::info!(run = %self.run.id, "event consumer gone, stopping run");
            PipelineError::Cancelled
        })
    }

    /// Fail fast when the consumer has gone away
    pub(crate) fn ensure_active(&self) -> Result<(), PipelineError> {
        if self.tx.is_closed() {
            tracing::info!(run = %self.run.id, "event consumer gone, stopping run");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Execute one step and keep its result in the run
    pub(crate) async fn execute(&mut self, step: StepDefinition, timeout: Duration) -> StepResult {
        let result = run_step(self.executor.as_ref(), step, timeout).await;
        self.run.push_step(result.clone());
        result
    }

    /// Structured generation with the pipeline's model and timeout
    pub(crate) async fn generate<T: StructuredOutput>(&self, prompt: String, temperature: f32) -> Generated<T> {
        let request = GenerationRequest::for_output::<T>(self.config.model.clone(), prompt)
            .with_system(SYSTEM_PROMPT)
            .with_temperature(temperature)
            .with_timeout(self.config.model_timeout());
        let generated = self.client.generate::<T>(&request).await;
        tracing::debug!(
            run = %self.run.id,
            schema = T::schema_name(),
            recovery = %generated.recovery,
            attempts = generated.attempts,
            "stage generation finished"
        );
        generated
    }

    /// Step results rendered for a prompt, bounded by `max_context_chars`
    pub(crate) fn step_context(&self) -> String {
        render_steps(self.run.steps(), self.config.max_context_chars)
    }

    /// Run one planned analysis; degraded output becomes a single fallback finding
    pub(crate) async fn analyze(
        &mut self,
        id: String,
        analysis: RequiredAnalysis,
        prompt: String,
    ) -> Result<AnalysisOutcome, PipelineError> {
        self.ensure_active()?;
        let kind = analysis.kind.clone();
        self.emit(
            UpdateEvent::new(&id, PipelineStage::Analysis, StageStatus::Running, format!("Analyzing {kind}"))
                .with_message(format!("Analyzing {kind}..."))
                .overwriting(),
        )
        .await?;

        let generated = self
            .generate::<AnalysisResult>(prompt, self.config.analysis_temperature)
            .await;
        let recovery = generated.recovery;
        let (result, title, message) = if generated.is_degraded() {
            tracing::warn!(run = %self.run.id, analysis = %kind, "analysis degraded to fallback finding");
            (
                AnalysisResult {
                    findings: vec![fallback_finding(&kind)],
                    ..AnalysisResult::default()
                },
                format!("Analysis of {kind} (partial)"),
                "Analysis completed with limited results".to_string(),
            )
        } else {
            (
                generated.value,
                format!("Analysis of {kind} complete"),
                "Analysis complete".to_string(),
            )
        };

        self.emit(
            UpdateEvent::new(&id, PipelineStage::Analysis, StageStatus::Completed, title)
                .with_message(message)
                .with_payload(EventPayload::Analysis(AnalysisPayload {
                    analysis_type: kind,
                    findings: result.findings.clone(),
                }))
                .overwriting(),
        )
        .await?;

        Ok(AnalysisOutcome {
            id,
            analysis,
            findings: result.findings,
            implications: result.implications,
            limitations: result.limitations,
            recovery,
        })
    }

    /// Orchestrator-written limitation when any step failed
    pub(crate) fn failure_limitation(&self) -> Option<String> {
        let total = self.run.steps().len();
        let failed: Vec<String> = self
            .run
            .failed_steps()
            .map(|s| {
                format!(
                    "\"{}\" ({})",
                    s.step.text(),
                    s.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();
        if failed.is_empty() {
            return None;
        }
        Some(format!("{} of {total} steps failed: {}", failed.len(), failed.join("; ")))
    }

    /// Close the run and package its outcome
    pub(crate) fn finish(mut self, result: Result<FinalResult, PipelineError>) -> Result<RunOutcome, PipelineError> {
        match result {
            Ok(mut result) => {
                let status = self.run.finish();
                let (timeline, steps) = self.run.into_parts();
                result.step_results = steps;
                tracing::info!(
                    status = ?status,
                    steps = result.step_results.len(),
                    failed = result.failed_steps(),
                    analyses = result.analyses.len(),
                    "run finished"
                );
                Ok(RunOutcome {
                    result,
                    timeline,
                    status,
                })
            }
            Err(e) => {
                match &e {
                    PipelineError::Setup(reason) => {
                        self.run.fail();
                        tracing::error!(run = %self.run.id, %reason, "run setup failed");
                    }
                    PipelineError::Cancelled => {
                        self.run.cancel();
                        tracing::info!(run = %self.run.id, steps = self.run.steps().len(), "run cancelled");
                    }
                }
                Err(e)
            }
        }
    }
}

/// Step event payload for a finished step
pub(crate) fn step_payload(result: &StepResult) -> EventPayload {
    EventPayload::Step(StepPayload {
        query: result.step.text().to_string(),
        output: result.output.clone(),
        error: result.error.clone(),
        remediation: result.remediation.clone(),
    })
}

/// Single low-confidence finding for an analysis without model output
pub(crate) fn fallback_finding(kind: &str) -> Finding {
    Finding {
        insight: format!("Analysis of {kind} encountered technical difficulties"),
        evidence: vec![
            "The analysis engine experienced validation errors while processing results.".to_string(),
            "A simplified analysis is provided instead of the full detailed analysis.".to_string(),
        ],
        confidence: 0.5,
    }
}

/// Order-preserving dedupe of limitation lines
pub(crate) fn dedupe(lines: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    lines
        .into_iter()
        .filter(|l| !l.trim().is_empty() && seen.insert(l.clone()))
        .collect()
}

/// Compact JSON rendering of step results, cut at `max_chars`
pub(crate) fn render_steps(results: &[StepResult], max_chars: usize) -> String {
    let rendered: Vec<Value> = results
        .iter()
        .map(|r| {
            json!({
                "query": r.step.text(),
                "success": r.success,
                "results": r.output,
                "error": r.error,
            })
        })
        .collect();
    truncate_chars(&Value::Array(rendered).to_string(), max_chars)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}
