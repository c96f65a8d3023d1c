//! Research variant
//!
//! Stages:
//! 1. Plan: web searches and analyses (fallback: search the topic verbatim)
//! 2. Searches, sequential, highest priority first
//! 3. One analysis call per planned analysis
//! 4. Gap analysis; at advanced depth a capped gap-fill pass, a gap
//!    follow-up analysis and a final synthesis

use crate::config::Depth;
use crate::error::PipelineError;
use crate::event::{EventPayload, PipelineStage, PlanPayload, ProgressPayload, StageStatus, SynthesisPayload, UpdateEvent};
use crate::executor::{StepDefinition, StepResult, GAP_SEARCH_LIMIT};
use crate::result::{AnalysisOutcome, FinalResult, PlanRecord};
use crate::stages::{dedupe, step_payload, RunContext};
use crate::types::{GapAnalysis, RequiredAnalysis, ResearchPlan, Synthesis};
use delve_generation::MIN_TEMPERATURE;
use serde::{Deserialize, Serialize};

const PLAN_ID: &str = "research-plan";
const GAP_ID: &str = "gap-analysis";
const GAP_FOLLOWUP_ID: &str = "gap-followup";
const SYNTHESIS_ID: &str = "final-synthesis";
const PROGRESS_ID: &str = "research-progress";

/// Research request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// Topic or question
    pub topic: String,
    /// Research depth
    #[serde(default)]
    pub depth: Depth,
}

impl ResearchRequest {
    /// Basic-depth request
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            depth: Depth::Basic,
        }
    }

    /// With depth
    #[inline]
    #[must_use]
    pub fn with_depth(mut self, depth: Depth) -> Self {
        self.depth = depth;
        self
    }
}

pub(crate) async fn run_research(ctx: &mut RunContext, request: &ResearchRequest) -> Result<FinalResult, PipelineError> {
    let topic = request.topic.trim();
    let depth = request.depth;
    tracing::info!(run = %ctx.run.id, %depth, "research run started");

    ctx.emit(
        UpdateEvent::new(PLAN_ID, PipelineStage::Plan, StageStatus::Pending, "Research Plan")
            .with_message("Waiting to plan research..."),
    )
    .await?;
    if topic.is_empty() {
        let reason = "research topic is empty".to_string();
        ctx.emit(
            UpdateEvent::new(PLAN_ID, PipelineStage::Plan, StageStatus::Failed, "Research Plan")
                .with_message(format!("Cannot create a research plan: {reason}"))
                .overwriting(),
        )
        .await?;
        return Err(PipelineError::Setup(reason));
    }

    // Plan
    ctx.emit(
        UpdateEvent::new(PLAN_ID, PipelineStage::Plan, StageStatus::Running, "Research Plan")
            .with_message("Creating research plan...")
            .overwriting(),
    )
    .await?;
    let plan = plan_research(ctx, topic, depth).await;
    ctx.emit(
        UpdateEvent::new(PLAN_ID, PipelineStage::Plan, StageStatus::Completed, "Research Plan")
            .with_message(if plan.fallback {
                "Using a single-search fallback plan"
            } else {
                "Research plan created"
            })
            .with_payload(EventPayload::Plan(PlanPayload {
                steps: plan.steps.clone(),
                analyses: plan.analyses.clone(),
                total_steps: plan.total,
            }))
            .overwriting(),
    )
    .await?;
    tracing::info!(
        run = %ctx.run.id,
        steps = plan.steps.len(),
        analyses = plan.analyses.len(),
        fallback = plan.fallback,
        "research plan ready"
    );

    // Searches
    let timeout = ctx.config.step_timeout(depth);
    for step in &plan.steps {
        search(ctx, step.clone(), timeout, false).await?;
    }

    // Analyses
    let mut analyses = Vec::with_capacity(plan.analyses.len());
    for (i, analysis) in plan.analyses.iter().enumerate() {
        let prompt = analysis_prompt(analysis, &ctx.step_context());
        analyses.push(ctx.analyze(format!("analysis-{i}"), analysis.clone(), prompt).await?);
    }

    // Gap analysis
    let gap = gap_analysis(ctx, &analyses).await?;

    // Gap fill and synthesis
    let mut synthesis = None;
    if depth == Depth::Advanced && !gap.knowledge_gaps.is_empty() {
        let queries: Vec<(String, String)> = gap
            .knowledge_gaps
            .iter()
            .flat_map(|g| g.additional_queries.iter().map(move |q| (q.clone(), g.reason.clone())))
            .filter(|(q, _)| !q.trim().is_empty())
            .take(ctx.config.max_gap_steps)
            .collect();
        tracing::info!(run = %ctx.run.id, searches = queries.len(), "filling knowledge gaps");
        for (query, reason) in queries {
            let id = ctx.run.next_id("gap-search");
            let step = StepDefinition::web_search(id, query, reason, 3).with_result_limit(GAP_SEARCH_LIMIT);
            search(ctx, step, timeout, true).await?;
        }

        let followup = RequiredAnalysis {
            kind: "gap follow-up".to_string(),
            description: "Assess what the additional searches add about the identified knowledge gaps"
                .to_string(),
            importance: 3,
        };
        let prompt = analysis_prompt(&followup, &ctx.step_context());
        analyses.push(ctx.analyze(GAP_FOLLOWUP_ID.to_string(), followup, prompt).await?);

        synthesis = Some(synthesize(ctx, &gap).await?);
    }

    ctx.emit(
        UpdateEvent::new(PROGRESS_ID, PipelineStage::GapSynthesis, StageStatus::Completed, "Research Progress")
            .with_message("Research complete")
            .with_payload(EventPayload::Progress(ProgressPayload {
                completed_steps: plan.total,
                total_steps: plan.total,
                is_complete: true,
            }))
            .overwriting(),
    )
    .await?;

    let limitations = dedupe(
        ctx.failure_limitation()
            .into_iter()
            .chain(gap.limitations.iter().map(|l| l.description.clone()))
            .chain(analyses.iter().flat_map(|a| a.limitations.iter().cloned())),
    );

    Ok(FinalResult {
        topic: topic.to_string(),
        plan: PlanRecord {
            steps: plan.steps,
            analyses: plan.analyses,
            fallback: plan.fallback,
        },
        step_results: Vec::new(),
        analyses,
        limitations,
        recommendations: gap.recommended_followup,
        gaps: gap.knowledge_gaps,
        synthesis,
        summary: None,
    })
}

struct Planned {
    steps: Vec<StepDefinition>,
    analyses: Vec<RequiredAnalysis>,
    fallback: bool,
    /// Steps plus analyses plus closing stages
    total: usize,
}

async fn plan_research(ctx: &RunContext, topic: &str, depth: Depth) -> Planned {
    let generated = ctx.generate::<ResearchPlan>(plan_prompt(topic), MIN_TEMPERATURE).await;
    let (mut plan, fallback) = if generated.is_degraded() || generated.value.search_queries.is_empty() {
        tracing::warn!(run = %ctx.run.id, recovery = %generated.recovery, "using fallback research plan");
        (ResearchPlan::fallback(topic), true)
    } else {
        (generated.value, false)
    };
    if plan.required_analyses.is_empty() {
        plan.required_analyses = ResearchPlan::fallback(topic).required_analyses;
    }

    let mut queries = plan.search_queries;
    // Priority 1 is the most important
    queries.sort_by_key(|q| q.priority);
    queries.truncate(ctx.config.max_plan_steps);
    let steps: Vec<StepDefinition> = queries
        .into_iter()
        .enumerate()
        .map(|(i, q)| StepDefinition::web_search(format!("search-web-{i}"), q.query, q.rationale, q.priority))
        .collect();

    let closing = match depth {
        Depth::Basic => 1,
        Depth::Advanced => 2,
    };
    let total = steps.len() + plan.required_analyses.len() + closing;
    Planned {
        steps,
        analyses: plan.required_analyses,
        fallback,
        total,
    }
}

async fn search(
    ctx: &mut RunContext,
    step: StepDefinition,
    timeout: std::time::Duration,
    gap_fill: bool,
) -> Result<StepResult, PipelineError> {
    ctx.ensure_active()?;
    let query = step.text().to_string();
    let (title, message) = if gap_fill {
        (
            format!("Additional search for \"{query}\""),
            format!("Searching to fill knowledge gap: {}", step.rationale()),
        )
    } else {
        (format!("Searching the web for \"{query}\""), "Searching web sources...".to_string())
    };
    ctx.emit(UpdateEvent::new(&step.id, PipelineStage::Step, StageStatus::Running, title).with_message(message))
        .await?;

    let id = step.id.clone();
    let result = ctx.execute(step, timeout).await;
    let event = if result.success {
        UpdateEvent::new(&id, PipelineStage::Step, StageStatus::Completed, format!("Searched the web for \"{query}\""))
            .with_message(format!("Found {} results", result.item_count()))
    } else {
        let reason = result
            .remediation
            .clone()
            .or_else(|| result.error.clone())
            .unwrap_or_default();
        UpdateEvent::new(&id, PipelineStage::Step, StageStatus::Failed, format!("Search for \"{query}\" failed"))
            .with_message(reason)
    };
    ctx.emit(event.with_payload(step_payload(&result)).overwriting()).await?;
    Ok(result)
}

async fn gap_analysis(
    ctx: &mut RunContext,
    analyses: &[AnalysisOutcome],
) -> Result<GapAnalysis, PipelineError> {
    ctx.ensure_active()?;
    ctx.emit(
        UpdateEvent::new(GAP_ID, PipelineStage::GapSynthesis, StageStatus::Running, "Research Gaps and Limitations")
            .with_message("Analyzing research gaps and limitations...")
            .overwriting(),
    )
    .await?;

    let prompt = gap_prompt(&ctx.step_context(), analyses);
    let generated = ctx.generate::<GapAnalysis>(prompt, MIN_TEMPERATURE).await;
    let (gap, title, message) = if generated.is_degraded() {
        tracing::warn!(run = %ctx.run.id, "gap analysis degraded to fallback");
        (
            GapAnalysis::fallback(),
            "Research Gaps and Limitations (simplified)",
            "Identified research limitations (simplified analysis)".to_string(),
        )
    } else {
        let gap = generated.value;
        let message = format!(
            "Identified {} limitations and {} knowledge gaps",
            gap.limitations.len(),
            gap.knowledge_gaps.len()
        );
        (gap, "Research Gaps and Limitations", message)
    };

    ctx.emit(
        UpdateEvent::new(GAP_ID, PipelineStage::GapSynthesis, StageStatus::Completed, title)
            .with_message(message)
            .with_payload(EventPayload::Synthesis(SynthesisPayload {
                findings: gap.limitation_findings(),
                gaps: gap.knowledge_gaps.clone(),
                recommendations: gap.recommended_followup.clone(),
                uncertainties: Vec::new(),
            }))
            .overwriting(),
    )
    .await?;
    Ok(gap)
}

async fn synthesize(ctx: &mut RunContext, gap: &GapAnalysis) -> Result<Synthesis, PipelineError> {
    ctx.ensure_active()?;
    ctx.emit(
        UpdateEvent::new(SYNTHESIS_ID, PipelineStage::GapSynthesis, StageStatus::Running, "Final Research Synthesis")
            .with_message("Synthesizing all research findings...")
            .overwriting(),
    )
    .await?;

    let prompt = synthesis_prompt(&ctx.step_context(), gap);
    let generated = ctx.generate::<Synthesis>(prompt, MIN_TEMPERATURE).await;
    let (synthesis, title, message) = if generated.is_degraded() {
        tracing::warn!(run = %ctx.run.id, "synthesis degraded to fallback");
        (
            Synthesis::fallback(),
            "Final Research Synthesis (simplified)",
            "Synthesized findings with limited results".to_string(),
        )
    } else {
        let synthesis = generated.value;
        let message = format!("Synthesized {} key findings", synthesis.key_findings.len());
        (synthesis, "Final Research Synthesis", message)
    };

    ctx.emit(
        UpdateEvent::new(SYNTHESIS_ID, PipelineStage::GapSynthesis, StageStatus::Completed, title)
            .with_message(message)
            .with_payload(EventPayload::Synthesis(SynthesisPayload {
                findings: synthesis.findings(),
                uncertainties: synthesis.remaining_uncertainties.clone(),
                ..SynthesisPayload::default()
            }))
            .overwriting(),
    )
    .await?;
    Ok(synthesis)
}

fn plan_prompt(topic: &str) -> String {
    let today = chrono::Local::now().format("%A, %B %-d, %Y");
    format!(
        r#"Create a focused research plan for the topic: "{topic}".

Today's date and day of the week: {today}

Keep the plan concise but comprehensive, with:
- 1-4 targeted search queries (all using web search only)
- 1-2 key analyses to perform
- Prioritize the most important aspects to investigate

Use whole numbers between 1 and 5 for priority and importance.
All search queries MUST use "source": "web".
Consider different angles and potential controversies, but keep focus on the core aspects."#
    )
}

fn analysis_prompt(analysis: &RequiredAnalysis, context: &str) -> String {
    format!(
        "Perform a {} analysis on the search results. {}\n\
         Consider all sources and their reliability.\n\
         Each finding needs an insight, a list of evidence strings and a confidence between 0 and 1.\n\n\
         Search results: {context}",
        analysis.kind, analysis.description
    )
}

fn gap_prompt(context: &str, analyses: &[AnalysisOutcome]) -> String {
    let planned: Vec<&RequiredAnalysis> = analyses.iter().map(|a| &a.analysis).collect();
    let planned = serde_json::to_string(&planned).unwrap_or_default();
    format!(
        "Analyze the research results and identify limitations, knowledge gaps, and recommended follow-up actions.\n\
         Consider:\n\
         - Quality and reliability of sources\n\
         - Missing perspectives or data\n\
         - Areas needing deeper investigation\n\
         - Potential biases or conflicts\n\n\
         Severity and priority are whole numbers between 2 and 10.\n\n\
         Research results: {context}\n\
         Analyses performed: {planned}"
    )
}

fn synthesis_prompt(context: &str, gap: &GapAnalysis) -> String {
    let gap = serde_json::to_string(gap).unwrap_or_default();
    format!(
        "Synthesize all research findings, including gap analysis and follow-up research.\n\
         Highlight key conclusions and remaining uncertainties.\n\n\
         Research results: {context}\n\
         Gap analysis: {gap}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_prompt_quotes_topic() {
        let prompt = plan_prompt("impact of remote work on productivity");
        assert!(prompt.contains("\"impact of remote work on productivity\""));
    }

    #[test]
    fn analysis_prompt_embeds_context() {
        let analysis = RequiredAnalysis {
            kind: "comparative".into(),
            description: "Compare studies".into(),
            importance: 3,
        };
        let prompt = analysis_prompt(&analysis, "[]");
        assert!(prompt.starts_with("Perform a comparative analysis"));
        assert!(prompt.ends_with("Search results: []"));
    }
}
