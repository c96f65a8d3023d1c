//! Final run results

use crate::executor::{StepDefinition, StepResult};
use crate::run::RunStatus;
use crate::timeline::Timeline;
use crate::types::{Finding, Followup, KnowledgeGap, RequiredAnalysis, Synthesis};
use delve_generation::Recovery;
use serde::Serialize;

/// Plan as executed
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlanRecord {
    /// Steps in execution order
    pub steps: Vec<StepDefinition>,
    /// Planned analyses
    pub analyses: Vec<RequiredAnalysis>,
    /// Whether the built-in fallback plan was used
    pub fallback: bool,
}

/// Outcome of one planned analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    /// Timeline id
    pub id: String,
    /// Analysis from the plan
    pub analysis: RequiredAnalysis,
    /// Findings, possibly a single fallback finding
    pub findings: Vec<Finding>,
    /// Implications
    pub implications: Vec<String>,
    /// Limitations reported by the model
    pub limitations: Vec<String>,
    /// Ladder rung that produced the result
    pub recovery: Recovery,
}

impl AnalysisOutcome {
    /// Whether fallback content replaced the model result
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.recovery.is_degraded()
    }
}

/// Plain record returned once a run completes
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FinalResult {
    /// Topic or question
    pub topic: String,
    /// Plan as executed
    pub plan: PlanRecord,
    /// Every step outcome, failed ones included
    pub step_results: Vec<StepResult>,
    /// Per-analysis findings
    pub analyses: Vec<AnalysisOutcome>,
    /// Limitations, including step failures
    pub limitations: Vec<String>,
    /// Recommended follow-up
    pub recommendations: Vec<Followup>,
    /// Knowledge gaps
    pub gaps: Vec<KnowledgeGap>,
    /// Final synthesis, advanced research only
    pub synthesis: Option<Synthesis>,
    /// Closing overview, data analysis only
    pub summary: Option<String>,
}

impl FinalResult {
    /// Successful step count
    #[must_use]
    pub fn succeeded_steps(&self) -> usize {
        self.step_results.iter().filter(|s| s.success).count()
    }

    /// Failed step count
    #[must_use]
    pub fn failed_steps(&self) -> usize {
        self.step_results.len() - self.succeeded_steps()
    }

    /// All findings across analyses
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.analyses.iter().flat_map(|a| a.findings.iter())
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Final result
    pub result: FinalResult,
    /// Final timeline
    pub timeline: Timeline,
    /// Final status
    pub status: RunStatus,
}
