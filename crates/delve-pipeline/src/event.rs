//! Progress events
//!
//! An [`UpdateEvent`] is one row of a run's timeline. Rows that carry
//! `overwrite = true` replace an earlier row with the same id in place,
//! so a stage's pending, running and completed states read as one
//! evolving row.

use crate::executor::{StepDefinition, StepOutput};
use crate::types::{Finding, Followup, KnowledgeGap, RequiredAnalysis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stage an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Plan generation
    Plan,
    /// Search or query execution
    Step,
    /// Per-analysis synthesis of findings
    Analysis,
    /// Gap analysis, final synthesis or summary
    GapSynthesis,
}

/// Lifecycle state of a stage instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Announced, not started
    Pending,
    /// In progress
    Running,
    /// Finished, possibly with fallback content
    Completed,
    /// Finished without a result
    Failed,
}

impl StageStatus {
    /// Whether no further transitions are expected
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Plan contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPayload {
    /// Steps in execution order
    pub steps: Vec<StepDefinition>,
    /// Planned analyses
    pub analyses: Vec<RequiredAnalysis>,
    /// Steps plus analyses plus closing stages
    pub total_steps: usize,
}

/// Step progress or outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPayload {
    /// Query or SQL text
    pub query: String,
    /// Output on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
    /// Error text on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Suggested fix on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// Findings of one analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    /// Analysis kind from the plan
    pub analysis_type: String,
    /// Findings
    pub findings: Vec<Finding>,
}

/// Closing-stage content
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SynthesisPayload {
    /// Findings
    pub findings: Vec<Finding>,
    /// Knowledge gaps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<KnowledgeGap>,
    /// Recommended follow-up
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<Followup>,
    /// Open questions or limitations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uncertainties: Vec<String>,
}

/// Overall progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Finished units of work
    pub completed_steps: usize,
    /// Total units of work
    pub total_steps: usize,
    /// Whether the run has finished
    pub is_complete: bool,
}

/// Typed event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Plan contents
    Plan(PlanPayload),
    /// Step progress or outcome
    Step(StepPayload),
    /// Analysis findings
    Analysis(AnalysisPayload),
    /// Gap analysis, synthesis or summary
    Synthesis(SynthesisPayload),
    /// Overall progress
    Progress(ProgressPayload),
}

/// One timeline row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Row id; stable across a stage's transitions
    pub id: String,
    /// Stage the row belongs to
    pub stage: PipelineStage,
    /// Current status
    pub status: StageStatus,
    /// Short title
    pub title: String,
    /// Human-readable message
    pub message: String,
    /// Typed content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
    /// Emission time
    pub timestamp: DateTime<Utc>,
    /// Replace an earlier row with the same id
    pub overwrite: bool,
}

impl UpdateEvent {
    /// New appending event stamped now
    #[must_use]
    pub fn new(id: impl Into<String>, stage: PipelineStage, status: StageStatus, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage,
            status,
            title: title.into(),
            message: String::new(),
            payload: None,
            timestamp: Utc::now(),
            overwrite: false,
        }
    }

    /// With a message
    #[inline]
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// With a payload
    #[inline]
    #[must_use]
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Mark as replacing an earlier row with the same id
    #[inline]
    #[must_use]
    pub fn overwriting(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_snake_case_tags() {
        let event = UpdateEvent::new("gap-analysis", PipelineStage::GapSynthesis, StageStatus::Running, "Gaps")
            .with_payload(EventPayload::Progress(ProgressPayload {
                completed_steps: 1,
                total_steps: 3,
                is_complete: false,
            }))
            .overwriting();
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["stage"], "gap_synthesis");
        assert_eq!(json["status"], "running");
        assert_eq!(json["payload"]["kind"], "progress");
        assert_eq!(json["overwrite"], true);
    }

    #[test]
    fn terminal_statuses() {
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }
}
