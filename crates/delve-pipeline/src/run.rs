//! Run state
//!
//! A [`Run`] owns its timeline, step results and id generator. Nothing is
//! shared between runs.

use crate::event::{PipelineStage, StageStatus, UpdateEvent};
use crate::executor::StepResult;
use crate::timeline::{Applied, Timeline};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run-scoped monotonic id source
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    /// Fresh generator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id with `prefix`, e.g. `gap-search-0`
    pub fn next_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}-{}", self.next);
        self.next += 1;
        id
    }
}

/// Final state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Stages still executing
    Running,
    /// Every step succeeded
    Completed,
    /// Finished with at least one failed step
    CompletedWithFailures,
    /// Setup failed; no stages ran
    Failed,
    /// Consumer went away
    Cancelled,
}

/// Current view of one stage instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInstance {
    /// Timeline id
    pub id: String,
    /// Stage
    pub stage: PipelineStage,
    /// Latest status
    pub status: StageStatus,
}

/// One end-to-end execution for a single request
#[derive(Debug, Clone)]
pub struct Run {
    /// Run id
    pub id: RunId,
    /// Topic or question
    pub topic: String,
    timeline: Timeline,
    steps: Vec<StepResult>,
    ids: IdGenerator,
    status: RunStatus,
}

impl Run {
    /// New running run
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            topic: topic.into(),
            timeline: Timeline::new(),
            steps: Vec::new(),
            ids: IdGenerator::new(),
            status: RunStatus::Running,
        }
    }

    /// Apply an event to the timeline
    pub fn record(&mut self, event: UpdateEvent) -> Applied {
        self.timeline.apply(event)
    }

    /// Keep a step outcome
    pub fn push_step(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    /// Next transient id with `prefix`
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.ids.next_id(prefix)
    }

    /// Timeline so far
    #[inline]
    #[must_use]
    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Step outcomes in execution order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Failed step outcomes
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| !s.success)
    }

    /// Stage instances in timeline order
    #[must_use]
    pub fn stage_instances(&self) -> Vec<StageInstance> {
        self.timeline
            .events()
            .iter()
            .map(|e| StageInstance {
                id: e.id.clone(),
                stage: e.stage,
                status: e.status,
            })
            .collect()
    }

    /// Current status
    #[inline]
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Mark the run finished, deriving completed vs partial from step outcomes
    pub fn finish(&mut self) -> RunStatus {
        self.status = if self.failed_steps().next().is_some() {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Completed
        };
        self.status
    }

    /// Mark setup failure
    pub fn fail(&mut self) {
        self.status = RunStatus::Failed;
    }

    /// Mark cancellation
    pub fn cancel(&mut self) {
        self.status = RunStatus::Cancelled;
    }

    /// Split into timeline and step outcomes
    #[must_use]
    pub fn into_parts(self) -> (Timeline, Vec<StepResult>) {
        (self.timeline, self.steps)
    }
}
