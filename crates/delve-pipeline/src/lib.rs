//! Delve Pipeline - multi-stage research and data-analysis runs
//!
//! Provides:
//! - [`Orchestrator`]: spawns runs and hands back a [`RunHandle`]
//! - [`ResearchRequest`] / [`DataRequest`]: the two pipeline variants
//! - [`UpdateEvent`] / [`Timeline`]: the streamed progress rows and their
//!   overwrite-by-id view
//! - [`StepExecutor`]: the seam for web search and tabular queries
//! - [`PipelineConfig`]: TOML-loadable limits and timeouts
//!
//! Model and step failures never end a run. They degrade into fallback
//! content and limitations in the [`FinalResult`].
//!
//! # Example
//!
//! ```rust,ignore
//! use delve_pipeline::{Orchestrator, ResearchRequest, Depth};
//!
//! # async fn example(orchestrator: Orchestrator) {
//! let mut handle = orchestrator
//!     .spawn_research(ResearchRequest::new("impact of remote work").with_depth(Depth::Advanced));
//! while let Some(event) = handle.next_event().await {
//!     println!("{} {:?} {}", event.id, event.status, event.title);
//! }
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod data;
pub mod error;
pub mod event;
pub mod executor;
pub mod orchestrator;
pub mod research;
pub mod result;
pub mod run;
mod stages;
pub mod timeline;
pub mod types;

pub use config::{Depth, PipelineConfig};
pub use data::{ColumnInfo, DataRequest, TableContext, DEFAULT_TABLE};
pub use error::{ConfigError, PipelineError};
pub use event::{
    AnalysisPayload, EventPayload, PipelineStage, PlanPayload, ProgressPayload, StageStatus,
    StepPayload, SynthesisPayload, UpdateEvent,
};
pub use executor::{
    remediation_hint, run_step, search_result_limit, SearchHit, StepDefinition, StepError, StepExecutor,
    StepKind, StepOutput, StepResult, GAP_SEARCH_LIMIT,
};
pub use orchestrator::{Orchestrator, RunHandle, RunTask};
pub use research::ResearchRequest;
pub use result::{AnalysisOutcome, FinalResult, PlanRecord, RunOutcome};
pub use run::{IdGenerator, Run, RunId, RunStatus, StageInstance};
pub use timeline::{Applied, Timeline};
pub use types::{
    AnalysisResult, DataPlan, DataSummary, Finding, Followup, GapAnalysis, KeyFinding,
    KnowledgeGap, Limitation, PlannedQuery, QueryOperation, RequiredAnalysis, ResearchPlan,
    SearchQuery, Synthesis,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running pipelines
    pub use crate::{
        DataRequest, Depth, FinalResult, Orchestrator, PipelineConfig, PipelineError,
        PipelineStage, ResearchRequest, RunHandle, StageStatus, StepExecutor, UpdateEvent,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
