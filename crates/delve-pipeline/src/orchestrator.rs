//! Run orchestration
//!
//! Each run is a spawned task that owns its state and streams
//! [`UpdateEvent`]s over a bounded channel. The task suspends whenever the
//! channel is full, and it stops at the next stage boundary once the
//! receiver is dropped.

use crate::config::PipelineConfig;
use crate::data::{run_data_analysis, DataRequest};
use crate::error::PipelineError;
use crate::event::UpdateEvent;
use crate::executor::StepExecutor;
use crate::research::{run_research, ResearchRequest};
use crate::result::RunOutcome;
use crate::run::{Run, RunId};
use crate::stages::RunContext;
use delve_generation::{GenerationClient, ModelCaller};
use futures::Stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Starts research and data-analysis runs
#[derive(Clone)]
pub struct Orchestrator {
    client: GenerationClient,
    executor: Arc<dyn StepExecutor>,
    config: PipelineConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create with default configuration
    #[must_use]
    pub fn new(caller: Arc<dyn ModelCaller>, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            client: GenerationClient::new(caller),
            executor,
            config: PipelineConfig::default(),
        }
    }

    /// With configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a research run
    pub fn spawn_research(&self, request: ResearchRequest) -> RunHandle {
        let (run, ctx, events) = self.prepare(request.topic.clone());
        let task = tokio::spawn(
            async move {
                let mut ctx = ctx;
                let result = run_research(&mut ctx, &request).await;
                ctx.finish(result)
            }
            .instrument(tracing::info_span!("run", run_id = %run, variant = "research")),
        );
        RunHandle::new(run, events, task)
    }

    /// Start a data-analysis run
    pub fn spawn_data_analysis(&self, request: DataRequest) -> RunHandle {
        let (run, ctx, events) = self.prepare(request.question());
        let task = tokio::spawn(
            async move {
                let mut ctx = ctx;
                let result = run_data_analysis(&mut ctx, &request).await;
                ctx.finish(result)
            }
            .instrument(tracing::info_span!("run", run_id = %run, variant = "data")),
        );
        RunHandle::new(run, events, task)
    }

    fn prepare(&self, topic: String) -> (RunId, RunContext, mpsc::Receiver<UpdateEvent>) {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let run = Run::new(topic);
        let id = run.id;
        let ctx = RunContext::new(
            run,
            self.config.clone(),
            self.client.clone(),
            Arc::clone(&self.executor),
            tx,
        );
        (id, ctx, rx)
    }
}

/// Spawned run task
#[derive(Debug)]
pub struct RunTask(JoinHandle<Result<RunOutcome, PipelineError>>);

impl RunTask {
    /// Wait for the run to end
    pub async fn join(self) -> Result<RunOutcome, PipelineError> {
        match self.0.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "run task did not complete");
                Err(PipelineError::Cancelled)
            }
        }
    }

    /// Abort the run immediately
    pub fn abort(&self) {
        self.0.abort();
    }
}

/// Handle to one run: its event stream and its final outcome
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    events: mpsc::Receiver<UpdateEvent>,
    task: RunTask,
}

impl RunHandle {
    fn new(run_id: RunId, events: mpsc::Receiver<UpdateEvent>, task: JoinHandle<Result<RunOutcome, PipelineError>>) -> Self {
        Self {
            run_id,
            events,
            task: RunTask(task),
        }
    }

    /// Run id
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Next event in emission order, `None` once the run has ended
    pub async fn next_event(&mut self) -> Option<UpdateEvent> {
        self.events.recv().await
    }

    /// Drain every event, then wait for the outcome
    pub async fn finish(mut self) -> (Vec<UpdateEvent>, Result<RunOutcome, PipelineError>) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        (events, self.task.join().await)
    }

    /// Stop listening; the run ends at its next stage boundary
    pub async fn cancel(self) -> Result<RunOutcome, PipelineError> {
        let Self { events, task, .. } = self;
        drop(events);
        task.join().await
    }

    /// Split into an event stream and the run task
    pub fn into_stream(self) -> (impl Stream<Item = UpdateEvent> + Send, RunTask) {
        let stream = futures::stream::unfold(self.events, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        (stream, self.task)
    }
}
