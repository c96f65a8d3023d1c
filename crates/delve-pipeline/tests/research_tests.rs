//! End-to-end research runs against scripted collaborators

use delve_generation::ModelError;
use delve_pipeline::prelude::*;
use delve_pipeline::{EventPayload, RunStatus, StepError, StepKind};
use delve_test_utils::{fixtures, CallKind, ScriptedExecutor, ScriptedModelCaller};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const TOPIC: &str = "impact of remote work on productivity";

fn orchestrator(caller: &Arc<ScriptedModelCaller>, executor: &Arc<ScriptedExecutor>) -> Orchestrator {
    Orchestrator::new(caller.clone(), executor.clone())
}

#[tokio::test]
async fn failed_search_degrades_instead_of_aborting() {
    let caller = Arc::new(
        ScriptedModelCaller::new()
            .with_json(
                CallKind::ResearchPlan,
                &fixtures::research_plan(&["remote work productivity studies", "remote work collaboration"]),
            )
            .with_json(CallKind::GapAnalysis, &fixtures::gap_analysis(&["long-term remote work"])),
    );
    let executor = Arc::new(
        ScriptedExecutor::new().with_failure("collaboration", StepError::Network("connection reset".into())),
    );

    let (events, outcome) = orchestrator(&caller, &executor)
        .spawn_research(ResearchRequest::new(TOPIC))
        .finish()
        .await;
    let outcome = outcome.expect("run completes");
    assert_eq!(outcome.status, RunStatus::CompletedWithFailures);

    let failed = outcome.timeline.get("search-web-1").expect("second search row");
    assert_eq!(failed.status, StageStatus::Failed);
    assert!(events
        .iter()
        .any(|e| e.id == "search-web-1" && e.status == StageStatus::Failed));

    // No analysis script: the analysis degrades to one fallback finding
    let analysis = outcome.timeline.get("analysis-0").expect("analysis row");
    assert_eq!(analysis.status, StageStatus::Completed);
    let Some(EventPayload::Analysis(payload)) = &analysis.payload else {
        panic!("analysis payload missing: {:?}", analysis.payload);
    };
    assert_eq!(payload.findings.len(), 1);
    assert!(payload.findings[0].insight.contains("technical difficulties"));
    assert!(payload.findings[0].confidence <= 0.5);

    let result = outcome.result;
    assert_eq!(result.topic, TOPIC);
    assert_eq!(result.failed_steps(), 1);
    assert!(result.limitations[0].starts_with("1 of 2 steps failed"));
    assert!(result.limitations[0].contains("remote work collaboration"));
    assert!(result.analyses[0].is_fallback());
    assert!(result.synthesis.is_none());
}

#[tokio::test]
async fn half_the_steps_failing_still_reaches_closing_stages() {
    let caller = Arc::new(
        ScriptedModelCaller::new()
            .with_json(CallKind::ResearchPlan, &fixtures::research_plan(&["alpha", "beta", "gamma", "delta"]))
            .with_json(CallKind::Analysis, &fixtures::analysis("Output per hour rose"))
            .with_json(CallKind::GapAnalysis, &fixtures::gap_analysis(&[])),
    );
    let executor = Arc::new(
        ScriptedExecutor::new()
            .with_failure("beta", StepError::Timeout { secs: 15 })
            .with_failure("delta", StepError::Failed("quota exceeded".into())),
    );

    let (_, outcome) = orchestrator(&caller, &executor)
        .spawn_research(ResearchRequest::new(TOPIC))
        .finish()
        .await;
    let outcome = outcome.expect("run completes");

    assert_eq!(executor.executed().len(), 4);
    assert_eq!(outcome.result.succeeded_steps(), 2);
    assert_eq!(outcome.timeline.get("analysis-0").map(|e| e.status), Some(StageStatus::Completed));
    assert_eq!(outcome.timeline.get("gap-analysis").map(|e| e.status), Some(StageStatus::Completed));
    assert!(outcome.result.limitations[0].starts_with("2 of 4 steps failed"));
    assert!(outcome.result.findings().any(|f| f.insight == "Output per hour rose"));
}

#[tokio::test]
async fn overwrite_events_keep_one_row_per_stage() {
    let caller = Arc::new(
        ScriptedModelCaller::new().with_json(CallKind::ResearchPlan, &fixtures::research_plan(&["remote work"])),
    );
    let executor = Arc::new(ScriptedExecutor::new());

    let (events, outcome) = orchestrator(&caller, &executor)
        .spawn_research(ResearchRequest::new(TOPIC))
        .finish()
        .await;
    let timeline = outcome.expect("run completes").timeline;

    let search_events: Vec<_> = events.iter().filter(|e| e.id == "search-web-0").collect();
    assert_eq!(search_events.len(), 2);
    assert!(!search_events[0].overwrite);
    assert!(search_events[1].overwrite);
    assert_eq!(timeline.events().iter().filter(|e| e.id == "search-web-0").count(), 1);
    assert_eq!(timeline.get("search-web-0").map(|e| e.status), Some(StageStatus::Completed));

    // Every row ends terminal
    assert!(timeline.events().iter().all(|e| e.status.is_terminal()));
    assert_eq!(timeline.events()[0].id, "research-plan");
}

#[tokio::test]
async fn unusable_plan_falls_back_to_topic_search() {
    let caller = Arc::new(
        ScriptedModelCaller::new().with_failure(CallKind::ResearchPlan, ModelError::Transport("down".into())),
    );
    let executor = Arc::new(ScriptedExecutor::new());

    let (_, outcome) = orchestrator(&caller, &executor)
        .spawn_research(ResearchRequest::new(TOPIC))
        .finish()
        .await;
    let result = outcome.expect("run completes").result;

    assert!(result.plan.fallback);
    assert_eq!(result.plan.steps.len(), 1);
    assert_eq!(result.plan.steps[0].text(), TOPIC);
    assert_eq!(result.plan.analyses[0].kind, "overview");
    assert_eq!(executor.executed(), vec!["search-web-0".to_string()]);
}

#[tokio::test]
async fn most_important_queries_run_first_and_survive_truncation() {
    let plan = json!({
        "search_queries": [
            { "query": "office rent trends", "rationale": "Side note", "source": "web", "priority": 5 },
            { "query": "remote work output studies", "rationale": "Core question", "source": "web", "priority": 1 },
            { "query": "hybrid schedules", "rationale": "Context", "source": "web", "priority": 3 }
        ],
        "required_analyses": [
            { "type": "trend", "description": "Identify trends", "importance": 4 }
        ]
    });
    let caller = Arc::new(ScriptedModelCaller::new().with_json(CallKind::ResearchPlan, &plan));
    let executor = Arc::new(ScriptedExecutor::new());
    let config = PipelineConfig::default().with_max_plan_steps(2);

    let (_, outcome) = orchestrator(&caller, &executor)
        .with_config(config)
        .spawn_research(ResearchRequest::new(TOPIC))
        .finish()
        .await;
    let result = outcome.expect("run completes").result;

    let queries: Vec<&str> = result.plan.steps.iter().map(|s| s.text()).collect();
    assert_eq!(queries, vec!["remote work output studies", "hybrid schedules"]);
    assert_eq!(executor.executed(), vec!["search-web-0".to_string(), "search-web-1".to_string()]);
    let StepKind::WebSearch { result_limit, .. } = &result.plan.steps[0].kind else {
        panic!("expected a web search step");
    };
    assert_eq!(*result_limit, 5);
}

#[tokio::test]
async fn advanced_depth_caps_gap_fill_and_synthesizes() {
    let caller = Arc::new(
        ScriptedModelCaller::new()
            .with_json(CallKind::ResearchPlan, &fixtures::research_plan(&["remote work"]))
            .with_json(CallKind::Analysis, &fixtures::analysis("Commutes shrink"))
            .with_json(CallKind::GapAnalysis, &fixtures::gap_analysis(&["g1", "g2", "g3", "g4", "g5"]))
            .with_json(CallKind::Synthesis, &fixtures::synthesis()),
    );
    let executor = Arc::new(ScriptedExecutor::new());
    let config = PipelineConfig::default().with_max_gap_steps(3);

    let (_, outcome) = orchestrator(&caller, &executor)
        .with_config(config)
        .spawn_research(ResearchRequest::new(TOPIC).with_depth(Depth::Advanced))
        .finish()
        .await;
    let outcome = outcome.expect("run completes");

    let gap_steps: Vec<String> = executor
        .executed()
        .into_iter()
        .filter(|id| id.starts_with("gap-search"))
        .collect();
    assert_eq!(gap_steps, vec!["gap-search-0", "gap-search-1", "gap-search-2"]);
    assert_eq!(caller.count(CallKind::Synthesis), 1);
    assert_eq!(caller.count(CallKind::Analysis), 2);

    let synthesis = outcome.result.synthesis.expect("synthesis at advanced depth");
    assert_eq!(synthesis.key_findings[0].finding, "Productivity holds steady");
    assert_eq!(outcome.timeline.get("final-synthesis").map(|e| e.status), Some(StageStatus::Completed));
    assert_eq!(outcome.result.recommendations[0].action, "Review longitudinal studies");
}

#[tokio::test]
async fn blank_topic_is_a_setup_failure() {
    let caller = Arc::new(ScriptedModelCaller::new());
    let executor = Arc::new(ScriptedExecutor::new());

    let (events, outcome) = orchestrator(&caller, &executor)
        .spawn_research(ResearchRequest::new("   "))
        .finish()
        .await;

    assert!(matches!(outcome, Err(PipelineError::Setup(_))));
    assert_eq!(events.last().map(|e| e.status), Some(StageStatus::Failed));
    assert!(caller.calls().is_empty());
    assert!(executor.executed().is_empty());
}

#[tokio::test]
async fn dropping_the_consumer_cancels_the_run() {
    let caller = Arc::new(
        ScriptedModelCaller::new().with_json(CallKind::ResearchPlan, &fixtures::research_plan(&["a", "b", "c", "d"])),
    );
    let executor = Arc::new(ScriptedExecutor::new());
    let config = PipelineConfig::default().with_channel_capacity(1);

    let mut handle = orchestrator(&caller, &executor)
        .with_config(config)
        .spawn_research(ResearchRequest::new(TOPIC));
    while let Some(event) = handle.next_event().await {
        if event.id == "research-plan" && event.status == StageStatus::Completed {
            break;
        }
    }

    let outcome = handle.cancel().await;
    assert!(matches!(outcome, Err(PipelineError::Cancelled)));
    assert!(executor.executed().len() < 4);
}

#[tokio::test(start_paused = true)]
async fn slow_steps_time_out() {
    let caller = Arc::new(
        ScriptedModelCaller::new().with_json(CallKind::ResearchPlan, &fixtures::research_plan(&["remote work"])),
    );
    let executor = Arc::new(ScriptedExecutor::new().with_delay(Duration::from_secs(60)));
    let config = PipelineConfig::default().with_step_timeouts(2, 5);

    let (_, outcome) = orchestrator(&caller, &executor)
        .with_config(config)
        .spawn_research(ResearchRequest::new(TOPIC))
        .finish()
        .await;
    let outcome = outcome.expect("run completes");

    let step = &outcome.result.step_results[0];
    assert!(!step.success);
    assert_eq!(step.error.as_deref(), Some("step timed out after 2s"));
    let row = outcome.timeline.get("search-web-0").expect("search row");
    assert_eq!(row.status, StageStatus::Failed);
    assert!(row.message.contains("did not answer in time"));
}

#[tokio::test]
async fn events_stream_in_emission_order() {
    use futures::StreamExt;

    let caller = Arc::new(
        ScriptedModelCaller::new().with_json(CallKind::ResearchPlan, &fixtures::research_plan(&["remote work"])),
    );
    let executor = Arc::new(ScriptedExecutor::new());

    let (stream, task) = orchestrator(&caller, &executor)
        .spawn_research(ResearchRequest::new(TOPIC))
        .into_stream();
    let events: Vec<UpdateEvent> = stream.collect().await;
    let outcome = task.join().await.expect("run completes");

    assert_eq!(events.first().map(|e| e.status), Some(StageStatus::Pending));
    assert_eq!(events.last().map(|e| e.id.as_str()), Some("research-progress"));
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(outcome.timeline.len(), outcome.timeline.events().len());
}
