//! Data-analysis runs against scripted collaborators

use delve_pipeline::prelude::*;
use delve_pipeline::{EventPayload, PipelineStage, RunStatus, StepError, StepKind, TableContext};
use delve_test_utils::{fixtures, CallKind, ScriptedExecutor, ScriptedModelCaller};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn sales_table() -> TableContext {
    TableContext::new("sales")
        .with_column("region", "text", None)
        .with_column("amount", "numeric", Some(2))
}

#[tokio::test]
async fn missing_column_gets_a_hint_and_the_run_completes() {
    let caller = Arc::new(
        ScriptedModelCaller::new()
            .with_json(
                CallKind::DataPlan,
                &fixtures::data_plan(&[
                    r#"SELECT "revenue" FROM "sales""#,
                    r#"SELECT "region", SUM("amount") FROM "sales" GROUP BY "region""#,
                ]),
            )
            .with_json(CallKind::Analysis, &fixtures::analysis("West leads"))
            .with_json(CallKind::DataSummary, &fixtures::data_summary("Sales concentrate in the West.")),
    );
    let executor = Arc::new(ScriptedExecutor::new().with_failure(
        "revenue",
        StepError::Query(r#"column "revenue" does not exist"#.into()),
    ));

    let (events, outcome) = Orchestrator::new(caller.clone(), executor.clone())
        .spawn_data_analysis(DataRequest::new("Which region sells most?").with_table(sales_table()))
        .finish()
        .await;
    let outcome = outcome.expect("run completes");
    assert_eq!(outcome.status, RunStatus::CompletedWithFailures);

    let failed = outcome.timeline.get("query-0").expect("first query row");
    assert_eq!(failed.status, StageStatus::Failed);
    assert!(failed.message.contains(r#"Column "revenue" doesn't exist"#));
    assert_eq!(
        outcome.result.step_results[0].remediation.as_deref(),
        Some(r#"Column "revenue" doesn't exist. Check the column name and quotes."#)
    );

    let queries = outcome.timeline.get("query-execution").expect("queries row");
    assert_eq!(queries.status, StageStatus::Completed);
    assert_eq!(queries.message, "Retrieved data from 1/2 queries");
    // One row for the stage, however many updates it received
    assert!(events.iter().filter(|e| e.id == "query-execution").count() > 2);
    assert_eq!(
        outcome.timeline.events().iter().filter(|e| e.id == "query-execution").count(),
        1
    );

    let result = outcome.result;
    assert_eq!(result.summary.as_deref(), Some("Sales concentrate in the West."));
    assert_eq!(result.gaps.len(), 1);
    assert_eq!(result.gaps[0].additional_queries, vec![r#"SELECT "revenue" FROM "sales""#.to_string()]);
    assert!(result.limitations[0].starts_with("1 of 2 steps failed"));
    assert_eq!(result.recommendations[1].priority, 2);
}

#[tokio::test]
async fn plan_prompt_describes_the_table() {
    let caller = Arc::new(
        ScriptedModelCaller::new().with_json(CallKind::DataPlan, &fixtures::data_plan(&[r#"SELECT * FROM "sales""#])),
    );
    let executor = Arc::new(ScriptedExecutor::new());

    let (_, outcome) = Orchestrator::new(caller.clone(), executor.clone())
        .spawn_data_analysis(DataRequest::new("What is in here?").with_table(sales_table()))
        .finish()
        .await;
    outcome.expect("run completes");

    let plan_call = &caller.calls()[0];
    assert!(plan_call.prompt.contains("table name: sales"));
    assert!(plan_call.prompt.contains("- amount (numeric, 2 missing values)"));
    assert!(plan_call.prompt.contains("- region (text)"));
}

#[tokio::test]
async fn degraded_plan_samples_the_table() {
    let caller = Arc::new(ScriptedModelCaller::new());
    let executor = Arc::new(ScriptedExecutor::new());

    let (events, outcome) = Orchestrator::new(caller.clone(), executor.clone())
        .spawn_data_analysis(DataRequest::default().with_table(TableContext::new("orders")))
        .finish()
        .await;
    let outcome = outcome.expect("run completes");

    assert_eq!(outcome.result.topic, r#"Describe the contents of table "orders""#);
    assert!(outcome.result.plan.fallback);
    let StepKind::Query { sql, .. } = &outcome.result.plan.steps[0].kind else {
        panic!("expected a query step");
    };
    assert_eq!(sql, r#"SELECT * FROM "orders" LIMIT 50"#);

    // Analyses are announced before queries run
    let pending = events
        .iter()
        .position(|e| e.id == "analysis-0" && e.status == StageStatus::Pending)
        .expect("pending analysis row");
    let first_query = events.iter().position(|e| e.id == "query-0").expect("query row");
    assert!(pending < first_query);

    let summary = outcome.timeline.get("final-analysis").expect("summary row");
    assert_eq!(summary.stage, PipelineStage::GapSynthesis);
    assert_eq!(summary.status, StageStatus::Completed);
    let Some(EventPayload::Synthesis(payload)) = &summary.payload else {
        panic!("summary payload missing");
    };
    assert!(payload.findings[0].insight.contains("technical difficulties"));
    assert!(outcome.result.summary.is_none());
}

#[tokio::test]
async fn request_without_question_or_table_fails_setup() {
    let caller = Arc::new(ScriptedModelCaller::new());
    let executor = Arc::new(ScriptedExecutor::new());

    let (events, outcome) = Orchestrator::new(caller.clone(), executor.clone())
        .spawn_data_analysis(DataRequest::default())
        .finish()
        .await;

    assert!(matches!(outcome, Err(PipelineError::Setup(_))));
    assert!(caller.calls().is_empty());
    // Only the failed plan row, no dangling pending rows
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "plan-design");
    assert_eq!(events[0].status, StageStatus::Failed);
}
