//! Workflow Integration Tests
//!
//! Full engine runs against scripted sources and a stub generator:
//! happy path, critical-source failure, the feedback rerun loop with its
//! retry cap, cancellation, and SSE event ordering.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use counterscope::services::llm::{GenerationOutcome, JsonOutcome, LlmRequest, TextGenerator};
use counterscope::services::providers::{DataSource, SourcePayload, SourceQuery};
use counterscope::services::workflow::{
    AnalysisInput, FeedbackInput, FeedbackRating, Stage, WorkflowEvent,
};
use counterscope::utils::error::{AppError, AppResult, ErrorKind};

use crate::support::{engine_with, healthy_sources, sources_with, StubGenerator};

fn input(client: &str, inn: Option<&str>) -> AnalysisInput {
    AnalysisInput {
        session_id: None,
        client_name: client.to_string(),
        inn: inn.map(String::from),
        notes: None,
    }
}

#[tokio::test]
async fn test_happy_path_persists_report() {
    let harness = engine_with(healthy_sources(), Arc::new(StubGenerator));
    let output = harness
        .engine
        .run(input("Acme LLC", Some("7736050003")))
        .await;

    assert_eq!(output.status, Stage::Completed);
    let report = output.report.expect("report produced");
    assert!(report.risk_assessment.score <= 100);
    assert_eq!(report.metadata.sources_used.len(), 5);
    assert!(!report.degraded);

    // Durable report findable by INN with the same denormalized score.
    let stored = harness.reports.get_reports_by_inn("7736050003", 10).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].risk_score, report.risk_assessment.score);

    // Thread snapshot exists and is completed.
    let thread = harness.threads.get(&output.session_id).unwrap().unwrap();
    assert_eq!(
        thread.thread_data.get("stage").and_then(|v| v.as_str()),
        Some("completed")
    );
}

#[tokio::test]
async fn test_both_criticals_down_fails_without_report() {
    let harness = engine_with(
        sources_with(Err("503 after retries"), Err("503 after retries")),
        Arc::new(StubGenerator),
    );
    let output = harness
        .engine
        .run(input("Acme LLC", Some("7736050003")))
        .await;

    assert_eq!(output.status, Stage::Failed);
    let (kind, _message) = output.error.expect("failure recorded");
    assert_eq!(kind, ErrorKind::InsufficientData);

    // No stored report, but the failed thread IS written.
    assert_eq!(harness.reports.count().unwrap(), 0);
    let thread = harness.threads.get(&output.session_id).unwrap().unwrap();
    assert_eq!(
        thread.thread_data.get("stage").and_then(|v| v.as_str()),
        Some("failed")
    );
}

#[tokio::test]
async fn test_missing_client_name_is_invalid_input() {
    let harness = engine_with(healthy_sources(), Arc::new(StubGenerator));
    let output = harness.engine.run(input("   ", None)).await;
    assert_eq!(output.status, Stage::Failed);
    assert_eq!(output.error.unwrap().0, ErrorKind::InvalidInput);
}

/// Generator that counts calls; used to prove the retry cap short-circuits
/// before any LLM work.
struct CountingGenerator {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl TextGenerator for CountingGenerator {
    async fn generate_text(&self, request: &LlmRequest) -> AppResult<GenerationOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StubGenerator.generate_text(request).await
    }
    async fn generate_json(&self, request: &LlmRequest, schema: &Value) -> AppResult<JsonOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StubGenerator.generate_json(request, schema).await
    }
}

#[tokio::test]
async fn test_feedback_rerun_produces_second_report() {
    let harness = engine_with(healthy_sources(), Arc::new(StubGenerator));
    let first = harness
        .engine
        .run(input("Acme LLC", Some("7736050003")))
        .await;
    let first_report_id = first.report_id.clone().unwrap();

    let thread = harness.threads.find_by_report(&first_report_id).unwrap().unwrap();
    let rerun = harness
        .engine
        .rerun_with_feedback(
            thread,
            FeedbackInput {
                rating: FeedbackRating::Inaccurate,
                comment: Some("missed 2023 lawsuit".into()),
                focus_areas: vec![],
            },
        )
        .await
        .unwrap();

    assert_eq!(rerun.status, Stage::Completed);
    let second_report_id = rerun.report_id.unwrap();
    assert_ne!(second_report_id, first_report_id);

    // Both reports share the INN; the thread carries the rerun bookkeeping.
    let by_inn = harness.reports.get_reports_by_inn("7736050003", 10).unwrap();
    assert_eq!(by_inn.len(), 2);

    let thread = harness.threads.find_by_report(&second_report_id).unwrap().unwrap();
    assert_eq!(
        thread.thread_data.get("retry_count").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        thread
            .thread_data
            .get("previous_report_id")
            .and_then(|v| v.as_str()),
        Some(first_report_id.as_str())
    );
    assert!(thread.thread_data.get("previous_report").is_some());
}

#[tokio::test]
async fn test_feedback_focus_areas_run_restricted_collection() {
    let harness = engine_with(healthy_sources(), Arc::new(StubGenerator));
    let first = harness
        .engine
        .run(input("Acme LLC", Some("7736050003")))
        .await;
    let thread = harness
        .threads
        .find_by_report(first.report_id.as_ref().unwrap())
        .unwrap()
        .unwrap();

    let rerun = harness
        .engine
        .rerun_with_feedback(
            thread,
            FeedbackInput {
                rating: FeedbackRating::PartiallyAccurate,
                comment: None,
                focus_areas: vec!["арбитраж 2023".into()],
            },
        )
        .await
        .unwrap();
    assert_eq!(rerun.status, Stage::Completed);

    // The appended focus intent is visible in the updated snapshot.
    let thread = harness
        .threads
        .find_by_report(rerun.report_id.as_ref().unwrap())
        .unwrap()
        .unwrap();
    let plan = thread.thread_data.get("plan").and_then(|v| v.as_array()).unwrap();
    assert!(plan
        .iter()
        .any(|intent| intent.get("query").and_then(|q| q.as_str())
            == Some("Acme LLC арбитраж 2023")
            || intent.get("query").and_then(|q| q.as_str())
                == Some("ООО \"АКМЕ\" арбитраж 2023")));
}

#[tokio::test]
async fn test_feedback_retries_capped_at_three_without_llm_call() {
    let calls = Arc::new(AtomicU32::new(0));
    let harness = engine_with(
        healthy_sources(),
        Arc::new(CountingGenerator { calls: calls.clone() }),
    );

    let mut output = harness
        .engine
        .run(input("Acme LLC", Some("7736050003")))
        .await;

    for round in 1..=3 {
        let thread = harness
            .threads
            .find_by_report(output.report_id.as_ref().unwrap())
            .unwrap()
            .unwrap();
        let rerun = harness
            .engine
            .rerun_with_feedback(
                thread,
                FeedbackInput {
                    rating: FeedbackRating::Inaccurate,
                    comment: Some(format!("round {}", round)),
                    focus_areas: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(rerun.status, Stage::Completed, "round {}", round);
        output = rerun;
    }

    let calls_before_cap = calls.load(Ordering::SeqCst);
    let thread = harness
        .threads
        .find_by_report(output.report_id.as_ref().unwrap())
        .unwrap()
        .unwrap();
    let exhausted = harness
        .engine
        .rerun_with_feedback(
            thread,
            FeedbackInput {
                rating: FeedbackRating::Inaccurate,
                comment: Some("round 4".into()),
                focus_areas: vec![],
            },
        )
        .await;

    assert!(exhausted.is_err(), "fourth rerun must be rejected");
    // No additional LLM call was made for the rejected round.
    assert_eq!(calls.load(Ordering::SeqCst), calls_before_cap);

    // The session is marked failed with the retry-exhausted marker.
    let thread = harness.threads.get(&output.session_id).unwrap().unwrap();
    assert_eq!(
        thread.thread_data.get("stage").and_then(|v| v.as_str()),
        Some("failed")
    );
    assert!(thread
        .thread_data
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap()
        .contains("retry limit exhausted"));
}

/// Source that never finishes inside the test window; used to park the
/// workflow so cancellation can land.
struct SlowSource;

#[async_trait]
impl DataSource for SlowSource {
    fn name(&self) -> &'static str {
        "tavily"
    }
    fn is_critical(&self) -> bool {
        false
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
    fn is_configured(&self) -> bool {
        true
    }
    async fn fetch(&self, _query: &SourceQuery) -> AppResult<SourcePayload> {
        tokio::time::sleep(Duration::from_secs(20)).await;
        Err(AppError::transport("unreachable"))
    }
    async fn healthcheck(&self, _timeout: Duration) -> AppResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_cancellation_fails_the_session() {
    let harness = engine_with(vec![Arc::new(SlowSource)], Arc::new(StubGenerator));
    let prepared = harness.engine.prepare(input("Acme LLC", None));
    let session_id = prepared.session_id.clone();

    let engine = harness.engine.clone();
    let run = tokio::spawn(async move { engine.execute(prepared).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.engine.cancel_session(&session_id));

    let output = run.await.unwrap();
    assert_eq!(output.status, Stage::Failed);
    assert_eq!(output.error.unwrap().0, ErrorKind::Cancelled);
}

/// Generator that parks inside the cascade call, standing in for a slow
/// LLM provider chain.
struct SlowGenerator;

#[async_trait]
impl TextGenerator for SlowGenerator {
    async fn generate_text(&self, _request: &LlmRequest) -> AppResult<GenerationOutcome> {
        tokio::time::sleep(Duration::from_secs(20)).await;
        Err(AppError::LlmUnavailable("unreachable".into()))
    }
    async fn generate_json(&self, _request: &LlmRequest, _schema: &Value) -> AppResult<JsonOutcome> {
        tokio::time::sleep(Duration::from_secs(20)).await;
        Err(AppError::LlmUnavailable("unreachable".into()))
    }
}

#[tokio::test]
async fn test_cancellation_lands_during_analysis() {
    // Sources resolve instantly, so by the time the cancel fires the run
    // is parked inside the LLM call.
    let harness = engine_with(healthy_sources(), Arc::new(SlowGenerator));
    let prepared = harness.engine.prepare(input("Acme LLC", Some("7736050003")));
    let session_id = prepared.session_id.clone();

    let engine = harness.engine.clone();
    let run = tokio::spawn(async move { engine.execute(prepared).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.engine.cancel_session(&session_id));

    let output = run.await.unwrap();
    assert_eq!(output.status, Stage::Failed);
    assert_eq!(output.error.unwrap().0, ErrorKind::Cancelled);

    // Nothing was persisted for the aborted run.
    assert_eq!(harness.reports.count().unwrap(), 0);
    let thread = harness.threads.get(&session_id).unwrap().unwrap();
    assert_eq!(
        thread.thread_data.get("stage").and_then(|v| v.as_str()),
        Some("failed")
    );
}

#[tokio::test]
async fn test_sse_event_order_happy_path() {
    let harness = engine_with(healthy_sources(), Arc::new(StubGenerator));
    let prepared = harness.engine.prepare(input("Acme LLC", Some("7736050003")));
    let mut rx = prepared.subscribe();

    let output = harness.engine.execute(prepared).await;
    assert_eq!(output.status, Stage::Completed);

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.sse_name());
    }

    assert_eq!(names[0], "start");
    assert_eq!(names[1], "progress");
    assert_eq!(names[2], "orchestrator");
    let source_results = names.iter().filter(|n| **n == "source_result").count();
    assert_eq!(source_results, 5);
    // Everything between the plan and the analyzing progress marker is a
    // source result, in completion order.
    assert!(names[3..8].iter().all(|n| *n == "source_result"));
    assert_eq!(names[8], "progress");
    assert_eq!(names[9], "report");
    assert_eq!(names[10], "result");
    assert_eq!(names[11], "complete");
    assert!(!names.contains(&"error"));
}

#[tokio::test]
async fn test_degraded_report_when_cascade_unavailable() {
    struct DownGenerator;
    #[async_trait]
    impl TextGenerator for DownGenerator {
        async fn generate_text(&self, _request: &LlmRequest) -> AppResult<GenerationOutcome> {
            Err(AppError::LlmUnavailable("all providers down".into()))
        }
        async fn generate_json(
            &self,
            _request: &LlmRequest,
            _schema: &Value,
        ) -> AppResult<JsonOutcome> {
            Err(AppError::LlmUnavailable("all providers down".into()))
        }
    }

    let harness = engine_with(healthy_sources(), Arc::new(DownGenerator));
    let output = harness
        .engine
        .run(input("Acme LLC", Some("7736050003")))
        .await;

    assert_eq!(output.status, Stage::Completed, "degraded, not failed");
    let report = output.report.unwrap();
    assert!(report.degraded);
    assert!(report.summary.contains("Риск-скор"));
}

#[tokio::test]
async fn test_source_result_events_match_envelope_statuses() {
    let harness = engine_with(
        sources_with(Ok(()), Err("500 twice")),
        Arc::new(StubGenerator),
    );
    let prepared = harness.engine.prepare(input("Acme LLC", Some("7736050003")));
    let mut rx = prepared.subscribe();
    harness.engine.execute(prepared).await;

    let mut failed_sources = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let WorkflowEvent::SourceResult { source, status, .. } = event {
            if status == counterscope::services::providers::SourceStatus::Failed {
                failed_sources.push(source);
            }
        }
    }
    assert_eq!(failed_sources, vec!["infosphere".to_string()]);
}
