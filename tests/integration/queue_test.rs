//! Queue Path Integration Tests
//!
//! The async path runs the same state machine as the synchronous one:
//! identical inputs give identical scores, duplicate deliveries inside
//! the idempotency window do not produce second reports, and messages
//! whose handler keeps failing end up in the DLQ exactly once.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use counterscope::models::TaskStatus;
use counterscope::services::llm::{GenerationOutcome, JsonOutcome, LlmRequest, TextGenerator};
use counterscope::services::queue::{consumer, InProcessBroker, QueuePublisher};
use counterscope::services::workflow::AnalysisInput;
use counterscope::utils::error::{AppError, AppResult};

use crate::support::{engine_with, healthy_sources, StubGenerator};

#[tokio::test]
async fn test_async_path_matches_synchronous_run() {
    let harness = engine_with(healthy_sources(), Arc::new(StubGenerator));
    let broker = Arc::new(InProcessBroker::new(3));
    let publisher = QueuePublisher::new(broker.clone());

    let task_id = publisher
        .publish_analysis("Acme LLC", Some("7736050003".into()), None, None)
        .unwrap();
    assert_eq!(
        broker.task_record(&task_id).unwrap().status,
        TaskStatus::Pending
    );

    let delivery = broker.try_pop_analysis().unwrap();
    consumer::handle_analysis(&broker, &harness.engine, &harness.threads, 60, delivery).await;

    let record = broker.task_record(&task_id).unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    let queued_score = record
        .result
        .as_ref()
        .and_then(|r| r.pointer("/risk_assessment/score"))
        .and_then(|v| v.as_u64())
        .expect("score in queued result");

    // A synchronous run over identical inputs and the same deterministic
    // stubs lands on the same score.
    let sync = engine_with(healthy_sources(), Arc::new(StubGenerator));
    let output = sync
        .engine
        .run(AnalysisInput {
            session_id: None,
            client_name: "Acme LLC".into(),
            inn: Some("7736050003".into()),
            notes: None,
        })
        .await;
    assert_eq!(
        output.report.unwrap().risk_assessment.score as u64,
        queued_score
    );
}

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent_on_task_id() {
    let harness = engine_with(healthy_sources(), Arc::new(StubGenerator));
    let broker = Arc::new(InProcessBroker::new(3));
    let publisher = QueuePublisher::new(broker.clone());

    let task_id = publisher
        .publish_analysis("Acme LLC", Some("7736050003".into()), None, None)
        .unwrap();

    let first = broker.try_pop_analysis().unwrap();
    // The broker redelivers the same message (at-least-once).
    let duplicate = counterscope::services::queue::Delivery {
        message: first.message.clone(),
        attempt: 2,
    };

    consumer::handle_analysis(&broker, &harness.engine, &harness.threads, 60, first).await;
    assert_eq!(harness.reports.count().unwrap(), 1);

    consumer::handle_analysis(&broker, &harness.engine, &harness.threads, 60, duplicate).await;

    // Still exactly one stored report; the duplicate reused the thread.
    assert_eq!(harness.reports.count().unwrap(), 1);
    assert_eq!(
        broker.task_record(&task_id).unwrap().status,
        TaskStatus::Completed
    );
}

/// Generator failing with an infrastructure-class error so the consumer
/// nacks instead of acking a terminal failure.
struct BrokenGenerator;

#[async_trait]
impl TextGenerator for BrokenGenerator {
    async fn generate_text(&self, _request: &LlmRequest) -> AppResult<GenerationOutcome> {
        Err(AppError::internal("analyzer wiring broken"))
    }
    async fn generate_json(&self, _request: &LlmRequest, _schema: &Value) -> AppResult<JsonOutcome> {
        Err(AppError::internal("analyzer wiring broken"))
    }
}

#[tokio::test]
async fn test_repeated_handler_failure_dead_letters_once() {
    let harness = engine_with(healthy_sources(), Arc::new(BrokenGenerator));
    let broker = Arc::new(InProcessBroker::new(3));
    let publisher = QueuePublisher::new(broker.clone());

    publisher
        .publish_analysis("Acme LLC", Some("7736050003".into()), None, None)
        .unwrap();

    // max_delivery = 3: three failing handler rounds drain the budget.
    for _ in 0..3 {
        let delivery = broker.try_pop_analysis().expect("message redelivered");
        consumer::handle_analysis(&broker, &harness.engine, &harness.threads, 60, delivery).await;
    }

    let depths = broker.depths();
    assert_eq!(depths.dlq_analysis, 1, "present in the DLQ exactly once");
    assert_eq!(depths.analysis, 0, "absent from the primary queue");

    let dlq = broker.dlq_analysis_snapshot();
    assert_eq!(dlq[0].attempts, 3);
    assert!(dlq[0].last_error.contains("analyzer wiring broken"));
}

#[tokio::test]
async fn test_terminal_workflow_failure_acks_with_failed_result() {
    use crate::support::sources_with;

    let harness = engine_with(
        sources_with(Err("503"), Err("503")),
        Arc::new(StubGenerator),
    );
    let broker = Arc::new(InProcessBroker::new(3));
    let publisher = QueuePublisher::new(broker.clone());

    let task_id = publisher
        .publish_analysis("Acme LLC", Some("7736050003".into()), None, None)
        .unwrap();
    let delivery = broker.try_pop_analysis().unwrap();
    consumer::handle_analysis(&broker, &harness.engine, &harness.threads, 60, delivery).await;

    // InsufficientData is a terminal outcome: acked, not redelivered.
    assert_eq!(broker.depths().analysis, 0);
    assert_eq!(broker.depths().dlq_analysis, 0);
    let record = broker.task_record(&task_id).unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.unwrap().contains("InsufficientData"));
}
