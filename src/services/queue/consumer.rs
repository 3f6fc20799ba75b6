//! Queue Consumers
//!
//! A pool of analysis consumers plus one cache-invalidation consumer.
//! Acknowledgement happens only after the writer commits; transient
//! storage failures are nacked so the broker redelivers up to its budget
//! and then dead-letters. Duplicate deliveries of one `task_id` inside
//! the idempotency window update the existing thread instead of producing
//! a second report.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::broker::InProcessBroker;
use super::models::Delivery;
use crate::models::{AnalysisTask, TaskOutcome, TaskStatus};
use crate::services::workflow::{AnalysisInput, Stage, WorkflowEngine};
use crate::storage::{CacheRepository, ThreadsRepository};
use crate::utils::error::ErrorKind;

pub struct ConsumerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    graceful_timeout: std::time::Duration,
}

impl ConsumerPool {
    /// Spawn the configured number of analysis consumers and the cache
    /// consumer.
    pub fn start(
        broker: Arc<InProcessBroker>,
        engine: Arc<WorkflowEngine>,
        threads: ThreadsRepository,
        cache: CacheRepository,
        consumers: usize,
        idempotency_window_secs: i64,
        graceful_timeout: std::time::Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        for worker in 0..consumers.max(1) {
            let broker = broker.clone();
            let engine = engine.clone();
            let threads = threads.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                analysis_loop(worker, broker, engine, threads, idempotency_window_secs, cancel)
                    .await;
            }));
        }

        {
            let broker = broker.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                cache_loop(broker, cache, cancel).await;
            }));
        }

        Self {
            cancel,
            handles,
            graceful_timeout,
        }
    }

    /// Stop accepting work and wait for in-flight handlers up to the
    /// graceful timeout.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let drain = async {
            for handle in self.handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(self.graceful_timeout, drain).await.is_err() {
            warn!("consumer pool: graceful timeout elapsed with work in flight");
        }
    }
}

async fn analysis_loop(
    worker: usize,
    broker: Arc<InProcessBroker>,
    engine: Arc<WorkflowEngine>,
    threads: ThreadsRepository,
    idempotency_window_secs: i64,
    cancel: CancellationToken,
) {
    info!(worker, "analysis consumer started");
    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => break,
            delivery = broker.pop_analysis() => delivery,
        };
        handle_analysis(&broker, &engine, &threads, idempotency_window_secs, delivery).await;
    }
    info!(worker, "analysis consumer stopped");
}

/// Process one delivery. Ack (implicit: don't requeue) only happens after
/// the workflow's writer has committed or the failure is terminal.
pub async fn handle_analysis(
    broker: &InProcessBroker,
    engine: &Arc<WorkflowEngine>,
    threads: &ThreadsRepository,
    idempotency_window_secs: i64,
    delivery: Delivery<AnalysisTask>,
) {
    let task = delivery.message.clone();

    // Idempotency on task_id: a duplicate arrival inside the window reuses
    // the already-committed thread instead of creating a second report.
    // Threads without a report (failed runs) do not short-circuit; the
    // redelivery is the retry.
    match threads.get(&task.task_id) {
        Ok(Some(existing)) if existing.report_id.is_some() => {
            let age = Utc::now().signed_duration_since(existing.updated_at).num_seconds();
            if age <= idempotency_window_secs {
                info!(task_id = %task.task_id, age_secs = age, "duplicate delivery, reusing thread");
                broker.publish_result(TaskOutcome {
                    task_id: task.task_id.clone(),
                    status: TaskStatus::Completed,
                    report: existing.thread_data.get("report").cloned(),
                    error: None,
                    completed_at: Utc::now(),
                });
                return;
            }
        }
        Ok(_) => {}
        Err(err) => {
            // Storage down: let the broker redeliver.
            broker.nack_analysis(delivery, &err.to_string());
            return;
        }
    }

    broker.mark_processing(&task.task_id);
    let output = engine
        .run(AnalysisInput {
            session_id: Some(task.task_id.clone()),
            client_name: task.client_name.clone(),
            inn: task.inn.clone(),
            notes: task.notes.clone(),
        })
        .await;

    match output.status {
        Stage::Completed => {
            broker.publish_result(TaskOutcome {
                task_id: task.task_id.clone(),
                status: TaskStatus::Completed,
                report: output
                    .report
                    .as_ref()
                    .and_then(|r| serde_json::to_value(r).ok()),
                error: None,
                completed_at: Utc::now(),
            });
        }
        _ => {
            let (kind, message) = output
                .error
                .unwrap_or((ErrorKind::InternalError, "unknown failure".into()));
            if matches!(kind, ErrorKind::StorageUnavailable | ErrorKind::InternalError) {
                // Transient infrastructure failure: redeliver.
                broker.nack_analysis(delivery, &message);
            } else {
                // Terminal workflow outcome: ack with a failed result.
                broker.publish_result(TaskOutcome {
                    task_id: task.task_id.clone(),
                    status: TaskStatus::Failed,
                    report: None,
                    error: Some(format!("{}: {}", kind, message)),
                    completed_at: Utc::now(),
                });
            }
        }
    }
}

async fn cache_loop(broker: Arc<InProcessBroker>, cache: CacheRepository, cancel: CancellationToken) {
    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => break,
            delivery = broker.pop_cache() => delivery,
        };

        let job = delivery.message.clone();
        let result = if job.invalidate_all {
            cache.clear_prefix("")
        } else if let Some(prefix) = &job.prefix {
            cache.clear_prefix(prefix)
        } else {
            Ok(0)
        };

        match result {
            Ok(cleared) => info!(cleared, "cache invalidation job done"),
            Err(err) => broker.nack_cache(delivery, &err.to_string()),
        }
    }
}
