//! In-Process Broker
//!
//! Priority-aware analysis queue, cache-invalidation queue, result fanout
//! and the two dead-letter queues. Delivery is at-least-once: a popped
//! message that is nacked goes back on the queue with its attempt counter
//! bumped, and moves to the DLQ once the delivery budget is exhausted.
//!
//! The topology (queue names, DLQ routing, delivery budget) matches what
//! an external broker deployment would use, behind the same
//! publisher/consumer seam, so a broker-backed implementation can swap in.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};

use super::models::{CacheInvalidateJob, DeadLetter, Delivery, TaskRecord};
use crate::models::{AnalysisTask, TaskOutcome, TaskStatus};

const RESULTS_CAPACITY: usize = 256;

struct QueuedTask {
    task: AnalysisTask,
    attempt: u32,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl Eq for QueuedTask {}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first; FIFO within a priority.
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Queue depth snapshot for the utility surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueDepths {
    pub analysis: usize,
    pub cache: usize,
    pub dlq_analysis: usize,
    pub dlq_cache: usize,
}

pub struct InProcessBroker {
    max_delivery: u32,
    seq: AtomicU64,

    analysis: Mutex<BinaryHeap<QueuedTask>>,
    analysis_notify: Notify,
    cache: Mutex<VecDeque<Delivery<CacheInvalidateJob>>>,
    cache_notify: Notify,

    dlq_analysis: Mutex<Vec<DeadLetter<AnalysisTask>>>,
    dlq_cache: Mutex<Vec<DeadLetter<CacheInvalidateJob>>>,

    results: broadcast::Sender<TaskOutcome>,
    tasks: Mutex<HashMap<String, TaskRecord>>,
}

impl InProcessBroker {
    pub fn new(max_delivery: u32) -> Self {
        let (results, _keepalive) = broadcast::channel(RESULTS_CAPACITY);
        Self {
            max_delivery: max_delivery.max(1),
            seq: AtomicU64::new(0),
            analysis: Mutex::new(BinaryHeap::new()),
            analysis_notify: Notify::new(),
            cache: Mutex::new(VecDeque::new()),
            cache_notify: Notify::new(),
            dlq_analysis: Mutex::new(Vec::new()),
            dlq_cache: Mutex::new(Vec::new()),
            results,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------- analysis

    /// Enqueue a task. Its observable status becomes `pending`.
    pub fn publish_analysis(&self, task: AnalysisTask) {
        self.tasks.lock().expect("tasks lock").insert(
            task.task_id.clone(),
            TaskRecord {
                task: task.clone(),
                status: TaskStatus::Pending,
                result: None,
                error: None,
            },
        );
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.analysis
            .lock()
            .expect("analysis lock")
            .push(QueuedTask {
                task,
                attempt: 1,
                seq,
            });
        self.analysis_notify.notify_one();
    }

    pub fn try_pop_analysis(&self) -> Option<Delivery<AnalysisTask>> {
        self.analysis
            .lock()
            .expect("analysis lock")
            .pop()
            .map(|queued| Delivery {
                message: queued.task,
                attempt: queued.attempt,
            })
    }

    /// Wait for the next analysis delivery.
    pub async fn pop_analysis(&self) -> Delivery<AnalysisTask> {
        loop {
            if let Some(delivery) = self.try_pop_analysis() {
                return delivery;
            }
            self.analysis_notify.notified().await;
        }
    }

    /// Negative acknowledgement: requeue or dead-letter.
    pub fn nack_analysis(&self, delivery: Delivery<AnalysisTask>, error: &str) {
        if delivery.attempt >= self.max_delivery {
            warn!(
                task_id = %delivery.message.task_id,
                attempts = delivery.attempt,
                error,
                "analysis message dead-lettered"
            );
            self.mark_failed(&delivery.message.task_id, error);
            self.dlq_analysis
                .lock()
                .expect("dlq lock")
                .push(DeadLetter {
                    original: delivery.message,
                    last_error: error.to_string(),
                    attempts: delivery.attempt,
                    dead_at: chrono::Utc::now(),
                });
        } else {
            let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
            self.analysis
                .lock()
                .expect("analysis lock")
                .push(QueuedTask {
                    task: delivery.message,
                    attempt: delivery.attempt + 1,
                    seq,
                });
            self.analysis_notify.notify_one();
        }
    }

    // ---------------------------------------------------------------- cache

    pub fn publish_cache_job(&self, job: CacheInvalidateJob) {
        self.cache.lock().expect("cache lock").push_back(Delivery {
            message: job,
            attempt: 1,
        });
        self.cache_notify.notify_one();
    }

    pub fn try_pop_cache(&self) -> Option<Delivery<CacheInvalidateJob>> {
        self.cache.lock().expect("cache lock").pop_front()
    }

    pub async fn pop_cache(&self) -> Delivery<CacheInvalidateJob> {
        loop {
            if let Some(delivery) = self.try_pop_cache() {
                return delivery;
            }
            self.cache_notify.notified().await;
        }
    }

    pub fn nack_cache(&self, delivery: Delivery<CacheInvalidateJob>, error: &str) {
        if delivery.attempt >= self.max_delivery {
            self.dlq_cache.lock().expect("dlq lock").push(DeadLetter {
                original: delivery.message,
                last_error: error.to_string(),
                attempts: delivery.attempt,
                dead_at: chrono::Utc::now(),
            });
        } else {
            self.cache.lock().expect("cache lock").push_back(Delivery {
                message: delivery.message,
                attempt: delivery.attempt + 1,
            });
            self.cache_notify.notify_one();
        }
    }

    // -------------------------------------------------------------- results

    pub fn subscribe_results(&self) -> broadcast::Receiver<TaskOutcome> {
        self.results.subscribe()
    }

    /// Publish a terminal outcome and update the observable task record.
    pub fn publish_result(&self, outcome: TaskOutcome) {
        {
            let mut tasks = self.tasks.lock().expect("tasks lock");
            if let Some(record) = tasks.get_mut(&outcome.task_id) {
                record.status = outcome.status;
                record.result = outcome.report.clone();
                record.error = outcome.error.clone();
            }
        }
        info!(task_id = %outcome.task_id, status = ?outcome.status, "task outcome published");
        let _ = self.results.send(outcome);
    }

    pub fn mark_processing(&self, task_id: &str) {
        let mut tasks = self.tasks.lock().expect("tasks lock");
        if let Some(record) = tasks.get_mut(task_id) {
            record.status = TaskStatus::Processing;
        }
    }

    fn mark_failed(&self, task_id: &str, error: &str) {
        let mut tasks = self.tasks.lock().expect("tasks lock");
        if let Some(record) = tasks.get_mut(task_id) {
            record.status = TaskStatus::Failed;
            record.error = Some(error.to_string());
        }
    }

    pub fn task_record(&self, task_id: &str) -> Option<TaskRecord> {
        self.tasks.lock().expect("tasks lock").get(task_id).cloned()
    }

    // ------------------------------------------------------------ utilities

    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            analysis: self.analysis.lock().expect("analysis lock").len(),
            cache: self.cache.lock().expect("cache lock").len(),
            dlq_analysis: self.dlq_analysis.lock().expect("dlq lock").len(),
            dlq_cache: self.dlq_cache.lock().expect("dlq lock").len(),
        }
    }

    pub fn dlq_analysis_snapshot(&self) -> Vec<DeadLetter<AnalysisTask>> {
        self.dlq_analysis.lock().expect("dlq lock").clone()
    }
}
