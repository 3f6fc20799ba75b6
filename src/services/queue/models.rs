//! Queue Message Models
//!
//! Wire shapes for the analysis and cache-invalidation queues, their
//! result fanout, and the dead-letter envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisTask, TaskStatus};

/// Cache invalidation job (by prefix, or everything).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheInvalidateJob {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub invalidate_all: bool,
}

/// One delivery of a message, carrying the attempt counter the broker
/// maintains for at-least-once semantics.
#[derive(Debug, Clone)]
pub struct Delivery<T> {
    pub message: T,
    pub attempt: u32,
}

/// Dead-letter envelope mirroring the primary queue's message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter<T> {
    pub original: T,
    pub last_error: String,
    pub attempts: u32,
    pub dead_at: DateTime<Utc>,
}

/// Observable record for `GET /agent/task/{task_id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskRecord {
    pub task: AnalysisTask,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
