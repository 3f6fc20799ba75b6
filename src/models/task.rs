//! Analysis Task Models
//!
//! Queue-borne analysis requests and their observable status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A queued analysis request. Immutable once published; only its observable
/// status changes as the consumer processes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub task_id: String,
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// 1..10; higher runs earlier
    pub priority: u8,
    pub created_at: DateTime<Utc>,
}

impl AnalysisTask {
    pub fn new(client_name: impl Into<String>, inn: Option<String>, notes: Option<String>) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            client_name: client_name.into(),
            inn,
            notes,
            priority: 5,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }
}

/// Observable task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Published on `analysis_results` when a task finishes either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}
