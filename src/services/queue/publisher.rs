//! Queue Publisher
//!
//! Creates analysis tasks and cache-invalidation jobs and hands them to
//! the broker. The API's async route and the cache-administration route
//! both publish through this type.

use std::sync::Arc;
use tracing::info;

use super::broker::InProcessBroker;
use super::models::CacheInvalidateJob;
use crate::models::AnalysisTask;
use crate::utils::error::{AppError, AppResult};

#[derive(Clone)]
pub struct QueuePublisher {
    broker: Arc<InProcessBroker>,
}

impl QueuePublisher {
    pub fn new(broker: Arc<InProcessBroker>) -> Self {
        Self { broker }
    }

    /// Create and enqueue an analysis task; returns its id.
    pub fn publish_analysis(
        &self,
        client_name: &str,
        inn: Option<String>,
        notes: Option<String>,
        priority: Option<u8>,
    ) -> AppResult<String> {
        if client_name.trim().is_empty() {
            return Err(AppError::invalid_input("client_name is required"));
        }
        let mut task = AnalysisTask::new(client_name.trim(), inn, notes);
        if let Some(priority) = priority {
            task = task.with_priority(priority);
        }
        let task_id = task.task_id.clone();
        info!(task_id = %task_id, client = %task.client_name, "analysis task enqueued");
        self.broker.publish_analysis(task);
        Ok(task_id)
    }

    pub fn publish_cache_invalidate(&self, prefix: Option<String>, invalidate_all: bool) {
        self.broker.publish_cache_job(CacheInvalidateJob {
            prefix,
            invalidate_all,
        });
    }
}
