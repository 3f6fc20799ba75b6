//! Thread Models
//!
//! A thread is the persisted snapshot of one analysis session: inputs,
//! collected evidence, report(s) and feedback bookkeeping. Threads never
//! expire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored thread row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    /// Full workflow snapshot plus user inputs
    pub thread_data: serde_json::Value,
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
    /// Report the thread most recently produced, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing row for `GET /agent/threads`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
