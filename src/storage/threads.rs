//! Threads Repository
//!
//! Persisted analysis-session snapshots. Threads carry the full workflow
//! state plus user inputs and never expire.

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use super::database::ThreadRow;
use super::{decode_value, encode_value, Backend, Storage};
use crate::models::{ThreadRecord, ThreadSummary};
use crate::utils::error::AppResult;

#[derive(Clone)]
pub struct ThreadsRepository {
    storage: Arc<Storage>,
}

impl ThreadsRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Insert or update a thread snapshot. `created_at` is preserved on
    /// update; `updated_at` always moves forward.
    pub fn save_thread(
        &self,
        thread_id: &str,
        thread_data: &serde_json::Value,
        client_name: &str,
        inn: Option<&str>,
        report_id: Option<&str>,
    ) -> AppResult<()> {
        let now = Utc::now().timestamp();
        let bytes = serde_json::to_vec(thread_data)?;
        let encoded = encode_value(bytes, &self.storage.stats);
        let row = ThreadRow {
            thread_id: thread_id.to_string(),
            thread_data: encoded,
            client_name: client_name.to_string(),
            inn: inn.map(String::from),
            report_id: report_id.map(String::from),
            created_at: now,
            updated_at: now,
        };
        match &self.storage.backend {
            Backend::Sqlite(db) => db.thread_upsert(&row)?,
            Backend::Memory(mem) => mem.thread_upsert(&row),
        }
        Ok(())
    }

    pub fn get(&self, thread_id: &str) -> AppResult<Option<ThreadRecord>> {
        let row = match &self.storage.backend {
            Backend::Sqlite(db) => db.thread_get(thread_id)?,
            Backend::Memory(mem) => mem.thread_get(thread_id),
        };
        row.map(|row| self.row_to_record(row)).transpose()
    }

    pub fn list_summaries(&self, limit: u32, offset: u32) -> AppResult<Vec<ThreadSummary>> {
        let rows = match &self.storage.backend {
            Backend::Sqlite(db) => db.thread_list(limit.min(500), offset)?,
            Backend::Memory(mem) => mem.thread_list(limit.min(500), offset),
        };
        rows.into_iter().map(|row| self.row_to_summary(row)).collect()
    }

    pub fn list_threads_by_inn(&self, inn: &str, limit: u32) -> AppResult<Vec<ThreadSummary>> {
        let rows = match &self.storage.backend {
            Backend::Sqlite(db) => db.thread_list_by_inn(inn, limit.min(500))?,
            Backend::Memory(mem) => mem.thread_list_by_inn(inn, limit.min(500)),
        };
        rows.into_iter().map(|row| self.row_to_summary(row)).collect()
    }

    /// The thread that most recently produced a given report; drives the
    /// feedback loop.
    pub fn find_by_report(&self, report_id: &str) -> AppResult<Option<ThreadRecord>> {
        let row = match &self.storage.backend {
            Backend::Sqlite(db) => db.thread_find_by_report(report_id)?,
            Backend::Memory(mem) => mem.thread_find_by_report(report_id),
        };
        row.map(|row| self.row_to_record(row)).transpose()
    }

    pub fn exists(&self, thread_id: &str) -> AppResult<bool> {
        Ok(self.get(thread_id)?.is_some())
    }

    pub fn count(&self) -> AppResult<u64> {
        match &self.storage.backend {
            Backend::Sqlite(db) => db.thread_count(),
            Backend::Memory(mem) => Ok(mem.thread_count()),
        }
    }

    fn row_to_record(&self, row: ThreadRow) -> AppResult<ThreadRecord> {
        let decoded = decode_value(row.thread_data)?;
        let thread_data = serde_json::from_slice(&decoded)?;
        Ok(ThreadRecord {
            thread_id: row.thread_id,
            thread_data,
            client_name: row.client_name,
            inn: row.inn,
            report_id: row.report_id,
            created_at: Utc.timestamp_opt(row.created_at, 0).single().unwrap_or_else(Utc::now),
            updated_at: Utc.timestamp_opt(row.updated_at, 0).single().unwrap_or_else(Utc::now),
        })
    }

    fn row_to_summary(&self, row: ThreadRow) -> AppResult<ThreadSummary> {
        let decoded = decode_value(row.thread_data)?;
        let data: serde_json::Value = serde_json::from_slice(&decoded)?;
        let risk_level = data
            .pointer("/report/risk_assessment/level")
            .and_then(|v| v.as_str())
            .map(String::from);
        Ok(ThreadSummary {
            thread_id: row.thread_id,
            client_name: row.client_name,
            inn: row.inn,
            risk_level,
            created_at: Utc.timestamp_opt(row.created_at, 0).single().unwrap_or_else(Utc::now),
            updated_at: Utc.timestamp_opt(row.updated_at, 0).single().unwrap_or_else(Utc::now),
        })
    }
}
