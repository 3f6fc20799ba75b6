//! In-Memory Fallback Store
//!
//! Activated when the primary store cannot be opened. Same operations as
//! the SQLite backend over mutex-protected maps; durability is best-effort
//! (lost on restart), which health output reflects.

use std::collections::HashMap;
use std::sync::Mutex;

use super::database::{ReportQuery, ReportRow, ThreadRow};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    source: String,
    ttl_epoch: i64,
    #[allow(dead_code)]
    created_at: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    cache: Mutex<HashMap<String, CacheEntry>>,
    reports: Mutex<HashMap<String, ReportRow>>,
    threads: Mutex<HashMap<String, ThreadRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------ cache

    pub fn cache_put(&self, key: &str, value: &[u8], source: &str, ttl_epoch: i64, created_at: i64) {
        self.cache.lock().expect("cache lock").insert(
            key.to_string(),
            CacheEntry {
                value: value.to_vec(),
                source: source.to_string(),
                ttl_epoch,
                created_at,
            },
        );
    }

    pub fn cache_get(&self, key: &str, now: i64) -> Option<Vec<u8>> {
        let cache = self.cache.lock().expect("cache lock");
        cache
            .get(key)
            .filter(|entry| entry.ttl_epoch > now)
            .map(|entry| entry.value.clone())
    }

    pub fn cache_delete(&self, key: &str) -> bool {
        self.cache.lock().expect("cache lock").remove(key).is_some()
    }

    pub fn cache_clear_prefix(&self, prefix: &str) -> u64 {
        let mut cache = self.cache.lock().expect("cache lock");
        let before = cache.len();
        cache.retain(|key, _| !key.starts_with(prefix));
        (before - cache.len()) as u64
    }

    pub fn cache_evict_expired(&self, now: i64) -> u64 {
        let mut cache = self.cache.lock().expect("cache lock");
        let before = cache.len();
        cache.retain(|_, entry| entry.ttl_epoch > now);
        (before - cache.len()) as u64
    }

    pub fn cache_count(&self, now: i64) -> u64 {
        let cache = self.cache.lock().expect("cache lock");
        cache.values().filter(|entry| entry.ttl_epoch > now).count() as u64
    }

    pub fn cache_counts_by_source(&self, now: i64) -> Vec<(String, u64)> {
        let cache = self.cache.lock().expect("cache lock");
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in cache.values().filter(|entry| entry.ttl_epoch > now) {
            *counts.entry(entry.source.clone()).or_default() += 1;
        }
        counts.into_iter().collect()
    }

    // ---------------------------------------------------------------- reports

    pub fn report_put(&self, row: &ReportRow) {
        self.reports
            .lock()
            .expect("reports lock")
            .insert(row.report_id.clone(), row.clone());
    }

    pub fn report_get(&self, report_id: &str, now: i64) -> Option<ReportRow> {
        let reports = self.reports.lock().expect("reports lock");
        reports
            .get(report_id)
            .filter(|row| row.expires_at > now)
            .cloned()
    }

    pub fn report_delete(&self, report_id: &str) -> bool {
        self.reports
            .lock()
            .expect("reports lock")
            .remove(report_id)
            .is_some()
    }

    pub fn report_list(&self, query: &ReportQuery, now: i64) -> Vec<ReportRow> {
        let reports = self.reports.lock().expect("reports lock");
        let mut rows: Vec<ReportRow> = reports
            .values()
            .filter(|row| row.expires_at > now)
            .filter(|row| query.inn.as_deref().map_or(true, |inn| row.inn.as_deref() == Some(inn)))
            .filter(|row| {
                query
                    .risk_level
                    .as_deref()
                    .map_or(true, |level| row.risk_level == level)
            })
            .filter(|row| {
                query.client_name.as_deref().map_or(true, |name| {
                    row.client_name.to_lowercase().contains(&name.to_lowercase())
                })
            })
            .filter(|row| query.created_from.map_or(true, |from| row.created_at >= from))
            .filter(|row| query.created_to.map_or(true, |to| row.created_at <= to))
            .filter(|row| query.min_risk_score.map_or(true, |min| row.risk_score >= min))
            .filter(|row| query.max_risk_score.map_or(true, |max| row.risk_score <= max))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect()
    }

    pub fn report_count(&self, now: i64) -> u64 {
        let reports = self.reports.lock().expect("reports lock");
        reports.values().filter(|row| row.expires_at > now).count() as u64
    }

    pub fn report_evict_expired(&self, now: i64) -> u64 {
        let mut reports = self.reports.lock().expect("reports lock");
        let before = reports.len();
        reports.retain(|_, row| row.expires_at > now);
        (before - reports.len()) as u64
    }

    pub fn report_level_stats(&self, now: i64) -> Vec<(String, u64, f64)> {
        let reports = self.reports.lock().expect("reports lock");
        let mut grouped: HashMap<String, (u64, u64)> = HashMap::new();
        for row in reports.values().filter(|row| row.expires_at > now) {
            let entry = grouped.entry(row.risk_level.clone()).or_default();
            entry.0 += 1;
            entry.1 += row.risk_score as u64;
        }
        grouped
            .into_iter()
            .map(|(level, (count, sum))| (level, count, sum as f64 / count as f64))
            .collect()
    }

    // ---------------------------------------------------------------- threads

    pub fn thread_upsert(&self, row: &ThreadRow) {
        let mut threads = self.threads.lock().expect("threads lock");
        match threads.get_mut(&row.thread_id) {
            Some(existing) => {
                existing.thread_data = row.thread_data.clone();
                existing.client_name = row.client_name.clone();
                existing.inn = row.inn.clone();
                existing.report_id = row.report_id.clone();
                existing.updated_at = row.updated_at;
            }
            None => {
                threads.insert(row.thread_id.clone(), row.clone());
            }
        }
    }

    pub fn thread_get(&self, thread_id: &str) -> Option<ThreadRow> {
        self.threads.lock().expect("threads lock").get(thread_id).cloned()
    }

    pub fn thread_list(&self, limit: u32, offset: u32) -> Vec<ThreadRow> {
        let threads = self.threads.lock().expect("threads lock");
        let mut rows: Vec<ThreadRow> = threads.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect()
    }

    pub fn thread_list_by_inn(&self, inn: &str, limit: u32) -> Vec<ThreadRow> {
        let threads = self.threads.lock().expect("threads lock");
        let mut rows: Vec<ThreadRow> = threads
            .values()
            .filter(|row| row.inn.as_deref() == Some(inn))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        rows
    }

    pub fn thread_find_by_report(&self, report_id: &str) -> Option<ThreadRow> {
        let threads = self.threads.lock().expect("threads lock");
        threads
            .values()
            .filter(|row| row.report_id.as_deref() == Some(report_id))
            .max_by_key(|row| row.updated_at)
            .cloned()
    }

    pub fn thread_count(&self) -> u64 {
        self.threads.lock().expect("threads lock").len() as u64
    }
}
