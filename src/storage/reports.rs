//! Reports Repository
//!
//! Durable analysis reports with a 30-day TTL, exact-match INN lookup,
//! case-insensitive substring search on the client name, and risk-band
//! filters over denormalized columns.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::database::{ReportQuery, ReportRow};
use super::{decode_value, encode_value, Backend, Storage};
use crate::models::{ClientAnalysisReport, RiskLevel, StoredReport};
use crate::utils::error::{AppError, AppResult};

/// Caller-facing filter; converted to the backend query.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub inn: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub client_name: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub min_risk_score: Option<u32>,
    pub max_risk_score: Option<u32>,
    pub limit: u32,
    pub offset: u32,
}

impl ReportFilter {
    fn to_query(&self) -> ReportQuery {
        ReportQuery {
            inn: self.inn.clone(),
            risk_level: self.risk_level.map(|l| l.as_str().to_string()),
            client_name: self.client_name.clone(),
            created_from: self.date_from.map(|d| d.timestamp()),
            created_to: self.date_to.map(|d| d.timestamp()),
            min_risk_score: self.min_risk_score,
            max_risk_score: self.max_risk_score,
            limit: if self.limit == 0 { 50 } else { self.limit.min(500) },
            offset: self.offset,
        }
    }
}

/// Aggregates for `GET /reports/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct ReportsStats {
    pub total: u64,
    pub by_level: Vec<LevelStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelStat {
    pub level: String,
    pub count: u64,
    pub avg_score: f64,
}

#[derive(Clone)]
pub struct ReportsRepository {
    storage: Arc<Storage>,
}

impl ReportsRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Persist a stored report. Returns the report id.
    pub fn create(&self, report: &StoredReport) -> AppResult<String> {
        let bytes = serde_json::to_vec(&report.report_data)?;
        let encoded = encode_value(bytes, &self.storage.stats);
        let row = ReportRow {
            report_id: report.report_id.clone(),
            inn: report.inn.clone(),
            client_name: report.client_name.clone(),
            report_data: encoded,
            risk_level: report.risk_level.as_str().to_string(),
            risk_score: report.risk_score,
            created_at: report.created_at.timestamp(),
            expires_at: report.expires_at.timestamp(),
        };
        match &self.storage.backend {
            Backend::Sqlite(db) => db.report_put(&row)?,
            Backend::Memory(mem) => mem.report_put(&row),
        }
        Ok(report.report_id.clone())
    }

    pub fn get(&self, report_id: &str) -> AppResult<Option<StoredReport>> {
        let now = Utc::now().timestamp();
        let row = match &self.storage.backend {
            Backend::Sqlite(db) => db.report_get(report_id, now)?,
            Backend::Memory(mem) => mem.report_get(report_id, now),
        };
        match row {
            Some(row) => {
                self.storage.stats.record_hit();
                Ok(Some(self.row_to_stored(row)?))
            }
            None => {
                self.storage.stats.record_miss();
                Ok(None)
            }
        }
    }

    pub fn delete(&self, report_id: &str) -> AppResult<bool> {
        match &self.storage.backend {
            Backend::Sqlite(db) => db.report_delete(report_id),
            Backend::Memory(mem) => Ok(mem.report_delete(report_id)),
        }
    }

    pub fn list(&self, filter: &ReportFilter) -> AppResult<Vec<StoredReport>> {
        let now = Utc::now().timestamp();
        let rows = match &self.storage.backend {
            Backend::Sqlite(db) => db.report_list(&filter.to_query(), now)?,
            Backend::Memory(mem) => mem.report_list(&filter.to_query(), now),
        };
        rows.into_iter().map(|row| self.row_to_stored(row)).collect()
    }

    /// Exact-match lookup over the inn index.
    pub fn get_reports_by_inn(&self, inn: &str, limit: u32) -> AppResult<Vec<StoredReport>> {
        self.list(&ReportFilter {
            inn: Some(inn.to_string()),
            limit,
            ..Default::default()
        })
    }

    pub fn count(&self) -> AppResult<u64> {
        let now = Utc::now().timestamp();
        match &self.storage.backend {
            Backend::Sqlite(db) => db.report_count(now),
            Backend::Memory(mem) => Ok(mem.report_count(now)),
        }
    }

    pub fn stats(&self) -> AppResult<ReportsStats> {
        let now = Utc::now().timestamp();
        let rows = match &self.storage.backend {
            Backend::Sqlite(db) => db.report_level_stats(now)?,
            Backend::Memory(mem) => mem.report_level_stats(now),
        };
        let total = rows.iter().map(|(_, count, _)| count).sum();
        let mut by_level: Vec<LevelStat> = rows
            .into_iter()
            .map(|(level, count, avg)| LevelStat {
                level,
                count,
                avg_score: (avg * 100.0).round() / 100.0,
            })
            .collect();
        by_level.sort_by(|a, b| a.level.cmp(&b.level));
        Ok(ReportsStats { total, by_level })
    }

    fn row_to_stored(&self, row: ReportRow) -> AppResult<StoredReport> {
        let decoded = decode_value(row.report_data)?;
        let report_data: ClientAnalysisReport = serde_json::from_slice(&decoded)?;
        let risk_level = RiskLevel::parse(&row.risk_level)
            .ok_or_else(|| AppError::internal(format!("unknown risk level '{}'", row.risk_level)))?;
        Ok(StoredReport {
            report_id: row.report_id,
            inn: row.inn,
            client_name: row.client_name,
            report_data,
            created_at: Utc.timestamp_opt(row.created_at, 0).single().unwrap_or_else(Utc::now),
            expires_at: Utc.timestamp_opt(row.expires_at, 0).single().unwrap_or_else(Utc::now),
            risk_level,
            risk_score: row.risk_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReportMetadata, RiskAssessment};

    fn sample(client: &str, inn: Option<&str>, score: u32) -> StoredReport {
        let report = ClientAnalysisReport {
            metadata: ReportMetadata {
                client_name: client.to_string(),
                inn: inn.map(String::from),
                analysis_date: Utc::now(),
                sources_used: vec!["dadata".into()],
            },
            company_info: serde_json::json!({}),
            legal_cases_count: 0,
            risk_assessment: RiskAssessment::new(score, vec![]),
            findings: vec![],
            summary: "s".into(),
            citations: vec![],
            recommendations: vec![],
            degraded: false,
        };
        StoredReport::from_report(report, Utc::now())
    }

    #[test]
    fn test_create_get_roundtrip() {
        let repo = ReportsRepository::new(Storage::in_memory());
        let stored = sample("Acme LLC", Some("7736050003"), 42);
        let id = repo.create(&stored).unwrap();

        let fetched = repo.get(&id).unwrap().unwrap();
        assert_eq!(fetched.client_name, "Acme LLC");
        assert_eq!(fetched.risk_score, 42);
        assert_eq!(fetched.risk_level, RiskLevel::Medium);
        assert_eq!(
            (fetched.expires_at - fetched.created_at).num_seconds(),
            crate::models::REPORT_TTL_SECONDS
        );
    }

    #[test]
    fn test_inn_lookup_exact() {
        let repo = ReportsRepository::new(Storage::in_memory());
        repo.create(&sample("A", Some("7736050003"), 10)).unwrap();
        repo.create(&sample("B", Some("7707083893"), 20)).unwrap();

        let rows = repo.get_reports_by_inn("7736050003", 50).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].client_name, "A");
        // No partial matching on INN.
        assert!(repo.get_reports_by_inn("77360500", 50).unwrap().is_empty());
    }

    #[test]
    fn test_name_search_case_insensitive() {
        let repo = ReportsRepository::new(Storage::in_memory());
        repo.create(&sample("Northwind Traders", None, 10)).unwrap();

        let rows = repo
            .list(&ReportFilter {
                client_name: Some("northwind".into()),
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_stats() {
        let repo = ReportsRepository::new(Storage::in_memory());
        repo.create(&sample("A", None, 10)).unwrap();
        repo.create(&sample("B", None, 20)).unwrap();
        repo.create(&sample("C", None, 80)).unwrap();

        let stats = repo.stats().unwrap();
        assert_eq!(stats.total, 3);
        let low = stats.by_level.iter().find(|s| s.level == "low").unwrap();
        assert_eq!(low.count, 2);
        assert!((low.avg_score - 15.0).abs() < 0.01);
    }

    #[test]
    fn test_delete() {
        let repo = ReportsRepository::new(Storage::in_memory());
        let id = repo.create(&sample("A", None, 10)).unwrap();
        assert!(repo.delete(&id).unwrap());
        assert!(!repo.delete(&id).unwrap());
        assert!(repo.get(&id).unwrap().is_none());
    }
}
