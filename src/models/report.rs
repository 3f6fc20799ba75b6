//! Report Models
//!
//! The analysis report produced for a counterparty, and its stored form
//! with TTL metadata and denormalized risk columns for indexed lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored reports expire 30 days after creation.
pub const REPORT_TTL_SECONDS: i64 = 30 * 86_400;

/// Risk bands, strictly derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Thresholds: <25 low, <50 medium, <75 high, >=75 critical.
    pub fn from_score(score: u32) -> Self {
        if score >= 75 {
            RiskLevel::Critical
        } else if score >= 50 {
            RiskLevel::High
        } else if score >= 25 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment label attached to web-search findings by the deterministic
/// lexicon rule in the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// The normalized risk assessment block of a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Final score in [0, 100]
    pub score: u32,
    /// Band derived from the score
    pub level: RiskLevel,
    /// Human-readable drivers for every non-zero category contribution
    pub factors: Vec<String>,
}

impl RiskAssessment {
    pub fn new(score: u32, factors: Vec<String>) -> Self {
        let score = score.min(100);
        Self {
            score,
            level: RiskLevel::from_score(score),
            factors,
        }
    }
}

/// One finding extracted from a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub category: String,
    pub source: String,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// Report header: who was analyzed, when, from what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
    pub analysis_date: DateTime<Utc>,
    pub sources_used: Vec<String>,
}

/// The full analysis report for one counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAnalysisReport {
    pub metadata: ReportMetadata,
    /// Registry facts (status, address, management) as returned upstream
    #[serde(default)]
    pub company_info: serde_json::Value,
    #[serde(default)]
    pub legal_cases_count: u64,
    pub risk_assessment: RiskAssessment,
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Markdown narrative
    pub summary: String,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Set when the LLM cascade was unusable and the report was assembled
    /// from the deterministic scorer alone
    #[serde(default)]
    pub degraded: bool,
}

/// Durable form of a report with TTL and denormalized risk columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReport {
    pub report_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
    pub client_name: String,
    pub report_data: ClientAnalysisReport,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub risk_score: u32,
}

impl StoredReport {
    /// Wrap a report for storage; `expires_at` is exactly 30 days after
    /// `created_at`.
    pub fn from_report(report: ClientAnalysisReport, now: DateTime<Utc>) -> Self {
        Self {
            report_id: Uuid::new_v4().to_string(),
            inn: report.metadata.inn.clone(),
            client_name: report.metadata.client_name.clone(),
            risk_level: report.risk_assessment.level,
            risk_score: report.risk_assessment.score,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(REPORT_TTL_SECONDS),
            report_data: report,
        }
    }
}
