//! Data Models
//!
//! Serializable domain entities shared across storage, agents and the API.

pub mod report;
pub mod search;
pub mod task;
pub mod thread;

pub use report::{
    ClientAnalysisReport, Finding, ReportMetadata, RiskAssessment, RiskLevel, Sentiment,
    StoredReport, REPORT_TTL_SECONDS,
};
pub use search::SearchFinding;
pub use task::{AnalysisTask, TaskOutcome, TaskStatus};
pub use thread::{ThreadRecord, ThreadSummary};
