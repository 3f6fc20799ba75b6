//! Workflow State
//!
//! The analysis session state as a tagged structure with an explicit stage
//! discriminant. Only the state machine mutates it; agents receive borrows
//! and return deltas. Transition legality and entry guards live here so
//! the machine stays a thin driver.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{ClientAnalysisReport, SearchFinding};
use crate::services::providers::SourceResultEnvelope;

/// Workflow stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Planning,
    Collecting,
    Analyzing,
    AwaitingFeedback,
    Persisting,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Legal transitions. Every stage may fail; the rerun loop re-enters
    /// `analyzing` (or a restricted `collecting`) from `awaiting_feedback`.
    pub fn can_transition_to(&self, next: Stage) -> bool {
        if next == Stage::Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Stage::Planning, Stage::Collecting)
                | (Stage::Collecting, Stage::Analyzing)
                | (Stage::Analyzing, Stage::AwaitingFeedback)
                | (Stage::AwaitingFeedback, Stage::Persisting)
                | (Stage::AwaitingFeedback, Stage::Analyzing)
                | (Stage::AwaitingFeedback, Stage::Collecting)
                | (Stage::Persisting, Stage::Completed)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Planning => "planning",
            Stage::Collecting => "collecting",
            Stage::Analyzing => "analyzing",
            Stage::AwaitingFeedback => "awaiting_feedback",
            Stage::Persisting => "persisting",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Search-intent categories produced by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentCategory {
    Reputation,
    Lawsuits,
    News,
    Negative,
    Financial,
    Custom,
}

/// A (category, query) pair driving one web-search call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIntent {
    pub category: IntentCategory,
    pub query: String,
}

/// User verdict on a delivered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRating {
    Accurate,
    PartiallyAccurate,
    Inaccurate,
}

/// Collector aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total_sources: u32,
    pub successful: u32,
    pub failed: u32,
    pub duration_ms: u64,
    pub successful_sources: Vec<String>,
}

/// The full session state. Serialized wholesale into the thread snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: String,
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub stage: Stage,

    #[serde(default)]
    pub plan: Vec<SearchIntent>,
    #[serde(default)]
    pub source_data: BTreeMap<String, SourceResultEnvelope>,
    #[serde(default)]
    pub search_results: Vec<SearchFinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_stats: Option<CollectionStats>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ClientAnalysisReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,

    #[serde(default)]
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<FeedbackRating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_report: Option<Box<ClientAnalysisReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_report_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowState {
    pub fn new(
        session_id: impl Into<String>,
        client_name: impl Into<String>,
        inn: Option<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            client_name: client_name.into(),
            inn,
            notes,
            stage: Stage::Planning,
            plan: Vec::new(),
            source_data: BTreeMap::new(),
            search_results: Vec::new(),
            collection_stats: None,
            report: None,
            report_id: None,
            retry_count: 0,
            user_feedback: None,
            user_comment: None,
            previous_report: None,
            previous_report_id: None,
            error: None,
        }
    }

    /// Names of sources that produced usable data.
    pub fn usable_sources(&self) -> Vec<String> {
        self.source_data
            .iter()
            .filter(|(_, env)| env.is_usable())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Entry guard for `collecting`: the plan must be non-empty.
    pub fn can_enter_collecting(&self) -> bool {
        !self.plan.is_empty()
    }

    /// Entry guard for `analyzing`: at least one usable source, unless the
    /// operator accepted degraded mode.
    pub fn can_enter_analyzing(&self, accept_degraded: bool) -> bool {
        accept_degraded || self.source_data.values().any(|env| env.is_usable())
    }

    /// Entry guard for `persisting`: the user accepted the report, or no
    /// feedback was solicited at all.
    pub fn can_enter_persisting(&self) -> bool {
        matches!(self.user_feedback, None | Some(FeedbackRating::Accurate))
    }
}
