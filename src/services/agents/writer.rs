//! Writer Agent
//!
//! Persists the finished report into the reports space and snapshots the
//! whole workflow into the threads space. File rendering (PDF) is an
//! external collaborator; the `saved_files` seam stays in the result
//! payload for it.

use serde_json::{json, Value};
use tracing::info;

use crate::models::StoredReport;
use crate::services::workflow::state::WorkflowState;
use crate::storage::{ReportsRepository, ThreadsRepository};
use crate::utils::error::{AppError, AppResult};

/// Writer output: the durable report id and any rendered file handles.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub report_id: String,
    pub saved_files: Value,
}

/// Persist the report and commit its id into the state. The machine
/// snapshots the thread separately, after the terminal transition, so the
/// stored stage reflects the session outcome.
pub fn persist_report(
    reports: &ReportsRepository,
    state: &mut WorkflowState,
) -> AppResult<WriteOutcome> {
    let report = state
        .report
        .clone()
        .ok_or_else(|| AppError::internal("writer invoked without a report"))?;

    let stored = StoredReport::from_report(report, chrono::Utc::now());
    let report_id = reports.create(&stored)?;
    state.report_id = Some(report_id.clone());

    info!(
        report_id = %report_id,
        session_id = %state.session_id,
        "writer: report persisted"
    );

    Ok(WriteOutcome {
        report_id,
        saved_files: json!({}),
    })
}

/// Snapshot the workflow into the threads space. Also used on failure
/// paths, where no report exists.
pub fn snapshot_thread(threads: &ThreadsRepository, state: &WorkflowState) -> AppResult<()> {
    let snapshot = serde_json::to_value(state)?;
    threads.save_thread(
        &state.session_id,
        &snapshot,
        &state.client_name,
        state.inn.as_deref(),
        state.report_id.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientAnalysisReport, ReportMetadata, RiskAssessment};
    use crate::services::workflow::state::Stage;
    use crate::storage::Storage;

    fn report(client: &str) -> ClientAnalysisReport {
        ClientAnalysisReport {
            metadata: ReportMetadata {
                client_name: client.into(),
                inn: Some("7736050003".into()),
                analysis_date: chrono::Utc::now(),
                sources_used: vec!["dadata".into()],
            },
            company_info: json!({}),
            legal_cases_count: 0,
            risk_assessment: RiskAssessment::new(12, vec![]),
            findings: vec![],
            summary: "s".into(),
            citations: vec![],
            recommendations: vec![],
            degraded: false,
        }
    }

    #[test]
    fn test_persist_report_then_snapshot() {
        let storage = Storage::in_memory();
        let reports = ReportsRepository::new(storage.clone());
        let threads = ThreadsRepository::new(storage);

        let mut state = WorkflowState::new("sess-1", "Acme", Some("7736050003".into()), None);
        state.report = Some(report("Acme"));

        let outcome = persist_report(&reports, &mut state).unwrap();
        assert_eq!(state.report_id.as_deref(), Some(outcome.report_id.as_str()));

        let stored = reports.get(&outcome.report_id).unwrap().unwrap();
        assert_eq!(stored.client_name, "Acme");

        snapshot_thread(&threads, &state).unwrap();
        let thread = threads.get("sess-1").unwrap().unwrap();
        assert_eq!(thread.report_id.as_deref(), Some(outcome.report_id.as_str()));
        assert_eq!(
            thread.thread_data.get("client_name").and_then(|v| v.as_str()),
            Some("Acme")
        );
    }

    #[test]
    fn test_persist_without_report_is_error() {
        let storage = Storage::in_memory();
        let reports = ReportsRepository::new(storage);
        let mut state = WorkflowState::new("sess-1", "Acme", None, None);
        assert!(persist_report(&reports, &mut state).is_err());
    }

    #[test]
    fn test_failure_snapshot_keeps_stage() {
        let storage = Storage::in_memory();
        let threads = ThreadsRepository::new(storage);
        let mut state = WorkflowState::new("sess-2", "Acme", None, None);
        state.stage = Stage::Failed;
        state.error = Some("InsufficientData".into());

        snapshot_thread(&threads, &state).unwrap();
        let thread = threads.get("sess-2").unwrap().unwrap();
        assert_eq!(
            thread.thread_data.get("stage").and_then(|v| v.as_str()),
            Some("failed")
        );
    }
}
