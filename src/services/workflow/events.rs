//! Workflow Events
//!
//! Typed events published by the state machine to its subscribers (SSE
//! adapter, thread store, metrics). Each event knows its wire name on the
//! SSE surface.

use serde::Serialize;
use serde_json::{json, Value};

use super::state::{SearchIntent, Stage};
use crate::models::ClientAnalysisReport;
use crate::services::providers::SourceStatus;
use crate::utils::error::ErrorKind;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Started {
        session_id: String,
        client_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        inn: Option<String>,
    },
    StageStarted {
        stage: Stage,
        percent: u8,
    },
    PlanReady {
        plan: Vec<SearchIntent>,
    },
    SourceResult {
        source: String,
        status: SourceStatus,
        duration_ms: u64,
    },
    ReportReady {
        report: Box<ClientAnalysisReport>,
    },
    AwaitingFeedback {
        report_id: String,
    },
    RunResult {
        report: Box<ClientAnalysisReport>,
        saved_files: Value,
    },
    Completed {
        session_id: String,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl WorkflowEvent {
    /// Event name on the SSE stream.
    pub fn sse_name(&self) -> &'static str {
        match self {
            WorkflowEvent::Started { .. } => "start",
            WorkflowEvent::StageStarted { .. } => "progress",
            WorkflowEvent::PlanReady { .. } => "orchestrator",
            WorkflowEvent::SourceResult { .. } => "source_result",
            WorkflowEvent::ReportReady { .. } => "report",
            WorkflowEvent::AwaitingFeedback { .. } => "awaiting_feedback",
            WorkflowEvent::RunResult { .. } => "result",
            WorkflowEvent::Completed { .. } => "complete",
            WorkflowEvent::Failed { .. } => "error",
        }
    }

    /// Payload shape for the SSE surface.
    pub fn sse_payload(&self) -> Value {
        match self {
            WorkflowEvent::Started {
                session_id,
                client_name,
                inn,
            } => json!({"session_id": session_id, "client_name": client_name, "inn": inn}),
            WorkflowEvent::StageStarted { stage, percent } => {
                json!({"percent": percent, "stage": stage})
            }
            WorkflowEvent::PlanReady { plan } => json!({"plan": plan}),
            WorkflowEvent::SourceResult {
                source,
                status,
                duration_ms,
            } => json!({"source": source, "status": status, "duration_ms": duration_ms}),
            WorkflowEvent::ReportReady { report } => json!({"report": report}),
            WorkflowEvent::AwaitingFeedback { report_id } => json!({"report_id": report_id}),
            WorkflowEvent::RunResult {
                report,
                saved_files,
            } => json!({"report": report, "saved_files": saved_files}),
            WorkflowEvent::Completed { session_id } => json!({"session_id": session_id}),
            WorkflowEvent::Failed { kind, message } => {
                json!({"kind": kind, "message": message})
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_names() {
        let event = WorkflowEvent::Started {
            session_id: "s".into(),
            client_name: "Acme".into(),
            inn: None,
        };
        assert_eq!(event.sse_name(), "start");

        let event = WorkflowEvent::StageStarted {
            stage: Stage::Analyzing,
            percent: 70,
        };
        assert_eq!(event.sse_name(), "progress");
        assert_eq!(event.sse_payload()["percent"], 70);
        assert_eq!(event.sse_payload()["stage"], "analyzing");

        let event = WorkflowEvent::Failed {
            kind: ErrorKind::InsufficientData,
            message: "both critical sources failed".into(),
        };
        assert_eq!(event.sse_name(), "error");
        assert_eq!(event.sse_payload()["kind"], "InsufficientData");
    }

    #[test]
    fn test_source_result_payload() {
        let event = WorkflowEvent::SourceResult {
            source: "dadata".into(),
            status: SourceStatus::Success,
            duration_ms: 120,
        };
        let payload = event.sse_payload();
        assert_eq!(payload["source"], "dadata");
        assert_eq!(payload["status"], "success");
        assert_eq!(payload["duration_ms"], 120);
    }
}
