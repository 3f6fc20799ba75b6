//! Workflow State Machine
//!
//! Drives one analysis session through planning → collecting → analyzing →
//! awaiting_feedback → persisting → completed, enforcing entry guards and
//! the whole-session deadline. Every transition publishes a typed event to
//! the session's broadcast bus; subscribers (SSE adapter, thread store)
//! consume without back-references. Each `WorkflowState` has exactly one
//! writer: the driving task.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::events::WorkflowEvent;
use super::state::{FeedbackRating, Stage, WorkflowState};
use crate::config::Config;
use crate::models::{ClientAnalysisReport, ThreadRecord};
use crate::services::agents::{analyzer, collector, planner, writer};
use crate::services::llm::TextGenerator;
use crate::services::providers::DataSource;
use crate::storage::{ReportsRepository, ThreadsRepository};
use crate::utils::error::{AppError, AppResult, ErrorKind};
use crate::utils::sanitize::sanitize_for_prompt;

/// Event-bus capacity per session; bounds memory for slow SSE consumers.
const EVENT_BUS_CAPACITY: usize = 64;

/// Dependencies shared by every session.
pub struct WorkflowDeps {
    pub config: Arc<Config>,
    pub sources: Vec<Arc<dyn DataSource>>,
    pub generator: Arc<dyn TextGenerator>,
    pub reports: ReportsRepository,
    pub threads: ThreadsRepository,
    /// Global in-flight cap for outbound collection across sessions
    pub global_search_permits: Arc<Semaphore>,
    /// Operator switch: proceed to analysis with zero usable sources
    pub accept_degraded: bool,
}

/// Inputs for a new session.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub session_id: Option<String>,
    pub client_name: String,
    pub inn: Option<String>,
    pub notes: Option<String>,
}

/// Feedback applied to a delivered report.
#[derive(Debug, Clone)]
pub struct FeedbackInput {
    pub rating: FeedbackRating,
    pub comment: Option<String>,
    pub focus_areas: Vec<String>,
}

/// Final observable outcome of a session run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub session_id: String,
    pub status: Stage,
    pub report: Option<ClientAnalysisReport>,
    pub report_id: Option<String>,
    pub saved_files: Value,
    pub error: Option<(ErrorKind, String)>,
}

struct SessionEntry {
    cancel: CancellationToken,
    events: broadcast::Sender<WorkflowEvent>,
}

pub struct WorkflowEngine {
    deps: Arc<WorkflowDeps>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

/// A registered-but-not-yet-driven session.
pub struct PreparedRun {
    pub session_id: String,
    state: WorkflowState,
    events: broadcast::Sender<WorkflowEvent>,
    cancel: CancellationToken,
}

impl PreparedRun {
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }
}

impl WorkflowEngine {
    pub fn new(deps: WorkflowDeps) -> Arc<Self> {
        Arc::new(Self {
            deps: Arc::new(deps),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn deps(&self) -> &Arc<WorkflowDeps> {
        &self.deps
    }

    /// Subscribe to a running session's event bus.
    pub fn subscribe(&self, session_id: &str) -> Option<broadcast::Receiver<WorkflowEvent>> {
        let sessions = self.sessions.lock().expect("sessions lock");
        sessions.get(session_id).map(|entry| entry.events.subscribe())
    }

    /// Request cancellation of a running session. The driver observes the
    /// flag at its next suspension point.
    pub fn cancel_session(&self, session_id: &str) -> bool {
        let sessions = self.sessions.lock().expect("sessions lock");
        match sessions.get(session_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Best-effort shutdown notice to every connected event subscriber.
    pub fn notify_shutdown(&self) {
        let sessions = self.sessions.lock().expect("sessions lock");
        for entry in sessions.values() {
            let _ = entry.events.send(WorkflowEvent::Failed {
                kind: ErrorKind::ServerShuttingDown,
                message: "server shutting down".into(),
            });
        }
    }

    pub fn running_sessions(&self) -> usize {
        self.sessions.lock().expect("sessions lock").len()
    }

    /// Register a session so subscribers can attach before any event fires.
    pub fn prepare(&self, input: AnalysisInput) -> PreparedRun {
        let session_id = input
            .session_id
            .clone()
            .unwrap_or_else(|| format!("analysis_{}", Uuid::new_v4()));
        let (events, _keepalive) = broadcast::channel(EVENT_BUS_CAPACITY);
        let cancel = CancellationToken::new();

        self.sessions.lock().expect("sessions lock").insert(
            session_id.clone(),
            SessionEntry {
                cancel: cancel.clone(),
                events: events.clone(),
            },
        );

        let state = WorkflowState::new(
            session_id.clone(),
            input.client_name,
            input.inn,
            input.notes,
        );
        PreparedRun {
            session_id,
            state,
            events,
            cancel,
        }
    }

    /// Run a session to completion. Convenience wrapper over
    /// `prepare` + `execute`.
    pub async fn run(&self, input: AnalysisInput) -> RunOutput {
        let prepared = self.prepare(input);
        self.execute(prepared).await
    }

    /// Drive a prepared session, enforcing the whole-workflow deadline.
    pub async fn execute(&self, prepared: PreparedRun) -> RunOutput {
        let PreparedRun {
            session_id,
            mut state,
            events,
            cancel,
        } = prepared;

        info!(session_id = %session_id, client = %state.client_name, "workflow: starting");
        let deadline = self.deps.config.workflow_timeout();
        let driven = tokio::time::timeout(
            deadline,
            self.drive(&mut state, &events, &cancel),
        )
        .await;

        let output = match driven {
            Ok(Ok(outcome)) => {
                let _ = events.send(WorkflowEvent::Completed {
                    session_id: session_id.clone(),
                });
                RunOutput {
                    session_id: session_id.clone(),
                    status: Stage::Completed,
                    report: state.report.clone(),
                    report_id: state.report_id.clone(),
                    saved_files: outcome.saved_files,
                    error: None,
                }
            }
            Ok(Err(err)) => self.fail(&session_id, &mut state, &events, err),
            Err(_) => self.fail(
                &session_id,
                &mut state,
                &events,
                AppError::WorkflowTimeout(deadline.as_secs()),
            ),
        };

        self.sessions.lock().expect("sessions lock").remove(&session_id);
        output
    }

    /// Spawn a detached run and return its id plus an event subscription.
    /// Client disconnects do not cancel the run; it keeps going to the
    /// thread store.
    pub fn spawn(
        self: Arc<Self>,
        input: AnalysisInput,
    ) -> (String, broadcast::Receiver<WorkflowEvent>) {
        let prepared = self.prepare(input);
        let session_id = prepared.session_id.clone();
        let receiver = prepared.subscribe();
        tokio::spawn(async move {
            let _ = self.execute(prepared).await;
        });
        (session_id, receiver)
    }

    fn fail(
        &self,
        session_id: &str,
        state: &mut WorkflowState,
        events: &broadcast::Sender<WorkflowEvent>,
        err: AppError,
    ) -> RunOutput {
        let kind = err.kind();
        let message = err.to_string();
        warn!(session_id, kind = %kind, message = %message, "workflow: failed");

        if state.stage.can_transition_to(Stage::Failed) {
            state.stage = Stage::Failed;
        }
        state.error = Some(message.clone());

        // Failed sessions are still inspectable through their thread.
        if let Err(snapshot_err) = writer::snapshot_thread(&self.deps.threads, state) {
            error!(error = %snapshot_err, "workflow: failed to snapshot failed session");
        }

        let _ = events.send(WorkflowEvent::Failed {
            kind,
            message: message.clone(),
        });

        RunOutput {
            session_id: session_id.to_string(),
            status: Stage::Failed,
            report: None,
            report_id: None,
            saved_files: Value::Null,
            error: Some((kind, message)),
        }
    }

    fn transition(&self, state: &mut WorkflowState, next: Stage) -> AppResult<()> {
        if !state.stage.can_transition_to(next) {
            return Err(AppError::internal(format!(
                "illegal transition {} -> {}",
                state.stage, next
            )));
        }
        state.stage = next;
        Ok(())
    }

    async fn drive(
        &self,
        state: &mut WorkflowState,
        events: &broadcast::Sender<WorkflowEvent>,
        cancel: &CancellationToken,
    ) -> AppResult<writer::WriteOutcome> {
        let deps = &self.deps;

        let _ = events.send(WorkflowEvent::Started {
            session_id: state.session_id.clone(),
            client_name: state.client_name.clone(),
            inn: state.inn.clone(),
        });

        // planning
        if state.client_name.trim().is_empty() {
            return Err(AppError::invalid_input("client_name is required"));
        }
        let _ = events.send(WorkflowEvent::StageStarted {
            stage: Stage::Planning,
            percent: 10,
        });

        let registry = deps.sources.iter().find(|s| s.name() == "dadata");
        let plan_outcome = planner::build_plan(
            &state.client_name,
            state.inn.as_deref(),
            state.notes.as_deref(),
            registry,
        )
        .await;
        for warning in &plan_outcome.warnings {
            warn!(session_id = %state.session_id, warning = %warning, "planner warning");
        }
        state.client_name = plan_outcome.canonical_name;
        state.plan = plan_outcome.plan;

        if !state.can_enter_collecting() {
            return Err(AppError::invalid_input("planner produced an empty plan"));
        }
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(state.session_id.clone()));
        }

        // collecting
        self.transition(state, Stage::Collecting)?;
        let _ = events.send(WorkflowEvent::PlanReady {
            plan: state.plan.clone(),
        });

        let collected = collector::collect(collector::CollectorRun {
            sources: &deps.sources,
            client_name: &state.client_name,
            inn: state.inn.as_deref(),
            plan: &state.plan,
            session_permits: Arc::new(Semaphore::new(deps.config.max_concurrent_searches)),
            global_permits: deps.global_search_permits.clone(),
            cancel: cancel.clone(),
            events: events.clone(),
            only_sources: None,
        })
        .await?;
        state.source_data = collected.source_data;
        state.search_results = collected.search_results;
        state.collection_stats = Some(collected.stats);

        // analyzing
        if !state.can_enter_analyzing(deps.accept_degraded) {
            return Err(AppError::InsufficientData(
                "no source produced usable data".into(),
            ));
        }
        self.transition(state, Stage::Analyzing)?;
        let _ = events.send(WorkflowEvent::StageStarted {
            stage: Stage::Analyzing,
            percent: 70,
        });
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(state.session_id.clone()));
        }

        let report = analyzer::analyze(&deps.generator, state, cancel).await?;
        state.report = Some(report.clone());
        let _ = events.send(WorkflowEvent::ReportReady {
            report: Box::new(report),
        });

        // awaiting_feedback passes through when no feedback was solicited
        self.transition(state, Stage::AwaitingFeedback)?;
        if !state.can_enter_persisting() {
            return Err(AppError::internal(
                "session entered persisting with rejected feedback",
            ));
        }
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(state.session_id.clone()));
        }

        // persisting
        self.transition(state, Stage::Persisting)?;
        let outcome = writer::persist_report(&deps.reports, state)?;
        self.transition(state, Stage::Completed)?;
        writer::snapshot_thread(&deps.threads, state)?;

        let _ = events.send(WorkflowEvent::RunResult {
            report: Box::new(state.report.clone().expect("report set above")),
            saved_files: outcome.saved_files.clone(),
        });

        Ok(outcome)
    }

    /// Re-run the analysis for a rejected report. Does not recollect
    /// evidence unless `focus_areas` demand a restricted collecting pass.
    /// The retry cap transitions the session to `failed` before any LLM
    /// call is made.
    pub async fn rerun_with_feedback(
        &self,
        thread: ThreadRecord,
        feedback: FeedbackInput,
    ) -> AppResult<RunOutput> {
        let deps = &self.deps;
        let mut state: WorkflowState = serde_json::from_value(thread.thread_data)
            .map_err(|e| AppError::internal(format!("corrupt thread snapshot: {}", e)))?;
        let session_id = state.session_id.clone();

        // Re-enter the feedback loop from the delivered report.
        state.stage = Stage::AwaitingFeedback;
        state.user_feedback = Some(feedback.rating);
        state.user_comment = feedback
            .comment
            .as_deref()
            .map(|c| sanitize_for_prompt(c).0);

        if state.retry_count >= deps.config.max_feedback_retries {
            let err = AppError::WorkflowTimeout(deps.config.workflow_timeout_secs);
            warn!(session_id = %session_id, retry_count = state.retry_count, "feedback retries exhausted");
            state.stage = Stage::Failed;
            state.error = Some("feedback retry limit exhausted".into());
            writer::snapshot_thread(&deps.threads, &state)?;
            return Err(err);
        }
        state.retry_count += 1;
        state.previous_report_id = state.report_id.take();
        state.previous_report = state.report.take().map(Box::new);

        let (events, _keepalive) = broadcast::channel(EVENT_BUS_CAPACITY);
        let cancel = CancellationToken::new();
        self.sessions.lock().expect("sessions lock").insert(
            session_id.clone(),
            SessionEntry {
                cancel: cancel.clone(),
                events: events.clone(),
            },
        );

        let result = self
            .drive_rerun(&mut state, &feedback, &events, &cancel)
            .await;
        self.sessions.lock().expect("sessions lock").remove(&session_id);

        match result {
            Ok(outcome) => Ok(RunOutput {
                session_id,
                status: Stage::Completed,
                report: state.report.clone(),
                report_id: state.report_id.clone(),
                saved_files: outcome.saved_files,
                error: None,
            }),
            Err(err) => {
                let output = self.fail(&session_id, &mut state, &events, err);
                Ok(output)
            }
        }
    }

    async fn drive_rerun(
        &self,
        state: &mut WorkflowState,
        feedback: &FeedbackInput,
        events: &broadcast::Sender<WorkflowEvent>,
        cancel: &CancellationToken,
    ) -> AppResult<writer::WriteOutcome> {
        let deps = &self.deps;

        if !feedback.focus_areas.is_empty() {
            // Restricted collection covering only the new intents, search
            // providers only.
            let focus = planner::focus_intents(&state.client_name, &feedback.focus_areas);
            state.plan.extend(focus.iter().cloned());
            self.transition(state, Stage::Collecting)?;

            let search_only: HashSet<String> = deps
                .sources
                .iter()
                .filter(|s| !s.is_critical() && !s.requires_inn())
                .map(|s| s.name().to_string())
                .collect();
            let collected = collector::collect(collector::CollectorRun {
                sources: &deps.sources,
                client_name: &state.client_name,
                inn: state.inn.as_deref(),
                plan: &focus,
                session_permits: Arc::new(Semaphore::new(deps.config.max_concurrent_searches)),
                global_permits: deps.global_search_permits.clone(),
                cancel: cancel.clone(),
                events: events.clone(),
                only_sources: Some(search_only),
            })
            .await?;
            for (name, envelope) in collected.source_data {
                state.source_data.insert(name, envelope);
            }
            state.search_results.extend(collected.search_results);
        }

        self.transition(state, Stage::Analyzing)?;
        let _ = events.send(WorkflowEvent::StageStarted {
            stage: Stage::Analyzing,
            percent: 70,
        });

        let report = analyzer::analyze(&deps.generator, state, cancel).await?;
        state.report = Some(report.clone());
        let _ = events.send(WorkflowEvent::ReportReady {
            report: Box::new(report),
        });

        // The feedback that triggered this rerun applied to the previous
        // report; the fresh report has not been rejected.
        state.user_feedback = None;

        self.transition(state, Stage::AwaitingFeedback)?;
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(state.session_id.clone()));
        }
        self.transition(state, Stage::Persisting)?;
        let outcome = writer::persist_report(&deps.reports, state)?;
        self.transition(state, Stage::Completed)?;
        writer::snapshot_thread(&deps.threads, state)?;

        let _ = events.send(WorkflowEvent::AwaitingFeedback {
            report_id: outcome.report_id.clone(),
        });
        let _ = events.send(WorkflowEvent::RunResult {
            report: Box::new(state.report.clone().expect("report set above")),
            saved_files: outcome.saved_files.clone(),
        });
        let _ = events.send(WorkflowEvent::Completed {
            session_id: state.session_id.clone(),
        });

        Ok(outcome)
    }
}
