//! Agent Routes
//!
//! Analysis entry points: synchronous and SSE-streamed runs, thread
//! listing and history, session cancellation, the feedback loop, and the
//! asynchronous queue path.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::rate_limit::{client_ip, RouteClass};
use crate::api::sse::event_stream;
use crate::models::TaskStatus;
use crate::services::workflow::{AnalysisInput, FeedbackInput, FeedbackRating, Stage};
use crate::state::AppState;
use crate::utils::inn::normalize_inn;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub client_name: String,
    #[serde(default)]
    pub inn: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub session_id: String,
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inn: Option<String>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_files: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// `POST /agent/analyze-client` — run an analysis, streamed or batch.
pub async fn analyze_client(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyzeQuery>,
    headers: HeaderMap,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Response, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Analyze)?;

    let client_name = body.client_name.trim().to_string();
    if client_name.is_empty() {
        return Err(ApiError::invalid_input("client_name is required"));
    }
    let inn = normalize_inn(body.inn.as_deref());

    let input = AnalysisInput {
        session_id: None,
        client_name: client_name.clone(),
        inn: inn.clone(),
        notes: body.additional_notes.clone(),
    };

    if query.stream {
        let (_session_id, receiver) = state.engine.clone().spawn(input);
        return Ok(event_stream(receiver).into_response());
    }

    let output = state.engine.run(input).await;
    let response = AnalyzeResponse {
        session_id: output.session_id,
        client_name,
        inn,
        status: if output.status == Stage::Completed {
            "success"
        } else {
            "failed"
        },
        report: output
            .report
            .as_ref()
            .and_then(|r| serde_json::to_value(r).ok()),
        report_id: output.report_id,
        saved_files: Some(output.saved_files),
        error: output
            .error
            .map(|(kind, message)| json!({"kind": kind, "message": message})),
    };
    Ok(Json(response).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ThreadsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub inn: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// `GET /agent/threads` — newest-first summaries.
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ThreadsQuery>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Threads)?;

    let threads = match &query.inn {
        Some(inn) => state.threads.list_threads_by_inn(inn, query.limit)?,
        None => state.threads.list_summaries(query.limit, query.offset)?,
    };
    Ok(Json(json!({"threads": threads, "count": threads.len()})))
}

/// `GET /agent/thread_history/{thread_id}` — the full snapshot.
pub async fn thread_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(thread_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Threads)?;

    let record = state
        .threads
        .get(&thread_id)?
        .ok_or_else(|| ApiError::not_found(format!("thread {} not found", thread_id)))?;
    Ok(Json(serde_json::to_value(record).map_err(crate::utils::error::AppError::from)?))
}

/// `DELETE /agent/analyze/{session_id}` — cancel a running session.
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Threads)?;

    if state.engine.cancel_session(&session_id) {
        Ok(Json(json!({"session_id": session_id, "cancelled": true})))
    } else {
        Err(ApiError::not_found(format!(
            "no running session {}",
            session_id
        )))
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub report_id: String,
    pub rating: FeedbackRating,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub rerun_analysis: bool,
}

/// `POST /agent/feedback` — record a verdict; optionally re-run.
pub async fn feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Threads)?;

    let thread = state
        .threads
        .find_by_report(&body.report_id)?
        .ok_or_else(|| ApiError::not_found(format!("no thread for report {}", body.report_id)))?;

    let rerun = body.rerun_analysis && body.rating != FeedbackRating::Accurate;
    if !rerun {
        // Verdict only: annotate the snapshot and stop.
        let mut thread_data = thread.thread_data.clone();
        if let Some(map) = thread_data.as_object_mut() {
            map.insert("user_feedback".into(), json!(body.rating));
            if let Some(comment) = &body.comment {
                map.insert("user_comment".into(), json!(comment));
            }
        }
        state.threads.save_thread(
            &thread.thread_id,
            &thread_data,
            &thread.client_name,
            thread.inn.as_deref(),
            thread.report_id.as_deref(),
        )?;
        return Ok(Json(json!({
            "report_id": body.report_id,
            "rating": body.rating,
            "rerun": false,
        })));
    }

    let output = state
        .engine
        .rerun_with_feedback(
            thread,
            FeedbackInput {
                rating: body.rating,
                comment: body.comment,
                focus_areas: body.focus_areas,
            },
        )
        .await?;

    Ok(Json(json!({
        "session_id": output.session_id,
        "status": if output.status == Stage::Completed { "success" } else { "failed" },
        "report_id": output.report_id,
        "report": output.report,
        "previous_report_id": body.report_id,
        "error": output.error.map(|(kind, message)| json!({"kind": kind, "message": message})),
    })))
}

#[derive(Debug, Deserialize)]
pub struct AsyncAnalyzeRequest {
    pub client_name: String,
    #[serde(default)]
    pub inn: Option<String>,
    #[serde(default)]
    pub additional_notes: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
}

/// `POST /agent/analyze-client/async` — enqueue, return the task id.
pub async fn analyze_client_async(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AsyncAnalyzeRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Analyze)?;

    let task_id = state.publisher.publish_analysis(
        &body.client_name,
        normalize_inn(body.inn.as_deref()),
        body.additional_notes,
        body.priority,
    )?;
    Ok(Json(json!({"task_id": task_id, "status": TaskStatus::Pending})))
}

/// `GET /agent/task/{task_id}` — observable task status.
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Threads)?;

    let record = state
        .broker
        .task_record(&task_id)
        .ok_or_else(|| ApiError::not_found(format!("task {} not found", task_id)))?;
    Ok(Json(json!({
        "task_id": task_id,
        "status": record.status,
        "result": record.result,
        "error": record.error,
    })))
}
