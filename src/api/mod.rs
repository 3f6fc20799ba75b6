//! HTTP API Surface
//!
//! Routes under `/api/v1`: analysis entry points (sync, SSE, queued),
//! thread and report access, feedback, and operational utilities. JSON
//! in/out; admin routes gated by `X-Auth-Token`.

pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod sse;

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/agent/analyze-client", post(routes::agent::analyze_client))
        .route(
            "/agent/analyze-client/async",
            post(routes::agent::analyze_client_async),
        )
        .route("/agent/task/:task_id", get(routes::agent::task_status))
        .route("/agent/threads", get(routes::agent::list_threads))
        .route(
            "/agent/thread_history/:thread_id",
            get(routes::agent::thread_history),
        )
        .route(
            "/agent/analyze/:session_id",
            delete(routes::agent::cancel_session),
        )
        .route("/agent/feedback", post(routes::agent::feedback))
        .route("/reports", get(routes::reports::list_reports))
        .route("/reports/stats", get(routes::reports::reports_stats))
        .route(
            "/reports/:report_id",
            get(routes::reports::get_report).delete(routes::reports::delete_report),
        )
        .route("/utility/health", get(routes::utility::health))
        .route("/utility/metrics", get(routes::utility::metrics))
        .route(
            "/utility/circuit-breakers",
            get(routes::utility::circuit_breakers),
        )
        .route(
            "/utility/circuit-breakers/:service/reset",
            post(routes::utility::reset_circuit_breaker),
        )
        .route("/utility/stats/storage", get(routes::utility::storage_stats))
        .route("/utility/cache", delete(routes::utility::clear_cache));

    Router::new()
        .nest("/api/v1", api)
        .layer(cors)
        .with_state(state)
}
