//! Reports Routes
//!
//! Paginated listing with indexed filters, detail fetch, aggregate stats,
//! and admin deletion.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::auth::require_admin;
use crate::api::error::ApiError;
use crate::api::rate_limit::{client_ip, RouteClass};
use crate::models::RiskLevel;
use crate::state::AppState;
use crate::storage::ReportFilter;

#[derive(Debug, Deserialize)]
pub struct ReportsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub inn: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_risk_score: Option<u32>,
    #[serde(default)]
    pub max_risk_score: Option<u32>,
}

fn default_limit() -> u32 {
    50
}

/// `GET /reports` — filtered, paginated listing.
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ReportsQuery>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Reports)?;

    let risk_level = match &query.risk_level {
        Some(raw) => Some(
            RiskLevel::parse(raw)
                .ok_or_else(|| ApiError::invalid_input(format!("unknown risk_level '{}'", raw)))?,
        ),
        None => None,
    };
    if let (Some(min), Some(max)) = (query.min_risk_score, query.max_risk_score) {
        if min > max {
            return Err(ApiError::invalid_input("min_risk_score exceeds max_risk_score"));
        }
    }

    let filter = ReportFilter {
        inn: query.inn.clone(),
        risk_level,
        client_name: query.client_name.clone(),
        date_from: query.date_from,
        date_to: query.date_to,
        min_risk_score: query.min_risk_score,
        max_risk_score: query.max_risk_score,
        limit: query.limit,
        offset: query.offset,
    };

    let reports = state.reports.list(&filter)?;
    Ok(Json(json!({
        "reports": reports,
        "count": reports.len(),
        "limit": filter.limit,
        "offset": filter.offset,
    })))
}

/// `GET /reports/stats` — counts and mean score per risk band.
pub async fn reports_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Reports)?;

    let stats = state.reports.stats()?;
    Ok(Json(serde_json::to_value(stats).map_err(crate::utils::error::AppError::from)?))
}

/// `GET /reports/{report_id}` — full stored report.
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(report_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Reports)?;

    let report = state
        .reports
        .get(&report_id)?
        .ok_or_else(|| ApiError::not_found(format!("report {} not found", report_id)))?;
    Ok(Json(serde_json::to_value(report).map_err(crate::utils::error::AppError::from)?))
}

/// `DELETE /reports/{report_id}` — admin-only removal.
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(report_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Admin)?;
    require_admin(&headers, &state.config)?;

    if state.reports.delete(&report_id)? {
        Ok(Json(json!({"report_id": report_id, "deleted": true})))
    } else {
        Err(ApiError::not_found(format!("report {} not found", report_id)))
    }
}
