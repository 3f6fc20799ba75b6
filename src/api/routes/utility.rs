//! Utility Routes
//!
//! Health (shallow and deep), HTTP metrics, circuit-breaker state and
//! reset, storage statistics and cache administration.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::api::auth::require_admin;
use crate::api::error::ApiError;
use crate::api::rate_limit::{client_ip, RouteClass};
use crate::state::AppState;

const DEEP_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    #[serde(default)]
    pub deep: bool,
}

/// `GET /utility/health` — shallow config check, or deep real probes.
pub async fn health(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HealthQuery>,
) -> Result<Json<Value>, ApiError> {
    let storage_fallback = state.storage.is_fallback();
    let configured_sources: Vec<&str> = state
        .engine
        .deps()
        .sources
        .iter()
        .filter(|s| s.is_configured())
        .map(|s| s.name())
        .collect();
    let llm_configured = state.llm.configured_count();

    let mut body = json!({
        "status": if storage_fallback { "degraded" } else { "ok" },
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "storage": {
            "backend": if storage_fallback { "memory" } else { "sqlite" },
            "fallback_active": storage_fallback,
        },
        "sources_configured": configured_sources,
        "llm_providers_configured": llm_configured,
        "running_sessions": state.engine.running_sessions(),
    });

    if query.deep {
        let storage_healthy = state.storage.ping();

        let mut source_health = serde_json::Map::new();
        for source in &state.engine.deps().sources {
            if !source.is_configured() {
                source_health.insert(source.name().into(), json!("not_configured"));
                continue;
            }
            let healthy = source.healthcheck(DEEP_PROBE_TIMEOUT).await.is_ok();
            source_health.insert(source.name().into(), json!(healthy));
        }

        let llm_health: Vec<Value> = state
            .llm
            .health_report()
            .await
            .into_iter()
            .map(|(name, healthy)| json!({"provider": name, "healthy": healthy}))
            .collect();

        if let Some(map) = body.as_object_mut() {
            map.insert("storage_healthy".into(), json!(storage_healthy));
            map.insert("sources".into(), Value::Object(source_health));
            map.insert("llm".into(), json!(llm_health));
            if !storage_healthy {
                map.insert("status".into(), json!("degraded"));
            }
        }
    }

    Ok(Json(body))
}

/// `GET /utility/metrics` — per-service HTTP metrics snapshot.
pub async fn metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Admin)?;
    Ok(Json(json!({"services": state.gateway.metrics_snapshot()})))
}

/// `GET /utility/circuit-breakers` — per-host breaker state.
pub async fn circuit_breakers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Admin)?;
    Ok(Json(json!({"breakers": state.gateway.breaker_statuses()})))
}

/// `POST /utility/circuit-breakers/{service}/reset` — admin force reset.
pub async fn reset_circuit_breaker(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(service): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Admin)?;
    require_admin(&headers, &state.config)?;

    if state.gateway.reset_breaker(&service) {
        Ok(Json(json!({"service": service, "reset": true})))
    } else {
        Err(ApiError::not_found(format!(
            "no circuit breaker for service {}",
            service
        )))
    }
}

/// `GET /utility/stats/storage` — counters and per-space statistics.
pub async fn storage_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Admin)?;

    let cache_stats = state.cache.space_stats()?;
    Ok(Json(json!({
        "counters": state.storage.stats.snapshot(),
        "cache": cache_stats,
        "reports": {"count": state.reports.count()?},
        "threads": {"count": state.threads.count()?},
        "queue": state.broker.depths(),
        "backend": if state.storage.is_fallback() { "memory" } else { "sqlite" },
    })))
}

#[derive(Debug, Deserialize)]
pub struct CacheClearQuery {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub all: bool,
}

/// `DELETE /utility/cache` — admin cache invalidation, via the cache
/// queue so the invalidation survives request-path failures.
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CacheClearQuery>,
) -> Result<Json<Value>, ApiError> {
    state
        .rate_limiter
        .check(&client_ip(&headers), RouteClass::Admin)?;
    require_admin(&headers, &state.config)?;

    if !query.all && query.prefix.is_none() {
        return Err(ApiError::invalid_input("provide prefix= or all=true"));
    }
    state
        .publisher
        .publish_cache_invalidate(query.prefix.clone(), query.all);
    Ok(Json(json!({
        "enqueued": true,
        "prefix": query.prefix,
        "all": query.all,
    })))
}
