//! External Provider Clients
//!
//! One client per upstream data provider, all built on the resilient HTTP
//! gateway with read-through caching. Results are wrapped in a uniform
//! `SourceResultEnvelope` so the collector can aggregate partial failures
//! without special cases.

pub mod casebook;
pub mod dadata;
pub mod infosphere;
pub mod perplexity;
pub mod sentiment;
pub mod tavily;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::http::HttpGateway;
use crate::storage::CacheRepository;
use crate::utils::error::AppResult;

pub use sentiment::{label_text, SentimentLexicon};

/// Outcome status of one source call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Success,
    Partial,
    Failed,
}

/// Uniform wrapper around one provider result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResultEnvelope {
    pub source: String,
    pub status: SourceStatus,
    #[serde(default)]
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl SourceResultEnvelope {
    pub fn success(source: &str, payload: Value, duration_ms: u64) -> Self {
        Self {
            source: source.to_string(),
            status: SourceStatus::Success,
            payload,
            error: None,
            duration_ms,
        }
    }

    pub fn partial(source: &str, payload: Value, duration_ms: u64, note: &str) -> Self {
        Self {
            source: source.to_string(),
            status: SourceStatus::Partial,
            payload,
            error: Some(note.to_string()),
            duration_ms,
        }
    }

    pub fn failed(source: &str, error: String, duration_ms: u64) -> Self {
        Self {
            source: source.to_string(),
            status: SourceStatus::Failed,
            payload: Value::Null,
            error: Some(error),
            duration_ms,
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.status, SourceStatus::Success | SourceStatus::Partial)
    }
}

/// What a fetch produced: the payload plus whether it is knowingly
/// incomplete (e.g. pagination stopped at the cap).
#[derive(Debug, Clone)]
pub struct SourcePayload {
    pub data: Value,
    pub partial: bool,
    pub partial_note: Option<String>,
}

impl SourcePayload {
    pub fn complete(data: Value) -> Self {
        Self {
            data,
            partial: false,
            partial_note: None,
        }
    }
}

/// Inputs handed to every source by the collector.
#[derive(Debug, Clone, Default)]
pub struct SourceQuery {
    pub client_name: String,
    pub inn: Option<String>,
    /// Search queries derived from the plan, in plan order
    pub queries: Vec<String>,
}

impl SourceQuery {
    /// The primary query for single-shot search providers.
    pub fn primary_query(&self) -> String {
        self.queries
            .first()
            .cloned()
            .unwrap_or_else(|| self.client_name.clone())
    }
}

/// The seam between the collector and concrete providers. Production
/// implementations live in this module; tests substitute stubs.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Source identifier used in envelopes, cache keys and reports.
    fn name(&self) -> &'static str;

    /// Critical sources: both failing aborts the workflow.
    fn is_critical(&self) -> bool;

    /// Whether the source is keyed on INN and must be skipped without one.
    fn requires_inn(&self) -> bool {
        false
    }

    /// Per-source total timeout enforced by the collector.
    fn timeout(&self) -> Duration;

    /// Whether credentials are present.
    fn is_configured(&self) -> bool;

    /// Execute the typed call. INN-keyed sources validate the INN here.
    async fn fetch(&self, query: &SourceQuery) -> AppResult<SourcePayload>;

    /// Issue a minimal real request within the given deadline.
    async fn healthcheck(&self, timeout: Duration) -> AppResult<()>;
}

/// Shared plumbing for the concrete clients.
#[derive(Clone)]
pub struct ProviderContext {
    pub gateway: Arc<HttpGateway>,
    pub cache: CacheRepository,
    pub config: Arc<Config>,
}

impl ProviderContext {
    pub fn new(gateway: Arc<HttpGateway>, cache: CacheRepository, config: Arc<Config>) -> Self {
        Self {
            gateway,
            cache,
            config,
        }
    }
}

/// Build the production source set in collector order.
pub fn build_sources(ctx: &ProviderContext) -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(dadata::DadataClient::new(ctx.clone())),
        Arc::new(casebook::CasebookClient::new(ctx.clone())),
        Arc::new(infosphere::InfosphereClient::new(ctx.clone())),
        Arc::new(perplexity::PerplexityClient::new(ctx.clone())),
        Arc::new(tavily::TavilyClient::new(ctx.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_constructors() {
        let ok = SourceResultEnvelope::success("dadata", json!({"a": 1}), 12);
        assert_eq!(ok.status, SourceStatus::Success);
        assert!(ok.is_usable());
        assert!(ok.error.is_none());

        let failed = SourceResultEnvelope::failed("dadata", "timeout".into(), 30_000);
        assert_eq!(failed.status, SourceStatus::Failed);
        assert!(!failed.is_usable());

        let partial =
            SourceResultEnvelope::partial("casebook", json!([1]), 100, "stopped at page cap");
        assert!(partial.is_usable());
    }

    #[test]
    fn test_envelope_serialization() {
        let env = SourceResultEnvelope::success("tavily", json!({}), 5);
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_primary_query_fallback() {
        let query = SourceQuery {
            client_name: "Acme".into(),
            ..Default::default()
        };
        assert_eq!(query.primary_query(), "Acme");

        let query = SourceQuery {
            client_name: "Acme".into(),
            queries: vec!["репутация Acme отзывы".into()],
            ..Default::default()
        };
        assert_eq!(query.primary_query(), "репутация Acme отзывы");
    }
}
