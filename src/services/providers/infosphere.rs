//! InfoSphere Analytics Client
//!
//! Financial analytics by INN: liquidity and debt ratios, credit rating,
//! risk flags. Critical source; results cache for 1 h.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{DataSource, ProviderContext, SourcePayload, SourceQuery};
use crate::services::http::RequestOptions;
use crate::storage::cache::cached_call;
use crate::utils::error::{AppError, AppResult};
use crate::utils::inn::is_valid_inn;

const INFOSPHERE_API_URL: &str = "https://api.i-sphere.ru/v1/company";

/// Typed analytics record.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsRecord {
    pub inn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debt_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_rating: Option<String>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
}

pub struct InfosphereClient {
    ctx: ProviderContext,
}

impl InfosphereClient {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    fn api_key(&self) -> Option<&str> {
        self.ctx.config.keys.infosphere_key.as_deref()
    }

    async fn lookup(&self, inn: &str) -> AppResult<Value> {
        let key = self.api_key().ok_or_else(|| AppError::Provider {
            status: 0,
            message: "infosphere not configured".into(),
        })?;

        let opts = RequestOptions::for_service("infosphere")
            .header("X-Api-Key", key.to_string())
            .json(json!({"inn": inn}));

        let response = self
            .ctx
            .gateway
            .request_json(Method::POST, INFOSPHERE_API_URL, opts)
            .await?;

        let record = AnalyticsRecord {
            inn: inn.to_string(),
            liquidity_ratio: response
                .pointer("/financials/liquidity_ratio")
                .or_else(|| response.get("liquidity_ratio"))
                .and_then(|v| v.as_f64()),
            debt_ratio: response
                .pointer("/financials/debt_ratio")
                .or_else(|| response.get("debt_ratio"))
                .and_then(|v| v.as_f64()),
            credit_rating: response
                .pointer("/financials/credit_rating")
                .or_else(|| response.get("credit_rating"))
                .and_then(|v| v.as_str())
                .map(String::from),
            risk_flags: response
                .get("risk_flags")
                .and_then(|v| v.as_array())
                .map(|flags| {
                    flags
                        .iter()
                        .filter_map(|f| f.as_str())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        };
        Ok(serde_json::to_value(record)?)
    }
}

#[async_trait]
impl DataSource for InfosphereClient {
    fn name(&self) -> &'static str {
        "infosphere"
    }

    fn is_critical(&self) -> bool {
        true
    }

    fn requires_inn(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.ctx.config.timeout_for("infosphere").total()
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    async fn fetch(&self, query: &SourceQuery) -> AppResult<SourcePayload> {
        let inn = query
            .inn
            .as_deref()
            .filter(|inn| is_valid_inn(inn))
            .ok_or_else(|| AppError::invalid_input("infosphere requires a valid INN"))?;

        let ttl = self.ctx.config.cache_ttl_for("infosphere");
        let data = cached_call(
            &self.ctx.cache,
            "infosphere",
            &format!("inn={}", inn),
            ttl,
            || self.lookup(inn),
        )
        .await?;
        Ok(SourcePayload::complete(data))
    }

    async fn healthcheck(&self, timeout: Duration) -> AppResult<()> {
        tokio::time::timeout(timeout, self.lookup("7736050003"))
            .await
            .map_err(|_| AppError::Timeout {
                context: "infosphere healthcheck".into(),
                elapsed_ms: timeout.as_millis() as u64,
            })??;
        Ok(())
    }
}
