//! DaData Registry Client
//!
//! Company-registry (ЕГРЮЛ) lookup by INN: canonical name, legal status,
//! address and regulatory flags. Critical source; results cache for 2 h.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{DataSource, ProviderContext, SourcePayload, SourceQuery};
use crate::storage::cache::cached_call;
use crate::utils::error::{AppError, AppResult};
use crate::utils::inn::is_valid_inn;

const DADATA_API_URL: &str = "https://suggestions.dadata.ru/suggestions/api/4_1/rs/findById/party";

/// Typed registry record extracted from the upstream response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryRecord {
    pub inn: String,
    pub name_full: String,
    pub name_short: String,
    /// ACTIVE, LIQUIDATING, LIQUIDATED, BANKRUPT, REORGANIZING
    pub status: String,
    pub address: String,
    pub okved: String,
    pub management_name: String,
    pub registration_date: Option<String>,
    /// Regulatory flags surfaced by the registry
    pub sanctions_listed: bool,
    pub tax_debt: bool,
}

pub struct DadataClient {
    ctx: ProviderContext,
}

impl DadataClient {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    fn api_key(&self) -> Option<&str> {
        self.ctx.config.keys.dadata_key.as_deref()
    }

    async fn lookup(&self, inn: &str) -> AppResult<Value> {
        let key = self
            .api_key()
            .ok_or_else(|| AppError::Provider {
                status: 0,
                message: "dadata not configured".into(),
            })?;

        let opts = crate::services::http::RequestOptions::for_service("dadata")
            .header("Authorization", format!("Token {}", key))
            .header("Content-Type", "application/json")
            .json(json!({"query": inn}));

        let response = self
            .ctx
            .gateway
            .request_json(Method::POST, DADATA_API_URL, opts)
            .await?;

        let record = parse_registry_response(inn, &response)
            .ok_or_else(|| AppError::not_found(format!("no registry record for INN {}", inn)))?;
        Ok(serde_json::to_value(record)?)
    }
}

/// Map the upstream suggestion payload to the typed record.
fn parse_registry_response(inn: &str, response: &Value) -> Option<RegistryRecord> {
    let suggestion = response.get("suggestions")?.as_array()?.first()?;
    let data = suggestion.get("data")?;

    Some(RegistryRecord {
        inn: inn.to_string(),
        name_full: data
            .pointer("/name/full_with_opf")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        name_short: data
            .pointer("/name/short_with_opf")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        status: data
            .pointer("/state/status")
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN")
            .to_uppercase(),
        address: data
            .pointer("/address/unrestricted_value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        okved: data
            .get("okved")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        management_name: data
            .pointer("/management/name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        registration_date: data
            .pointer("/state/registration_date")
            .and_then(|v| v.as_str())
            .map(String::from),
        sanctions_listed: data
            .get("sanctions")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        tax_debt: data.get("tax_debt").and_then(|v| v.as_bool()).unwrap_or(false),
    })
}

#[async_trait]
impl DataSource for DadataClient {
    fn name(&self) -> &'static str {
        "dadata"
    }

    fn is_critical(&self) -> bool {
        true
    }

    fn requires_inn(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.ctx.config.timeout_for("dadata").total()
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    async fn fetch(&self, query: &SourceQuery) -> AppResult<SourcePayload> {
        let inn = query
            .inn
            .as_deref()
            .filter(|inn| is_valid_inn(inn))
            .ok_or_else(|| AppError::invalid_input("dadata requires a valid INN"))?;

        let ttl = self.ctx.config.cache_ttl_for("dadata");
        let data = cached_call(&self.ctx.cache, "dadata", &format!("inn={}", inn), ttl, || {
            self.lookup(inn)
        })
        .await?;
        Ok(SourcePayload::complete(data))
    }

    async fn healthcheck(&self, timeout: Duration) -> AppResult<()> {
        // Lookup of a well-known INN within the caller's deadline.
        tokio::time::timeout(timeout, self.lookup("7736050003"))
            .await
            .map_err(|_| AppError::Timeout {
                context: "dadata healthcheck".into(),
                elapsed_ms: timeout.as_millis() as u64,
            })??;
        Ok(())
    }
}
