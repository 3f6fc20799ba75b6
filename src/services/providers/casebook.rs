//! Casebook Court-Cases Client
//!
//! Arbitration-case history by INN, paginated. Hitting the pagination cap
//! yields a partial (still usable) result. Results cache for 160 min.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{DataSource, ProviderContext, SourcePayload, SourceQuery};
use crate::services::http::{PaginationStop, RequestOptions};
use crate::storage::cache::cached_call;
use crate::utils::error::{AppError, AppResult};
use crate::utils::inn::is_valid_inn;

const CASEBOOK_API_URL: &str = "https://api.casebook.ru/v1/cases";

/// One arbitration case, normalized from the upstream row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourtCase {
    pub case_number: String,
    pub category: String,
    /// "plaintiff" or "defendant"
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

pub struct CasebookClient {
    ctx: ProviderContext,
}

impl CasebookClient {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    fn api_key(&self) -> Option<&str> {
        self.ctx.config.keys.casebook_key.as_deref()
    }

    async fn fetch_cases(&self, inn: &str) -> AppResult<Value> {
        let key = self.api_key().ok_or_else(|| AppError::Provider {
            status: 0,
            message: "casebook not configured".into(),
        })?;

        let opts = RequestOptions::for_service("casebook")
            .header("Authorization", format!("Bearer {}", key))
            .query("inn", inn);

        let outcome = self
            .ctx
            .gateway
            .fetch_all_pages(Method::GET, CASEBOOK_API_URL, opts)
            .await?;

        let cases: Vec<CourtCase> = outcome
            .items
            .iter()
            .filter_map(normalize_case)
            .collect();

        Ok(json!({
            "cases": cases,
            "pages_fetched": outcome.pages_fetched,
            "truncated": outcome.stopped == PaginationStop::PageCap,
        }))
    }
}

fn normalize_case(row: &Value) -> Option<CourtCase> {
    let case_number = row
        .get("case_number")
        .or_else(|| row.get("number"))
        .and_then(|v| v.as_str())?
        .to_string();
    Some(CourtCase {
        case_number,
        category: row
            .get("category")
            .or_else(|| row.get("case_type"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        role: row
            .get("role")
            .and_then(|v| v.as_str())
            .unwrap_or("defendant")
            .to_string(),
        amount: row.get("amount").and_then(|v| v.as_f64()),
        started_at: row
            .get("started_at")
            .or_else(|| row.get("date"))
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

#[async_trait]
impl DataSource for CasebookClient {
    fn name(&self) -> &'static str {
        "casebook"
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn requires_inn(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.ctx.config.timeout_for("casebook").total()
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    async fn fetch(&self, query: &SourceQuery) -> AppResult<SourcePayload> {
        let inn = query
            .inn
            .as_deref()
            .filter(|inn| is_valid_inn(inn))
            .ok_or_else(|| AppError::invalid_input("casebook requires a valid INN"))?;

        let ttl = self.ctx.config.cache_ttl_for("casebook");
        let data = cached_call(&self.ctx.cache, "casebook", &format!("inn={}", inn), ttl, || {
            self.fetch_cases(inn)
        })
        .await?;

        let truncated = data
            .get("truncated")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        Ok(SourcePayload {
            data,
            partial: truncated,
            partial_note: truncated.then(|| "pagination stopped at page cap".to_string()),
        })
    }

    async fn healthcheck(&self, timeout: Duration) -> AppResult<()> {
        let key = self.api_key().ok_or_else(|| AppError::Provider {
            status: 0,
            message: "casebook not configured".into(),
        })?;
        let opts = RequestOptions::for_service("casebook")
            .header("Authorization", format!("Bearer {}", key))
            .query("inn", "7736050003")
            .query("page", "1");
        tokio::time::timeout(
            timeout,
            self.ctx
                .gateway
                .request_json(Method::GET, CASEBOOK_API_URL, opts),
        )
        .await
        .map_err(|_| AppError::Timeout {
            context: "casebook healthcheck".into(),
            elapsed_ms: timeout.as_millis() as u64,
        })??;
        Ok(())
    }
}
