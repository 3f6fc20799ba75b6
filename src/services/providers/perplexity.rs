//! Perplexity Deep-Search Client
//!
//! Question-answering web search with citations and a recency filter.
//! Non-critical; answers cache for 5 min only.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

use super::{DataSource, ProviderContext, SourcePayload, SourceQuery};
use crate::services::http::RequestOptions;
use crate::storage::cache::cached_call;
use crate::utils::error::{AppError, AppResult};

const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai/chat/completions";
const SEARCH_MODEL: &str = "sonar-pro";

pub struct PerplexityClient {
    ctx: ProviderContext,
}

impl PerplexityClient {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    fn api_key(&self) -> Option<&str> {
        self.ctx.config.keys.perplexity_key.as_deref()
    }

    async fn ask(&self, client_name: &str, question: &str) -> AppResult<Value> {
        let key = self.api_key().ok_or_else(|| AppError::Provider {
            status: 0,
            message: "perplexity not configured".into(),
        })?;

        let body = json!({
            "model": SEARCH_MODEL,
            "messages": [
                {
                    "role": "system",
                    "content": "Найди бизнес-информацию о компании. Выдели ключевые факты, риски, репутацию."
                },
                {
                    "role": "user",
                    "content": format!("Информация о компании {}: {}", client_name, question)
                }
            ],
            "search_recency_filter": "month",
        });
        let opts = RequestOptions::for_service("perplexity")
            .header("Authorization", format!("Bearer {}", key))
            .json(body);

        let response = self
            .ctx
            .gateway
            .request_json(Method::POST, PERPLEXITY_API_URL, opts)
            .await?;

        let content = response
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let citations: Vec<String> = response
            .get("citations")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| c.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({"content": content, "citations": citations}))
    }
}

#[async_trait]
impl DataSource for PerplexityClient {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn timeout(&self) -> Duration {
        self.ctx.config.timeout_for("perplexity").total()
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    async fn fetch(&self, query: &SourceQuery) -> AppResult<SourcePayload> {
        let question = query.primary_query();
        let ttl = self.ctx.config.cache_ttl_for("perplexity");
        let cache_args = format!("client={};q={}", query.client_name, question);
        let data = cached_call(&self.ctx.cache, "perplexity", &cache_args, ttl, || {
            self.ask(&query.client_name, &question)
        })
        .await?;
        Ok(SourcePayload::complete(data))
    }

    async fn healthcheck(&self, timeout: Duration) -> AppResult<()> {
        tokio::time::timeout(timeout, self.ask("ping", "ping"))
            .await
            .map_err(|_| AppError::Timeout {
                context: "perplexity healthcheck".into(),
                elapsed_ms: timeout.as_millis() as u64,
            })??;
        Ok(())
    }
}
