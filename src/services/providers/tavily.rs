//! Tavily Search Client
//!
//! Snippet-level web search with an aggregate answer. Non-critical;
//! results cache for 5 min.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

use super::{DataSource, ProviderContext, SourcePayload, SourceQuery};
use crate::services::http::RequestOptions;
use crate::storage::cache::cached_call;
use crate::utils::error::{AppError, AppResult};

const TAVILY_API_URL: &str = "https://api.tavily.com/search";
const MAX_RESULTS: u32 = 10;

pub struct TavilyClient {
    ctx: ProviderContext,
}

impl TavilyClient {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    fn api_key(&self) -> Option<&str> {
        self.ctx.config.keys.tavily_key.as_deref()
    }

    async fn search(&self, client_name: &str, query: &str) -> AppResult<Value> {
        let key = self.api_key().ok_or_else(|| AppError::Provider {
            status: 0,
            message: "tavily not configured".into(),
        })?;

        let body = json!({
            "api_key": key,
            "query": format!("{} {}", client_name, query),
            "search_depth": "advanced",
            "max_results": MAX_RESULTS,
            "include_answer": true,
        });
        let opts = RequestOptions::for_service("tavily").json(body);

        let response = self
            .ctx
            .gateway
            .request_json(Method::POST, TAVILY_API_URL, opts)
            .await?;

        let results: Vec<Value> = response
            .get("results")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        json!({
                            "title": item.get("title").and_then(|v| v.as_str()).unwrap_or_default(),
                            "content": item.get("content").and_then(|v| v.as_str()).unwrap_or_default(),
                            "url": item.get("url").and_then(|v| v.as_str()).unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({
            "answer": response.get("answer").and_then(|v| v.as_str()).unwrap_or_default(),
            "results": results,
        }))
    }
}

#[async_trait]
impl DataSource for TavilyClient {
    fn name(&self) -> &'static str {
        "tavily"
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn timeout(&self) -> Duration {
        self.ctx.config.timeout_for("tavily").total()
    }

    fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }

    async fn fetch(&self, query: &SourceQuery) -> AppResult<SourcePayload> {
        let search_query = query.primary_query();
        let ttl = self.ctx.config.cache_ttl_for("tavily");
        let cache_args = format!("client={};q={}", query.client_name, search_query);
        let data = cached_call(&self.ctx.cache, "tavily", &cache_args, ttl, || {
            self.search(&query.client_name, &search_query)
        })
        .await?;
        Ok(SourcePayload::complete(data))
    }

    async fn healthcheck(&self, timeout: Duration) -> AppResult<()> {
        tokio::time::timeout(timeout, self.search("ping", "ping"))
            .await
            .map_err(|_| AppError::Timeout {
                context: "tavily healthcheck".into(),
                elapsed_ms: timeout.as_millis() as u64,
            })??;
        Ok(())
    }
}
