//! OpenRouter Provider
//!
//! Primary provider of the cascade. Speaks the OpenAI-compatible
//! chat-completions dialect through the resilient gateway.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;

use super::provider::{map_gateway_error, missing_api_key_error, LlmProvider};
use super::types::{GenerationParams, LlmError, LlmResult};
use crate::services::http::{HttpGateway, RequestOptions};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

pub struct OpenRouterProvider {
    gateway: Arc<HttpGateway>,
    api_key: Option<String>,
    model: String,
}

impl OpenRouterProvider {
    pub fn new(gateway: Arc<HttpGateway>, api_key: Option<String>) -> Self {
        Self {
            gateway,
            api_key,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    fn build_body(&self, system: Option<&str>, prompt: &str, params: &GenerationParams) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(json!({"role": "system", "content": sys}));
        }
        messages.push(json!({"role": "user", "content": prompt}));
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        })
    }

    fn options(&self, key: &str) -> RequestOptions {
        RequestOptions::for_service("openrouter")
            .header("Authorization", format!("Bearer {}", key))
            .header("Content-Type", "application/json")
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &GenerationParams,
    ) -> LlmResult<String> {
        let key = self.api_key.as_deref().ok_or_else(|| missing_api_key_error(self.name()))?;
        let body = self.build_body(system, prompt, params);

        let response = self
            .gateway
            .request_json(Method::POST, OPENROUTER_API_URL, self.options(key).json(body))
            .await
            .map_err(|e| map_gateway_error(e, self.name()))?;

        let content = response
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }

    async fn health_check(&self) -> LlmResult<()> {
        let key = self.api_key.as_deref().ok_or_else(|| missing_api_key_error(self.name()))?;
        self.gateway
            .request_json(
                Method::GET,
                "https://openrouter.ai/api/v1/models",
                self.options(key),
            )
            .await
            .map_err(|e| map_gateway_error(e, self.name()))?;
        Ok(())
    }
}
