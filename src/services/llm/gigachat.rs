//! GigaChat Provider
//!
//! Second fallback (Sber). Chat-completions dialect with a bearer access
//! token supplied via configuration; OAuth token exchange is an external
//! concern.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;

use super::provider::{map_gateway_error, missing_api_key_error, LlmProvider};
use super::types::{GenerationParams, LlmError, LlmResult};
use crate::services::http::{HttpGateway, RequestOptions};

const GIGACHAT_API_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "GigaChat-Pro";

pub struct GigaChatProvider {
    gateway: Arc<HttpGateway>,
    access_token: Option<String>,
    model: String,
}

impl GigaChatProvider {
    pub fn new(gateway: Arc<HttpGateway>, access_token: Option<String>) -> Self {
        Self {
            gateway,
            access_token,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for GigaChatProvider {
    fn name(&self) -> &'static str {
        "gigachat"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    async fn generate(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &GenerationParams,
    ) -> LlmResult<String> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| missing_api_key_error(self.name()))?;

        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(json!({"role": "system", "content": sys}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });
        let opts = RequestOptions::for_service("gigachat")
            .header("Authorization", format!("Bearer {}", token))
            .json(body);

        let response = self
            .gateway
            .request_json(Method::POST, GIGACHAT_API_URL, opts)
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
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| missing_api_key_error(self.name()))?;
        let opts = RequestOptions::for_service("gigachat")
            .header("Authorization", format!("Bearer {}", token));
        self.gateway
            .request_json(
                Method::GET,
                "https://gigachat.devices.sberbank.ru/api/v1/models",
                opts,
            )
            .await
            .map_err(|e| map_gateway_error(e, self.name()))?;
        Ok(())
    }
}
