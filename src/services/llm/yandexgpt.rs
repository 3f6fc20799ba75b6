//! YandexGPT Provider
//!
//! Last fallback. Uses the foundation-models completion endpoint, which
//! has its own request/response shape (modelUri + alternatives).

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;

use super::provider::{map_gateway_error, missing_api_key_error, LlmProvider};
use super::types::{GenerationParams, LlmError, LlmResult};
use crate::services::http::{HttpGateway, RequestOptions};

const YANDEX_API_URL: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";

pub struct YandexGptProvider {
    gateway: Arc<HttpGateway>,
    api_key: Option<String>,
    folder_id: Option<String>,
    model: String,
}

impl YandexGptProvider {
    pub fn new(gateway: Arc<HttpGateway>, api_key: Option<String>, folder_id: Option<String>) -> Self {
        Self {
            gateway,
            api_key,
            folder_id,
            model: "yandexgpt/latest".to_string(),
        }
    }

    fn model_uri(&self) -> String {
        format!(
            "gpt://{}/{}",
            self.folder_id.as_deref().unwrap_or_default(),
            self.model
        )
    }
}

#[async_trait]
impl LlmProvider for YandexGptProvider {
    fn name(&self) -> &'static str {
        "yandexgpt"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.folder_id.is_some()
    }

    async fn generate(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &GenerationParams,
    ) -> LlmResult<String> {
        let key = self.api_key.as_deref().ok_or_else(|| missing_api_key_error(self.name()))?;

        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(json!({"role": "system", "text": sys}));
        }
        messages.push(json!({"role": "user", "text": prompt}));

        let body = json!({
            "modelUri": self.model_uri(),
            "completionOptions": {
                "temperature": params.temperature,
                "maxTokens": params.max_tokens.to_string(),
            },
            "messages": messages,
        });
        let opts = RequestOptions::for_service("yandexgpt")
            .header("Authorization", format!("Api-Key {}", key))
            .json(body);

        let response = self
            .gateway
            .request_json(Method::POST, YANDEX_API_URL, opts)
            .await
            .map_err(|e| map_gateway_error(e, self.name()))?;

        let content = response
            .pointer("/result/alternatives/0/message/text")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }

    async fn health_check(&self) -> LlmResult<()> {
        // Minimal real completion; there is no cheap list endpoint.
        self.generate(
            None,
            "ping",
            &GenerationParams {
                temperature: 0.0,
                max_tokens: 1,
            },
        )
        .await
        .map(|_| ())
    }
}
