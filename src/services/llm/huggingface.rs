//! HuggingFace Provider
//!
//! First fallback. Uses the HF inference router's OpenAI-compatible
//! chat-completions endpoint.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;

use super::provider::{map_gateway_error, missing_api_key_error, LlmProvider};
use super::types::{GenerationParams, LlmError, LlmResult};
use crate::services::http::{HttpGateway, RequestOptions};

const HUGGINGFACE_API_URL: &str = "https://router.huggingface.co/v1/chat/completions";
const DEFAULT_MODEL: &str = "meta-llama/Meta-Llama-3.1-70B-Instruct";

pub struct HuggingFaceProvider {
    gateway: Arc<HttpGateway>,
    api_key: Option<String>,
    model: String,
}

impl HuggingFaceProvider {
    pub fn new(gateway: Arc<HttpGateway>, api_key: Option<String>) -> Self {
        Self {
            gateway,
            api_key,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for HuggingFaceProvider {
    fn name(&self) -> &'static str {
        "huggingface"
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
        let opts = RequestOptions::for_service("huggingface")
            .header("Authorization", format!("Bearer {}", key))
            .json(body);

        let response = self
            .gateway
            .request_json(Method::POST, HUGGINGFACE_API_URL, opts)
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
        let opts = RequestOptions::for_service("huggingface")
            .header("Authorization", format!("Bearer {}", key));
        self.gateway
            .request_json(Method::GET, "https://router.huggingface.co/v1/models", opts)
            .await
            .map_err(|e| map_gateway_error(e, self.name()))?;
        Ok(())
    }
}
