//! LLM Provider Cascade
//!
//! Tries providers in a fixed order (OpenRouter → HuggingFace → GigaChat →
//! YandexGPT) until one produces usable output. Unconfigured providers are
//! skipped. JSON mode validates the output against a schema and allows a
//! single strict repair re-prompt per provider. Per-call latency, provider
//! used and fallback depth are emitted as a structured event.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::provider::LlmProvider;
use super::types::{GenerationOutcome, JsonOutcome, LlmRequest};
use crate::utils::error::{AppError, AppResult};

/// The seam the analyzer depends on; the cascade is the production
/// implementation, tests substitute stubs.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, request: &LlmRequest) -> AppResult<GenerationOutcome>;
    async fn generate_json(&self, request: &LlmRequest, schema: &Value) -> AppResult<JsonOutcome>;
}

pub struct LlmCascade {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl LlmCascade {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    fn configured(&self) -> impl Iterator<Item = &Arc<dyn LlmProvider>> {
        self.providers.iter().filter(|p| p.is_configured())
    }

    pub fn configured_count(&self) -> usize {
        self.configured().count()
    }

    /// Probe every configured provider; returns (name, healthy) pairs.
    pub async fn health_report(&self) -> Vec<(String, bool)> {
        let mut report = Vec::new();
        for provider in self.configured() {
            let healthy = provider.health_check().await.is_ok();
            report.push((provider.name().to_string(), healthy));
        }
        report
    }
}

#[async_trait]
impl TextGenerator for LlmCascade {
    async fn generate_text(&self, request: &LlmRequest) -> AppResult<GenerationOutcome> {
        let started = Instant::now();
        let mut fallback_depth = 0u32;
        let mut last_error = String::from("no providers configured");

        for provider in self.configured() {
            match provider
                .generate(request.system.as_deref(), &request.prompt, &request.params)
                .await
            {
                Ok(content) => {
                    let outcome = GenerationOutcome {
                        content,
                        provider_used: provider.name().to_string(),
                        model: provider.model().to_string(),
                        fallback_depth,
                        latency_ms: started.elapsed().as_millis() as u64,
                    };
                    info!(
                        provider_used = %outcome.provider_used,
                        fallback_depth = outcome.fallback_depth,
                        latency_ms = outcome.latency_ms,
                        "llm generation completed"
                    );
                    return Ok(outcome);
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "llm provider failed");
                    last_error = format!("{}: {}", provider.name(), err);
                    fallback_depth += 1;
                }
            }
        }

        Err(AppError::LlmUnavailable(last_error))
    }

    async fn generate_json(&self, request: &LlmRequest, schema: &Value) -> AppResult<JsonOutcome> {
        let started = Instant::now();
        let mut fallback_depth = 0u32;
        let mut last_error = String::from("no providers configured");
        let mut any_content = false;

        for provider in self.configured() {
            let first = provider
                .generate(request.system.as_deref(), &request.prompt, &request.params)
                .await;

            let attempt = match first {
                Ok(content) => {
                    any_content = true;
                    match parse_and_validate(&content, schema) {
                        Ok(value) => Some((value, false)),
                        Err(violation) => {
                            // One strict repair re-prompt per provider.
                            warn!(
                                provider = provider.name(),
                                violation = %violation,
                                "llm JSON invalid, attempting repair"
                            );
                            let repair_prompt = format!(
                                "Return ONLY valid JSON matching this schema, with no prose or \
                                 code fences:\n{}\n\nYour previous answer was:\n{}",
                                schema, content
                            );
                            match provider
                                .generate(request.system.as_deref(), &repair_prompt, &request.params)
                                .await
                            {
                                Ok(repaired) => match parse_and_validate(&repaired, schema) {
                                    Ok(value) => Some((value, true)),
                                    Err(violation) => {
                                        last_error = format!(
                                            "{}: schema violation after repair: {}",
                                            provider.name(),
                                            violation
                                        );
                                        None
                                    }
                                },
                                Err(err) => {
                                    last_error = format!("{}: {}", provider.name(), err);
                                    None
                                }
                            }
                        }
                    }
                }
                Err(err) => {
                    last_error = format!("{}: {}", provider.name(), err);
                    None
                }
            };

            if let Some((value, repaired)) = attempt {
                let outcome = JsonOutcome {
                    value,
                    provider_used: provider.name().to_string(),
                    fallback_depth,
                    repaired,
                    latency_ms: started.elapsed().as_millis() as u64,
                };
                info!(
                    provider_used = %outcome.provider_used,
                    fallback_depth = outcome.fallback_depth,
                    repaired = outcome.repaired,
                    latency_ms = outcome.latency_ms,
                    "llm JSON generation completed"
                );
                return Ok(outcome);
            }
            fallback_depth += 1;
        }

        if any_content {
            Err(AppError::SchemaMismatch(last_error))
        } else {
            Err(AppError::LlmUnavailable(last_error))
        }
    }
}

/// Pull a JSON object out of model text: strip code fences, else take the
/// outermost brace span. A single explicit extraction, not a loop of
/// catches.
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(fenced) = trimmed
        .split_once("```json")
        .or_else(|| trimmed.split_once("```"))
        .map(|(_, rest)| rest)
        .and_then(|rest| rest.split_once("```"))
        .map(|(inner, _)| inner.trim())
    {
        if !fenced.is_empty() {
            return Some(fenced);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        Some(&trimmed[start..=end])
    } else {
        None
    }
}

fn parse_and_validate(content: &str, schema: &Value) -> Result<Value, String> {
    let candidate = extract_json(content).ok_or_else(|| "no JSON object in output".to_string())?;
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| format!("malformed JSON: {}", e))?;
    validate_schema(&value, schema, "$")?;
    Ok(value)
}

/// Minimal JSON-Schema subset validator: `type`, `required`, `properties`,
/// `items`, `enum`. Returns the first violation with its path.
pub fn validate_schema(value: &Value, schema: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(|t| t.as_str()) {
        let ok = match expected {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            _ => true,
        };
        if !ok {
            return Err(format!("{}: expected {}", path, expected));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            return Err(format!("{}: value not in enum", path));
        }
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for name in required.iter().filter_map(|n| n.as_str()) {
            if value.get(name).is_none() {
                return Err(format!("{}: missing required property '{}'", path, name));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        if let Some(object) = value.as_object() {
            for (name, sub_schema) in properties {
                if let Some(sub_value) = object.get(name) {
                    validate_schema(sub_value, sub_schema, &format!("{}.{}", path, name))?;
                }
            }
        }
    }

    if let Some(item_schema) = schema.get("items") {
        if let Some(items) = value.as_array() {
            for (i, item) in items.iter().enumerate() {
                validate_schema(item, item_schema, &format!("{}[{}]", path, i))?;
            }
        }
    }

    Ok(())
}
