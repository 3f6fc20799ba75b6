//! LLM Types
//!
//! Core types for LLM provider interactions: generation parameters,
//! provider errors and cascade outcomes.

use serde::{Deserialize, Serialize};

/// Providers in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenRouter,
    HuggingFace,
    GigaChat,
    YandexGpt,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenRouter => write!(f, "openrouter"),
            ProviderKind::HuggingFace => write!(f, "huggingface"),
            ProviderKind::GigaChat => write!(f, "gigachat"),
            ProviderKind::YandexGpt => write!(f, "yandexgpt"),
        }
    }
}

/// Per-request generation parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 4000,
        }
    }
}

/// A prompt pair handed to the cascade.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub params: GenerationParams,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            params: GenerationParams::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

/// Successful text generation, with the telemetry the cascade reports.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub content: String,
    pub provider_used: String,
    pub model: String,
    /// How many providers failed before this one succeeded
    pub fallback_depth: u32,
    pub latency_ms: u64,
}

/// Successful JSON generation.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutcome {
    pub value: serde_json::Value,
    pub provider_used: String,
    pub fallback_depth: u32,
    /// Whether the strict repair re-prompt was needed
    pub repaired: bool,
    pub latency_ms: u64,
}

/// Error types for LLM operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmError {
    /// Authentication failed (invalid API key)
    AuthenticationFailed { message: String },
    /// Rate limit exceeded
    RateLimited { message: String },
    /// Model not found or not available
    ModelNotFound { model: String },
    /// Invalid request (bad parameters)
    InvalidRequest { message: String },
    /// Server error from the provider
    ServerError { message: String, status: Option<u16> },
    /// Network/connection error
    NetworkError { message: String },
    /// Response parsing error
    ParseError { message: String },
    /// Provider not configured or circuit open
    ProviderUnavailable { message: String },
    /// Provider returned no usable content
    EmptyResponse,
    /// Other error
    Other { message: String },
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::AuthenticationFailed { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            LlmError::RateLimited { message } => write!(f, "Rate limited: {}", message),
            LlmError::ModelNotFound { model } => write!(f, "Model not found: {}", model),
            LlmError::InvalidRequest { message } => write!(f, "Invalid request: {}", message),
            LlmError::ServerError { message, status } => {
                if let Some(s) = status {
                    write!(f, "Server error ({}): {}", s, message)
                } else {
                    write!(f, "Server error: {}", message)
                }
            }
            LlmError::NetworkError { message } => write!(f, "Network error: {}", message),
            LlmError::ParseError { message } => write!(f, "Parse error: {}", message),
            LlmError::ProviderUnavailable { message } => {
                write!(f, "Provider unavailable: {}", message)
            }
            LlmError::EmptyResponse => write!(f, "Empty response"),
            LlmError::Other { message } => write!(f, "Error: {}", message),
        }
    }
}

impl std::error::Error for LlmError {}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_display() {
        assert_eq!(ProviderKind::OpenRouter.to_string(), "openrouter");
        assert_eq!(ProviderKind::YandexGpt.to_string(), "yandexgpt");
    }

    #[test]
    fn test_default_params() {
        let params = GenerationParams::default();
        assert!((params.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(params.max_tokens, 4000);
    }

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("analyze this").with_system("you are an analyst");
        assert_eq!(request.prompt, "analyze this");
        assert_eq!(request.system.as_deref(), Some("you are an analyst"));
    }

    #[test]
    fn test_error_display() {
        let err = LlmError::ServerError {
            message: "boom".into(),
            status: Some(503),
        };
        assert_eq!(err.to_string(), "Server error (503): boom");
        assert_eq!(LlmError::EmptyResponse.to_string(), "Empty response");
    }

    #[test]
    fn test_error_serialization() {
        let err = LlmError::RateLimited {
            message: "slow down".into(),
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"rate_limited\""));
    }
}
