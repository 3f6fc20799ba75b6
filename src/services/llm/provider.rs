//! LLM Provider Trait
//!
//! Defines the common interface for all LLM providers in the cascade.

use async_trait::async_trait;

use super::types::{GenerationParams, LlmError, LlmResult};
use crate::utils::error::AppError;

/// Trait that all LLM providers must implement.
///
/// Providers are thin HTTP adapters: one completion call, one health probe.
/// Failover and JSON handling live in the cascade.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for identification and telemetry.
    fn name(&self) -> &'static str;

    /// The model this provider is configured to use.
    fn model(&self) -> &str;

    /// Whether the provider has credentials. Unconfigured providers are
    /// skipped by the cascade without counting as failures.
    fn is_configured(&self) -> bool;

    /// Generate a completion for a system/user prompt pair.
    async fn generate(
        &self,
        system: Option<&str>,
        prompt: &str,
        params: &GenerationParams,
    ) -> LlmResult<String>;

    /// Check if the provider is reachable with a minimal real request.
    async fn health_check(&self) -> LlmResult<()>;
}

/// Helper for providers without credentials.
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Map a gateway error onto the provider error taxonomy.
pub fn map_gateway_error(err: AppError, provider: &str) -> LlmError {
    match err {
        AppError::CircuitOpen(_) => LlmError::ProviderUnavailable {
            message: format!("{}: circuit open", provider),
        },
        AppError::Timeout { context, .. } => LlmError::NetworkError {
            message: format!("{}: timeout ({})", provider, context),
        },
        AppError::Transport(message) => LlmError::NetworkError { message },
        AppError::RateLimited(message) => LlmError::RateLimited { message },
        AppError::Provider { status, message } => parse_http_error(status, &message, provider),
        other => LlmError::Other {
            message: other.to_string(),
        },
    }
}

/// Classify an upstream HTTP status into a provider error.
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
        },
        400 => LlmError::InvalidRequest {
            message: body.to_string(),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}
