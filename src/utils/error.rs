//! Error Handling
//!
//! Unified error types for the service.
//! Uses thiserror for ergonomic error definitions. Every error carries a
//! surface `ErrorKind` label that is stable across the REST, SSE and queue
//! surfaces.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Surface error labels, stable across REST bodies, SSE `error` events and
/// queue result payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Timeout,
    CircuitOpen,
    Transport,
    ProviderError,
    RateLimited,
    #[serde(rename = "LLMUnavailable")]
    LlmUnavailable,
    InsufficientData,
    SchemaMismatch,
    WorkflowTimeout,
    Cancelled,
    StorageUnavailable,
    ServerShuttingDown,
    InternalError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::CircuitOpen => "CircuitOpen",
            ErrorKind::Transport => "Transport",
            ErrorKind::ProviderError => "ProviderError",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::LlmUnavailable => "LLMUnavailable",
            ErrorKind::InsufficientData => "InsufficientData",
            ErrorKind::SchemaMismatch => "SchemaMismatch",
            ErrorKind::WorkflowTimeout => "WorkflowTimeout",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::StorageUnavailable => "StorageUnavailable",
            ErrorKind::ServerShuttingDown => "ServerShuttingDown",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(label)
    }
}

/// Service-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A per-call deadline was exceeded
    #[error("Timeout after {elapsed_ms}ms: {context}")]
    Timeout { context: String, elapsed_ms: u64 },

    /// The circuit breaker for a service is open
    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),

    /// Network / DNS / connection failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-retryable upstream 4xx
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// 429 from upstream, or the inbound limiter
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Every provider in the LLM cascade failed
    #[error("LLM cascade exhausted: {0}")]
    LlmUnavailable(String),

    /// Both critical data sources failed
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// LLM output did not validate against the expected schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The whole-session deadline was exceeded
    #[error("Workflow timed out after {0}s")]
    WorkflowTimeout(u64),

    /// The session was cancelled by the caller
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The primary store is unreachable
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// SQLite errors (auto-converted from rusqlite::Error)
    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unclassified internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for service errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a storage-unavailable error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    /// The stable surface label for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidInput(_) => ErrorKind::InvalidInput,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Timeout { .. } => ErrorKind::Timeout,
            AppError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            AppError::Transport(_) => ErrorKind::Transport,
            AppError::Provider { .. } => ErrorKind::ProviderError,
            AppError::RateLimited(_) => ErrorKind::RateLimited,
            AppError::LlmUnavailable(_) => ErrorKind::LlmUnavailable,
            AppError::InsufficientData(_) => ErrorKind::InsufficientData,
            AppError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            AppError::WorkflowTimeout(_) => ErrorKind::WorkflowTimeout,
            AppError::Cancelled(_) => ErrorKind::Cancelled,
            AppError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            AppError::Sqlite(_) => ErrorKind::StorageUnavailable,
            AppError::Serialization(_) => ErrorKind::InternalError,
            AppError::Io(_) => ErrorKind::InternalError,
            AppError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Whether an HTTP call failing with this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Transport(_) | AppError::Timeout { .. } | AppError::RateLimited(_)
        )
    }

    /// HTTP status for the REST surface
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidInput | ErrorKind::SchemaMismatch => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::Timeout | ErrorKind::WorkflowTimeout => 504,
            ErrorKind::CircuitOpen
            | ErrorKind::Transport
            | ErrorKind::ProviderError
            | ErrorKind::LlmUnavailable
            | ErrorKind::InsufficientData
            | ErrorKind::StorageUnavailable
            | ErrorKind::ServerShuttingDown => 502,
            ErrorKind::Cancelled => 499,
            ErrorKind::InternalError => 500,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout {
                context: err.to_string(),
                elapsed_ms: 0,
            }
        } else if err.is_connect() || err.is_request() {
            AppError::Transport(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}
