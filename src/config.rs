//! Service Configuration
//!
//! Environment-driven configuration with sane defaults for every tunable:
//! per-service timeouts and cache TTLs, circuit-breaker thresholds,
//! collector concurrency, workflow caps, queue sizing and inbound rate
//! limits. Secrets are plain environment variables; a provider without a
//! key is treated as not configured and skipped.

use serde::Serialize;
use std::env;
use std::time::Duration;

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Timeout profile for one upstream service.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimeoutProfile {
    pub connect_secs: u64,
    pub total_secs: u64,
}

impl TimeoutProfile {
    pub const fn new(connect_secs: u64, total_secs: u64) -> Self {
        Self {
            connect_secs,
            total_secs,
        }
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn total(&self) -> Duration {
        Duration::from_secs(self.total_secs)
    }
}

/// Retry tuning for the resilient HTTP core.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_wait_ms: 500,
            max_wait_ms: 10_000,
        }
    }
}

/// Circuit-breaker tuning.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

/// Inbound per-IP rate limits, requests per minute per route class.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimits {
    pub analyze_per_min: u32,
    pub threads_per_min: u32,
    pub reports_per_min: u32,
    pub admin_per_min: u32,
    pub global_per_min: u32,
    pub global_per_hour: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            analyze_per_min: 5,
            threads_per_min: 20,
            reports_per_min: 30,
            admin_per_min: 60,
            global_per_min: 100,
            global_per_hour: 2000,
        }
    }
}

/// Risk-score thresholds and category caps. These are part of the scoring
/// contract and not normally overridden.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RiskSettings {
    pub medium_threshold: u32,
    pub high_threshold: u32,
    pub critical_threshold: u32,
    pub legal_cap: u32,
    pub financial_cap: u32,
    pub reputation_cap: u32,
    pub regulatory_cap: u32,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            medium_threshold: 25,
            high_threshold: 50,
            critical_threshold: 75,
            legal_cap: 40,
            financial_cap: 30,
            reputation_cap: 20,
            regulatory_cap: 15,
        }
    }
}

/// Upstream API credentials and endpoints. `None` means not configured.
#[derive(Debug, Clone, Default)]
pub struct ProviderKeys {
    pub dadata_key: Option<String>,
    pub casebook_key: Option<String>,
    pub infosphere_key: Option<String>,
    pub perplexity_key: Option<String>,
    pub tavily_key: Option<String>,
    pub openrouter_key: Option<String>,
    pub huggingface_key: Option<String>,
    pub gigachat_key: Option<String>,
    pub yandex_key: Option<String>,
    pub yandex_folder_id: Option<String>,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_path: String,
    pub admin_token: Option<String>,

    pub max_concurrent_searches: usize,
    pub global_search_cap: usize,
    pub max_feedback_retries: u32,
    pub workflow_timeout_secs: u64,

    pub breaker: BreakerSettings,
    pub retry: RetrySettings,
    pub max_pages: u32,

    pub queue_max_delivery: u32,
    pub queue_consumers: usize,
    pub queue_graceful_timeout_secs: u64,
    pub idempotency_window_secs: i64,

    pub eviction_interval_secs: u64,
    pub rate_limits: RateLimits,
    pub risk: RiskSettings,
    pub keys: ProviderKeys,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_opt("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".into()),
            database_path: env_opt("DATABASE_PATH").unwrap_or_else(|| "counterscope.db".into()),
            admin_token: env_opt("ADMIN_TOKEN"),

            max_concurrent_searches: env_usize("MAX_CONCURRENT_SEARCHES", 5),
            global_search_cap: env_usize("GLOBAL_SEARCH_CAP", 64),
            max_feedback_retries: env_u32("MAX_FEEDBACK_RETRIES", 3),
            workflow_timeout_secs: env_u64("WORKFLOW_TIMEOUT_SECONDS", 300),

            breaker: BreakerSettings {
                failure_threshold: env_u32("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5),
                reset_timeout_secs: env_u64("CIRCUIT_BREAKER_TIMEOUT_SECONDS", 60),
            },
            retry: RetrySettings {
                max_retries: env_u32("HTTP_MAX_RETRIES", 3),
                ..RetrySettings::default()
            },
            max_pages: env_u32("MAX_PAGES", 100),

            queue_max_delivery: env_u32("QUEUE_MAX_DELIVERY", 3),
            queue_consumers: env_usize("QUEUE_MAX_CONSUMERS", 10),
            queue_graceful_timeout_secs: env_u64("QUEUE_GRACEFUL_TIMEOUT", 30),
            idempotency_window_secs: 60,

            eviction_interval_secs: env_u64("EVICTION_INTERVAL_SECONDS", 3600),
            rate_limits: RateLimits::default(),
            risk: RiskSettings::default(),
            keys: ProviderKeys {
                dadata_key: env_opt("DADATA_API_KEY"),
                casebook_key: env_opt("CASEBOOK_API_KEY"),
                infosphere_key: env_opt("INFOSPHERE_API_KEY"),
                perplexity_key: env_opt("PERPLEXITY_API_KEY"),
                tavily_key: env_opt("TAVILY_API_KEY"),
                openrouter_key: env_opt("OPENROUTER_API_KEY"),
                huggingface_key: env_opt("HUGGINGFACE_API_KEY"),
                gigachat_key: env_opt("GIGACHAT_API_KEY"),
                yandex_key: env_opt("YANDEX_API_KEY"),
                yandex_folder_id: env_opt("YANDEX_FOLDER_ID"),
            },
        }
    }

    /// Per-service timeout profiles (connect / total seconds).
    pub fn timeout_for(&self, service: &str) -> TimeoutProfile {
        match service {
            "dadata" => TimeoutProfile::new(5, 15),
            "casebook" => TimeoutProfile::new(5, 20),
            "infosphere" => TimeoutProfile::new(5, 30),
            "tavily" => TimeoutProfile::new(10, 45),
            "perplexity" => TimeoutProfile::new(10, 60),
            "openrouter" | "huggingface" | "gigachat" | "yandexgpt" => TimeoutProfile::new(10, 60),
            _ => TimeoutProfile::new(5, 30),
        }
    }

    /// Per-service cache TTLs, seconds.
    pub fn cache_ttl_for(&self, service: &str) -> u64 {
        match service {
            "dadata" => 7200,
            "casebook" => 9600,
            "infosphere" => 3600,
            "tavily" | "perplexity" => 300,
            "reports" => 30 * 86_400,
            _ => 3600,
        }
    }

    /// Whole-workflow deadline.
    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        // Defaults without touching the environment; used by tests.
        Self {
            bind_addr: "127.0.0.1:8000".into(),
            database_path: ":memory:".into(),
            admin_token: None,
            max_concurrent_searches: 5,
            global_search_cap: 64,
            max_feedback_retries: 3,
            workflow_timeout_secs: 300,
            breaker: BreakerSettings {
                failure_threshold: 5,
                reset_timeout_secs: 60,
            },
            retry: RetrySettings::default(),
            max_pages: 100,
            queue_max_delivery: 3,
            queue_consumers: 10,
            queue_graceful_timeout_secs: 30,
            idempotency_window_secs: 60,
            eviction_interval_secs: 3600,
            rate_limits: RateLimits::default(),
            risk: RiskSettings::default(),
            keys: ProviderKeys::default(),
        }
    }
}
