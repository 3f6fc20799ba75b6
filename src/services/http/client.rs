//! Resilient HTTP Gateway
//!
//! Single shared reqwest client wrapped with per-service circuit breakers,
//! bounded retries with exponential backoff, per-service timeout profiles
//! and request metrics. All provider clients go through this gateway; no
//! other module talks to the network directly.

use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

use super::circuit_breaker::{BreakerStatus, CircuitBreaker};
use super::metrics::{MetricsRegistry, MetricsSnapshot};
use super::retry::{status_is_retryable, Backoff};
use crate::config::Config;
use crate::utils::error::{AppError, AppResult};

/// Options for one gateway request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Logical service label; selects timeout profile, breaker and metrics
    pub service: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub json_body: Option<Value>,
}

impl RequestOptions {
    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }
}

/// Why a pagination run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStop {
    Exhausted,
    EmptyPage,
    CycleDetected,
    PageCap,
}

/// Accumulated pages plus the stop diagnostic.
#[derive(Debug)]
pub struct PaginationOutcome {
    pub items: Vec<Value>,
    pub pages_fetched: u32,
    pub stopped: PaginationStop,
}

/// The resilient HTTP core. One instance per process, shared via `Arc`.
pub struct HttpGateway {
    client: reqwest::Client,
    config: Arc<Config>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    metrics: Mutex<MetricsRegistry>,
}

impl HttpGateway {
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| AppError::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            breakers: Mutex::new(HashMap::new()),
            metrics: Mutex::new(MetricsRegistry::default()),
        })
    }

    /// Breaker key: URL authority plus the logical service label, so two
    /// services sharing a host keep independent state.
    fn host_key(&self, service: &str, url: &str) -> String {
        let authority = url::host_of(url).unwrap_or("unknown");
        format!("{}:{}", authority, service)
    }

    fn admit(&self, key: &str) -> bool {
        let mut breakers = self.breakers.lock().expect("breaker lock");
        let breaker = breakers
            .entry(key.to_string())
            .or_insert_with(|| CircuitBreaker::new(key, self.config.breaker));
        breaker.admit(Instant::now())
    }

    fn record(&self, key: &str, success: bool) {
        let mut breakers = self.breakers.lock().expect("breaker lock");
        if let Some(breaker) = breakers.get_mut(key) {
            if success {
                breaker.record_success();
            } else {
                breaker.record_failure(Instant::now());
            }
        }
    }

    /// Execute a JSON request with circuit breaking, retries and timeouts.
    pub async fn request_json(
        &self,
        method: Method,
        url: &str,
        opts: RequestOptions,
    ) -> AppResult<Value> {
        let service = opts.service.clone();
        let key = self.host_key(&service, url);

        if !self.admit(&key) {
            self.metrics
                .lock()
                .expect("metrics lock")
                .entry(&service)
                .circuit_rejections += 1;
            return Err(AppError::CircuitOpen(service));
        }

        let timeout = self.config.timeout_for(&service);
        let backoff = Backoff::new(self.config.retry);
        let started = Instant::now();

        {
            let mut metrics = self.metrics.lock().expect("metrics lock");
            metrics.entry(&service).total_requests += 1;
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if attempt > 1 {
                let mut metrics = self.metrics.lock().expect("metrics lock");
                metrics.entry(&service).retried_requests += 1;
            }

            match self.execute_once(&method, url, &opts, timeout.total()).await {
                Ok(body) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    {
                        let mut metrics = self.metrics.lock().expect("metrics lock");
                        let entry = metrics.entry(&service);
                        entry.successful_requests += 1;
                        entry.record_latency(elapsed_ms);
                    }
                    self.record(&key, true);
                    return Ok(body);
                }
                Err(err) => {
                    let retryable = err.is_retryable();
                    let counts_against_breaker =
                        !matches!(err, AppError::Provider { .. });

                    if retryable && attempt <= backoff.max_retries() {
                        let delay = backoff.delay(attempt);
                        debug!(
                            service = %service,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    {
                        let mut metrics = self.metrics.lock().expect("metrics lock");
                        metrics.entry(&service).failed_requests += 1;
                    }
                    if counts_against_breaker {
                        self.record(&key, false);
                    }
                    warn!(service = %service, attempt, error = %err, "request failed");
                    return Err(err);
                }
            }
        }
    }

    async fn execute_once(
        &self,
        method: &Method,
        url: &str,
        opts: &RequestOptions,
        total_timeout: std::time::Duration,
    ) -> AppResult<Value> {
        let mut builder = self
            .client
            .request(method.clone(), url)
            .timeout(total_timeout);

        for (name, value) in &opts.headers {
            builder = builder.header(name, value);
        }
        if !opts.query.is_empty() {
            builder = builder.query(&opts.query);
        }
        if let Some(body) = &opts.json_body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout {
                    context: format!("{} {}", method, url),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            } else {
                AppError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(AppError::RateLimited(format!("{} returned 429", url)));
        }
        if status_is_retryable(status) {
            return Err(AppError::Transport(format!(
                "server error {} from {}",
                status, url
            )));
        }
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            let message = body.chars().take(500).collect();
            return Err(AppError::Provider { status, message });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AppError::Provider {
                status,
                message: format!("invalid JSON body: {}", e),
            })
    }

    /// Fetch every page of a page-numbered collection endpoint.
    ///
    /// Stops on an empty page, on a repeated cursor, or at the configured
    /// page cap (with a diagnostic). Each page goes through `request_json`
    /// with full resilience.
    pub async fn fetch_all_pages(
        &self,
        method: Method,
        url: &str,
        opts: RequestOptions,
    ) -> AppResult<PaginationOutcome> {
        let max_pages = self.config.max_pages;
        let outcome = drive_pagination(max_pages, |page| {
            let page_opts = opts.clone().query("page", page.to_string());
            let method = method.clone();
            async move { self.request_json(method, url, page_opts).await }
        })
        .await?;

        if outcome.stopped == PaginationStop::PageCap {
            warn!(
                url,
                pages = outcome.pages_fetched,
                "pagination stopped at page cap"
            );
        }
        Ok(outcome)
    }

    pub fn breaker_statuses(&self) -> Vec<BreakerStatus> {
        let breakers = self.breakers.lock().expect("breaker lock");
        let mut rows: Vec<BreakerStatus> = breakers.values().map(|b| b.status()).collect();
        rows.sort_by(|a, b| a.service.cmp(&b.service));
        rows
    }

    /// Force-reset a breaker by its host key suffix (the logical service
    /// label). Returns whether any breaker matched.
    pub fn reset_breaker(&self, service: &str) -> bool {
        let mut breakers = self.breakers.lock().expect("breaker lock");
        let mut matched = false;
        for (key, breaker) in breakers.iter_mut() {
            if key.ends_with(&format!(":{}", service)) || key == service {
                breaker.reset();
                matched = true;
            }
        }
        matched
    }

    pub fn metrics_snapshot(&self) -> Vec<MetricsSnapshot> {
        self.metrics.lock().expect("metrics lock").snapshot()
    }
}

/// Extract list items from a page body, accepting the common envelope keys.
fn extract_items(body: &Value) -> Vec<Value> {
    for key in ["data", "results", "items", "entries"] {
        if let Some(items) = body.get(key).and_then(|v| v.as_array()) {
            return items.clone();
        }
    }
    if let Some(items) = body.as_array() {
        return items.clone();
    }
    Vec::new()
}

/// Next cursor: an explicit `next_page` wins, otherwise `total_pages`
/// bounds a simple increment, otherwise a lone full page means try the next.
fn next_cursor(body: &Value, current: u64, item_count: usize) -> Option<u64> {
    if let Some(next) = body
        .get("next_page")
        .or_else(|| body.get("pagination").and_then(|p| p.get("next_page")))
        .and_then(|v| v.as_u64())
    {
        return Some(next);
    }
    let total_pages = body
        .get("total_pages")
        .or_else(|| body.get("pagination").and_then(|p| p.get("total_pages")))
        .or_else(|| body.get("meta").and_then(|m| m.get("total_pages")))
        .and_then(|v| v.as_u64());
    match total_pages {
        Some(total) if current < total => Some(current + 1),
        Some(_) => None,
        // No pagination metadata: keep going while pages are non-empty.
        None if item_count > 0 => Some(current + 1),
        None => None,
    }
}

/// Pagination driver, separated from the transport so termination rules are
/// testable in isolation.
pub(crate) async fn drive_pagination<F, Fut>(
    max_pages: u32,
    mut fetch: F,
) -> AppResult<PaginationOutcome>
where
    F: FnMut(u64) -> Fut,
    Fut: std::future::Future<Output = AppResult<Value>>,
{
    let mut items = Vec::new();
    let mut seen: HashSet<u64> = HashSet::new();
    let mut cursor = 1u64;
    let mut pages_fetched = 0u32;

    loop {
        if pages_fetched >= max_pages {
            return Ok(PaginationOutcome {
                items,
                pages_fetched,
                stopped: PaginationStop::PageCap,
            });
        }
        if !seen.insert(cursor) {
            return Ok(PaginationOutcome {
                items,
                pages_fetched,
                stopped: PaginationStop::CycleDetected,
            });
        }

        let body = fetch(cursor).await?;
        pages_fetched += 1;

        let page_items = extract_items(&body);
        if page_items.is_empty() {
            return Ok(PaginationOutcome {
                items,
                pages_fetched,
                stopped: PaginationStop::EmptyPage,
            });
        }
        let count = page_items.len();
        items.extend(page_items);

        match next_cursor(&body, cursor, count) {
            Some(next) => cursor = next,
            None => {
                return Ok(PaginationOutcome {
                    items,
                    pages_fetched,
                    stopped: PaginationStop::Exhausted,
                })
            }
        }
    }
}

/// Tiny URL-authority extractor; enough for breaker keys without pulling in
/// a full URL parser.
mod url {
    pub fn host_of(url: &str) -> Option<&str> {
        let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
        let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let authority = &rest[..end];
        if authority.is_empty() {
            None
        } else {
            Some(authority)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_host_extraction() {
        assert_eq!(
            url::host_of("https://api.dadata.ru/v2/suggest"),
            Some("api.dadata.ru")
        );
        assert_eq!(url::host_of("http://localhost:9200/x?y=1"), Some("localhost:9200"));
        assert_eq!(url::host_of(""), None);
    }

    #[test]
    fn test_extract_items_variants() {
        assert_eq!(extract_items(&json!({"data": [1, 2]})).len(), 2);
        assert_eq!(extract_items(&json!({"results": [1]})).len(), 1);
        assert_eq!(extract_items(&json!([1, 2, 3])).len(), 3);
        assert!(extract_items(&json!({"other": 1})).is_empty());
    }

    #[tokio::test]
    async fn test_pagination_exhausts_on_total_pages() {
        let outcome = drive_pagination(100, |page| async move {
            Ok(json!({"data": [page], "total_pages": 3}))
        })
        .await
        .unwrap();
        assert_eq!(outcome.pages_fetched, 3);
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.stopped, PaginationStop::Exhausted);
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page() {
        let outcome = drive_pagination(100, |page| async move {
            if page <= 2 {
                Ok(json!({"items": [page]}))
            } else {
                Ok(json!({"items": []}))
            }
        })
        .await
        .unwrap();
        assert_eq!(outcome.stopped, PaginationStop::EmptyPage);
        assert_eq!(outcome.items.len(), 2);
    }

    #[tokio::test]
    async fn test_pagination_detects_cycle() {
        // Upstream keeps pointing back at page 1.
        let outcome = drive_pagination(100, |page| async move {
            Ok(json!({"data": [page], "next_page": 1}))
        })
        .await
        .unwrap();
        assert_eq!(outcome.stopped, PaginationStop::CycleDetected);
        assert_eq!(outcome.pages_fetched, 1);
    }

    #[tokio::test]
    async fn test_pagination_respects_page_cap() {
        let outcome = drive_pagination(100, |page| async move {
            // Endless full pages with no metadata.
            Ok(json!({"data": [page]}))
        })
        .await
        .unwrap();
        assert_eq!(outcome.stopped, PaginationStop::PageCap);
        assert_eq!(outcome.pages_fetched, 100);
        assert_eq!(outcome.items.len(), 100);
    }

    #[tokio::test]
    async fn test_pagination_propagates_errors() {
        let result = drive_pagination(100, |_page| async move {
            Err::<Value, _>(AppError::transport("connection refused"))
        })
        .await;
        assert!(result.is_err());
    }
}
