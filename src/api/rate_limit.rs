//! Inbound Rate Limiting
//!
//! Per-client-IP token buckets with per-route-class limits plus global
//! per-minute and per-hour caps. Exceedance surfaces as `RateLimited`
//! (HTTP 429).

use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::config::RateLimits;
use crate::utils::error::{AppError, AppResult};

/// Route classes with distinct budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Analyze,
    Threads,
    Reports,
    Admin,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refill at `capacity / window_secs` tokens per second, then try to
    /// take one.
    fn try_take(&mut self, capacity: f64, window_secs: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * capacity / window_secs).min(capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    limits: RateLimits,
    buckets: Mutex<HashMap<(String, &'static str), Bucket>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    fn class_limit(&self, class: RouteClass) -> (u32, &'static str) {
        match class {
            RouteClass::Analyze => (self.limits.analyze_per_min, "analyze"),
            RouteClass::Threads => (self.limits.threads_per_min, "threads"),
            RouteClass::Reports => (self.limits.reports_per_min, "reports"),
            RouteClass::Admin => (self.limits.admin_per_min, "admin"),
        }
    }

    /// Check all applicable buckets for one request.
    pub fn check(&self, client_ip: &str, class: RouteClass) -> AppResult<()> {
        self.check_at(client_ip, class, Instant::now())
    }

    fn check_at(&self, client_ip: &str, class: RouteClass, now: Instant) -> AppResult<()> {
        let (limit, label) = self.class_limit(class);
        let mut buckets = self.buckets.lock().expect("rate limiter lock");

        let checks: [(&'static str, f64, f64); 3] = [
            (label, limit as f64, 60.0),
            ("global_minute", self.limits.global_per_min as f64, 60.0),
            ("global_hour", self.limits.global_per_hour as f64, 3600.0),
        ];

        for (bucket_label, capacity, window) in checks {
            let key = (client_ip.to_string(), bucket_label);
            let bucket = buckets
                .entry(key)
                .or_insert_with(|| Bucket::new(capacity, now));
            if !bucket.try_take(capacity, window, now) {
                return Err(AppError::RateLimited(format!(
                    "limit exceeded for {}",
                    bucket_label
                )));
            }
        }
        Ok(())
    }
}

/// Best-effort client IP: proxy headers first, then a stable local label.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(String::from)
        })
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "local".to_string())
}
