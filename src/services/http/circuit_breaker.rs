//! Circuit Breaker
//!
//! Per-service breaker with the classic closed / open / half-open states.
//! Opens after `failure_threshold` consecutive failures, stays open for
//! `reset_timeout`, then admits a single probe. A probe success closes the
//! breaker; a probe failure re-opens it.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::BreakerSettings;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Snapshot for the `/utility/circuit-breakers` surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub service: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub transitions: u64,
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

/// Circuit breaker for one upstream service. Callers hold it behind a
/// mutex; all methods take `&mut self` and are cheap.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    settings: BreakerSettings,
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    transitions: u64,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            service: service.into(),
            settings,
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            transitions: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.reset_timeout_secs)
    }

    /// Gate a request. Returns `true` when the call may proceed. While open,
    /// returns `false` until the reset timeout elapses; the first admitted
    /// call after that is the half-open probe.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                // One probe at a time; further callers wait for its verdict.
                false
            }
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|t| now.duration_since(t))
                    .unwrap_or_default();
                if elapsed >= self.reset_timeout() {
                    self.transition(CircuitState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                self.transition(CircuitState::Closed);
                self.failure_count = 0;
                self.opened_at = None;
            }
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&mut self, now: Instant) {
        match self.state {
            CircuitState::HalfOpen => {
                self.opened_at = Some(now);
                self.transition(CircuitState::Open);
            }
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.settings.failure_threshold {
                    self.opened_at = Some(now);
                    self.transition(CircuitState::Open);
                }
            }
            CircuitState::Open => {
                self.opened_at = Some(now);
            }
        }
    }

    /// Force the breaker back to closed (admin surface).
    pub fn reset(&mut self) {
        self.transition(CircuitState::Closed);
        self.failure_count = 0;
        self.opened_at = None;
    }

    pub fn status(&self) -> BreakerStatus {
        BreakerStatus {
            service: self.service.clone(),
            state: self.state,
            failure_count: self.failure_count,
            transitions: self.transitions,
            failure_threshold: self.settings.failure_threshold,
            reset_timeout_secs: self.settings.reset_timeout_secs,
        }
    }

    fn transition(&mut self, next: CircuitState) {
        if self.state != next {
            tracing::info!(
                service = %self.service,
                from = %self.state,
                to = %next,
                "circuit breaker transition"
            );
            self.state = next;
            self.transitions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            failure_threshold: 5,
            reset_timeout_secs: 60,
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let mut breaker = CircuitBreaker::new("dadata", settings());
        let now = Instant::now();

        for _ in 0..4 {
            breaker.record_failure(now);
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        breaker.record_failure(now);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.admit(now));
    }

    #[test]
    fn test_rejects_within_reset_timeout() {
        let mut breaker = CircuitBreaker::new("dadata", settings());
        let t0 = Instant::now();
        for _ in 0..5 {
            breaker.record_failure(t0);
        }

        assert!(!breaker.admit(t0 + Duration::from_secs(59)));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_probe_after_reset_timeout() {
        let mut breaker = CircuitBreaker::new("dadata", settings());
        let t0 = Instant::now();
        for _ in 0..5 {
            breaker.record_failure(t0);
        }

        let after = t0 + Duration::from_secs(60);
        assert!(breaker.admit(after));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Only one probe is admitted while half-open.
        assert!(!breaker.admit(after));
    }

    #[test]
    fn test_probe_success_closes() {
        let mut breaker = CircuitBreaker::new("dadata", settings());
        let t0 = Instant::now();
        for _ in 0..5 {
            breaker.record_failure(t0);
        }
        assert!(breaker.admit(t0 + Duration::from_secs(61)));
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.admit(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_probe_failure_reopens() {
        let mut breaker = CircuitBreaker::new("dadata", settings());
        let t0 = Instant::now();
        for _ in 0..5 {
            breaker.record_failure(t0);
        }
        let probe_time = t0 + Duration::from_secs(61);
        assert!(breaker.admit(probe_time));
        breaker.record_failure(probe_time);
        assert_eq!(breaker.state(), CircuitState::Open);
        // Re-opened: the window restarts from the probe failure.
        assert!(!breaker.admit(probe_time + Duration::from_secs(59)));
        assert!(breaker.admit(probe_time + Duration::from_secs(60)));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let mut breaker = CircuitBreaker::new("dadata", settings());
        let now = Instant::now();
        for _ in 0..4 {
            breaker.record_failure(now);
        }
        breaker.record_success();
        for _ in 0..4 {
            breaker.record_failure(now);
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_admin_reset() {
        let mut breaker = CircuitBreaker::new("dadata", settings());
        let now = Instant::now();
        for _ in 0..5 {
            breaker.record_failure(now);
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.admit(now));
    }

    #[test]
    fn test_status_snapshot() {
        let mut breaker = CircuitBreaker::new("casebook", settings());
        breaker.record_failure(Instant::now());
        let status = breaker.status();
        assert_eq!(status.service, "casebook");
        assert_eq!(status.failure_count, 1);
        assert_eq!(status.state, CircuitState::Closed);
    }
}
