//! Request Metrics
//!
//! Per-service counters for the `/utility/metrics` surface: request and
//! success counts, a coarse latency histogram, retry counts and circuit
//! rejections.

use serde::Serialize;
use std::collections::HashMap;

/// Latency histogram bucket upper bounds, milliseconds.
const LATENCY_BUCKETS_MS: [u64; 6] = [50, 200, 500, 1000, 5000, 30_000];

/// Counters for one upstream service.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retried_requests: u64,
    pub circuit_rejections: u64,
    pub total_latency_ms: u64,
    /// Counts per bucket in `LATENCY_BUCKETS_MS`, last slot is overflow
    pub latency_buckets: [u64; 7],
}

impl RequestMetrics {
    pub fn record_latency(&mut self, elapsed_ms: u64) {
        self.total_latency_ms += elapsed_ms;
        let slot = LATENCY_BUCKETS_MS
            .iter()
            .position(|&bound| elapsed_ms <= bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.latency_buckets[slot] += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.successful_requests == 0 {
            return 0.0;
        }
        self.total_latency_ms as f64 / self.successful_requests as f64
    }
}

/// Serializable snapshot of one service's metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub service: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retried_requests: u64,
    pub circuit_rejections: u64,
    pub success_rate_percent: f64,
    pub avg_latency_ms: f64,
    pub latency_buckets: [u64; 7],
}

/// Registry of per-service metrics. Lives behind the gateway's mutex.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    services: HashMap<String, RequestMetrics>,
}

impl MetricsRegistry {
    pub fn entry(&mut self, service: &str) -> &mut RequestMetrics {
        self.services.entry(service.to_string()).or_default()
    }

    pub fn snapshot(&self) -> Vec<MetricsSnapshot> {
        let mut rows: Vec<MetricsSnapshot> = self
            .services
            .iter()
            .map(|(service, m)| MetricsSnapshot {
                service: service.clone(),
                total_requests: m.total_requests,
                successful_requests: m.successful_requests,
                failed_requests: m.failed_requests,
                retried_requests: m.retried_requests,
                circuit_rejections: m.circuit_rejections,
                success_rate_percent: (m.success_rate() * 100.0).round() / 100.0,
                avg_latency_ms: (m.avg_latency_ms() * 100.0).round() / 100.0,
                latency_buckets: m.latency_buckets,
            })
            .collect();
        rows.sort_by(|a, b| a.service.cmp(&b.service));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        let mut metrics = RequestMetrics::default();
        metrics.record_latency(10);
        metrics.record_latency(300);
        metrics.record_latency(60_000);
        assert_eq!(metrics.latency_buckets[0], 1);
        assert_eq!(metrics.latency_buckets[2], 1);
        assert_eq!(metrics.latency_buckets[6], 1);
    }

    #[test]
    fn test_rates() {
        let mut metrics = RequestMetrics::default();
        assert_eq!(metrics.success_rate(), 0.0);

        metrics.total_requests = 4;
        metrics.successful_requests = 3;
        metrics.total_latency_ms = 300;
        assert!((metrics.success_rate() - 75.0).abs() < f64::EPSILON);
        assert!((metrics.avg_latency_ms() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_registry_snapshot_sorted() {
        let mut registry = MetricsRegistry::default();
        registry.entry("tavily").total_requests = 1;
        registry.entry("dadata").total_requests = 2;
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].service, "dadata");
        assert_eq!(snapshot[1].service, "tavily");
    }
}
