//! Prometheus metrics for the HTTP surface.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

type Labels = Vec<(String, String)>;

/// Request counters and search latency, exported at `GET /metrics`.
pub struct ApiMetrics {
    registry: Registry,
    requests: Family<Labels, Counter>,
    search_seconds: Histogram,
}

impl ApiMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests = Family::<Labels, Counter>::default();
        registry.register(
            "kombu_http_requests",
            "HTTP requests served, by route and status",
            requests.clone(),
        );

        let search_seconds = Histogram::new(exponential_buckets(0.0005, 2.0, 14));
        registry.register(
            "kombu_search_duration_seconds",
            "Wall-clock latency of search requests",
            search_seconds.clone(),
        );

        Self {
            registry,
            requests,
            search_seconds,
        }
    }

    /// Count one served request.
    pub fn record_request(&self, route: &str, status: u16) {
        self.requests
            .get_or_create(&vec![
                ("route".to_string(), route.to_string()),
                ("status".to_string(), status.to_string()),
            ])
            .inc();
    }

    /// Observe one search latency sample.
    pub fn observe_search(&self, seconds: f64) {
        self.search_seconds.observe(seconds);
    }

    /// Export in Prometheus text format.
    pub fn export(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            buffer.clear();
        }
        buffer
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}
