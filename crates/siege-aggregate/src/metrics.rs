//! Per-endpoint response metrics.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use siege_core::endpoint::EndpointKey;
use tracing::warn;

const LABELS: &[&str] = &["path", "method", "status"];

/// Owns the Prometheus registry and the three response metric families.
/// Handles are created on first sight of an endpoint and never destroyed.
pub struct MetricRegistry {
    registry: Registry,
    response_total: IntCounterVec,
    response_duration_s: HistogramVec,
    response_payload_mb: HistogramVec,
}

impl MetricRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let response_total = IntCounterVec::new(
            Opts::new(
                "siege_listener_http_response_total",
                "Observed HTTP responses per endpoint.",
            ),
            LABELS,
        )?;
        registry.register(Box::new(response_total.clone()))?;

        // Measured from the first captured request byte to the last captured
        // response byte, so response transmission time is included.
        let response_duration_s = HistogramVec::new(
            HistogramOpts::new(
                "siege_listener_http_response_duration_s",
                "Request start to response end, in seconds.",
            )
            .buckets(prometheus::exponential_buckets(0.001, 2.5, 14)?),
            LABELS,
        )?;
        registry.register(Box::new(response_duration_s.clone()))?;

        let response_payload_mb = HistogramVec::new(
            HistogramOpts::new(
                "siege_listener_http_response_payload_mb",
                "Combined request and response size, in megabytes.",
            )
            .buckets(prometheus::exponential_buckets(0.000_1, 4.0, 10)?),
            LABELS,
        )?;
        registry.register(Box::new(response_payload_mb.clone()))?;

        Ok(Self {
            registry,
            response_total,
            response_duration_s,
            response_payload_mb,
        })
    }

    /// Record one observed pair under its endpoint key.
    pub fn observe(&self, key: &EndpointKey, duration_s: f64, payload_mb: f64) {
        let status = key.status.to_string();
        let labels = [key.path.as_str(), key.method.as_str(), status.as_str()];
        self.response_total.with_label_values(&labels).inc();
        self.response_duration_s
            .with_label_values(&labels)
            .observe(duration_s);
        self.response_payload_mb
            .with_label_values(&labels)
            .observe(payload_mb);
    }

    /// Snapshot every registered metric in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            warn!(error = %e, "could not encode metrics snapshot");
            return String::new();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}
