//! Prometheus metrics for the gateway.
//!
//! Exposed in Prometheus text format at `/metrics`.

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus registry and collectors.
pub struct GatewayMetrics {
    registry: Registry,

    /// Tag reads attempted.
    pub reads_total: IntCounter,

    /// Tag reads that failed.
    pub read_failures_total: IntCounter,

    /// Tag writes attempted.
    pub writes_total: IntCounter,

    /// Tag writes that failed.
    pub write_failures_total: IntCounter,

    /// 1 while the controller session is up.
    pub connected: IntGauge,

    /// Connect attempts by outcome (`ok`, `error`).
    pub connect_attempts: IntCounterVec,

    /// Program downloads by outcome (`ok`, `partial`).
    pub downloads_total: IntCounterVec,

    /// Program download duration.
    pub download_duration: Histogram,

    /// Poller ticks completed.
    pub poll_ticks_total: IntCounter,

    /// Connected WebSocket clients.
    pub websocket_clients: IntGauge,
}

impl GatewayMetrics {
    /// Create a new metrics instance with its own registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let reads_total = IntCounter::new("endform_tag_reads_total", "Tag reads attempted")
            .expect("metric creation should succeed");

        let read_failures_total =
            IntCounter::new("endform_tag_read_failures_total", "Tag reads that failed")
                .expect("metric creation should succeed");

        let writes_total = IntCounter::new("endform_tag_writes_total", "Tag writes attempted")
            .expect("metric creation should succeed");

        let write_failures_total =
            IntCounter::new("endform_tag_write_failures_total", "Tag writes that failed")
                .expect("metric creation should succeed");

        let connected = IntGauge::new(
            "endform_plc_connected",
            "Controller session state (1=connected, 0=disconnected)",
        )
        .expect("metric creation should succeed");

        let connect_attempts = IntCounterVec::new(
            Opts::new("endform_connect_attempts_total", "Connect attempts by outcome"),
            &["outcome"],
        )
        .expect("metric creation should succeed");

        let downloads_total = IntCounterVec::new(
            Opts::new("endform_program_downloads_total", "Program downloads by outcome"),
            &["outcome"],
        )
        .expect("metric creation should succeed");

        let download_duration = Histogram::with_opts(
            HistogramOpts::new(
                "endform_program_download_seconds",
                "Program download duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .expect("metric creation should succeed");

        let poll_ticks_total =
            IntCounter::new("endform_poll_ticks_total", "Live state poller ticks completed")
                .expect("metric creation should succeed");

        let websocket_clients = IntGauge::new(
            "endform_websocket_clients",
            "Number of connected WebSocket clients",
        )
        .expect("metric creation should succeed");

        registry
            .register(Box::new(reads_total.clone()))
            .expect("registration should succeed");
        registry
            .register(Box::new(read_failures_total.clone()))
            .expect("registration should succeed");
        registry
            .register(Box::new(writes_total.clone()))
            .expect("registration should succeed");
        registry
            .register(Box::new(write_failures_total.clone()))
            .expect("registration should succeed");
        registry
            .register(Box::new(connected.clone()))
            .expect("registration should succeed");
        registry
            .register(Box::new(connect_attempts.clone()))
            .expect("registration should succeed");
        registry
            .register(Box::new(downloads_total.clone()))
            .expect("registration should succeed");
        registry
            .register(Box::new(download_duration.clone()))
            .expect("registration should succeed");
        registry
            .register(Box::new(poll_ticks_total.clone()))
            .expect("registration should succeed");
        registry
            .register(Box::new(websocket_clients.clone()))
            .expect("registration should succeed");

        Self {
            registry,
            reads_total,
            read_failures_total,
            writes_total,
            write_failures_total,
            connected,
            connect_attempts,
            downloads_total,
            download_duration,
            poll_ticks_total,
            websocket_clients,
        }
    }

    /// Record a connect attempt and the resulting session state.
    pub fn record_connect(&self, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.connect_attempts.with_label_values(&[outcome]).inc();
        self.connected.set(i64::from(ok));
    }

    /// Record a finished program download.
    pub fn record_download(&self, success: bool, seconds: f64) {
        let outcome = if success { "ok" } else { "partial" };
        self.downloads_total.with_label_values(&[outcome]).inc();
        self.download_duration.observe(seconds);
    }

    /// Render metrics in Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families)
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics endpoint handler.
///
/// GET /metrics
pub async fn metrics_handler(Extension(metrics): Extension<Arc<GatewayMetrics>>) -> impl IntoResponse {
    match metrics.render() {
        Ok(output) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {e}"),
        )
            .into_response(),
    }
}
