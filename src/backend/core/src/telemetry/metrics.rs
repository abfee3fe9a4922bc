//! Prometheus metrics for access control, lifecycle and background work.
//!
//! Counters are emitted through the `metrics` facade from wherever the event
//! happens; this module installs the Prometheus recorder, describes every
//! series once, and offers small recording helpers so label sets stay
//! consistent.
//!
//! # Example
//!
//! ```rust,no_run
//! use warehub_core::telemetry::metrics::{InvitationMetrics, FanoutMetrics};
//!
//! InvitationMetrics::record("accepted");
//! FanoutMetrics::record_breadth(12);
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Instant;

use crate::db::CascadeReport;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for request durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Labels added to every series
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
}

const FANOUT_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0];

/// Handle to the installed recorder.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder; `render` returns an empty string.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the Prometheus recorder.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new().add_global_label("service", service_name);
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder
        .set_buckets(&config.duration_buckets)?
        .set_buckets_for_metric(Matcher::Full("warehub_fanout_stores".to_string()), FANOUT_BUCKETS)?;

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!("http_requests_total", "Total number of HTTP requests");

    describe_counter!("warehub_errors_total", "Errors by code, kind and severity");
    describe_counter!(
        "warehub_permission_denied_total",
        "Guard rejections by permission"
    );
    describe_counter!(
        "warehub_invitations_total",
        "Invitation state transitions"
    );
    describe_counter!(
        "warehub_cascade_deletes_total",
        "Rows removed by cascading deletes, by level"
    );
    describe_counter!(
        "warehub_embedding_jobs_total",
        "Search-vector regeneration jobs by outcome"
    );
    describe_histogram!(
        "warehub_fanout_stores",
        "Number of stores visited per fan-out query"
    );
}

/// Request duration histogram for HTTP requests.
pub struct RequestDurationHistogram;

impl RequestDurationHistogram {
    pub fn record(method: &str, path: &str, status_code: u16, duration_seconds: f64) {
        histogram!(
            "http_request_duration_seconds",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status_code" => status_code.to_string(),
        )
        .record(duration_seconds);

        counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "path" => path.to_string(),
            "status_code" => status_code.to_string(),
        )
        .increment(1);
    }

    /// Start timing a request.
    pub fn start(method: &str, path: &str) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
            method: method.to_string(),
            path: path.to_string(),
        }
    }
}

pub struct RequestTimer {
    start: Instant,
    method: String,
    path: String,
}

impl RequestTimer {
    pub fn finish(self, status_code: u16) {
        RequestDurationHistogram::record(
            &self.method,
            &self.path,
            status_code,
            self.start.elapsed().as_secs_f64(),
        );
    }
}

/// `warehub_invitations_total{transition}`.
pub struct InvitationMetrics;

impl InvitationMetrics {
    /// `transition` is one of `created`, `accepted`, `declined`, `revoked`.
    pub fn record(transition: &'static str) {
        counter!("warehub_invitations_total", "transition" => transition).increment(1);
    }
}

/// `warehub_cascade_deletes_total{level}`.
pub struct CascadeMetrics;

impl CascadeMetrics {
    pub fn record(report: &CascadeReport) {
        let levels: [(&'static str, u64); 5] = [
            ("warehouse", report.warehouses),
            ("store", report.stores),
            ("product", report.products),
            ("membership", report.memberships),
            ("invitation", report.invitations),
        ];
        for (level, count) in levels {
            if count > 0 {
                counter!("warehub_cascade_deletes_total", "level" => level).increment(count);
            }
        }
    }
}

/// `warehub_embedding_jobs_total{outcome}`.
pub struct EmbeddingJobMetrics;

impl EmbeddingJobMetrics {
    /// `outcome` is one of `written`, `superseded`, `vanished`, `failed`, `dropped`.
    pub fn record(outcome: &'static str) {
        counter!("warehub_embedding_jobs_total", "outcome" => outcome).increment(1);
    }
}

/// `warehub_fanout_stores`.
pub struct FanoutMetrics;

impl FanoutMetrics {
    pub fn record_breadth(stores: usize) {
        histogram!("warehub_fanout_stores").record(stores as f64);
    }
}
