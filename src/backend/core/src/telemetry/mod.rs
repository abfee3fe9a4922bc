//! Telemetry: structured logging and Prometheus metrics.
//!
//! - **Logging**: JSON/pretty/compact output with e-mail and credential redaction
//! - **Metrics**: Prometheus recorder plus domain counters for denials,
//!   invitations, cascades, embedding jobs and fan-out breadth
//!
//! # Example
//!
//! ```rust,no_run
//! use warehub_core::telemetry::{TelemetryConfig, init_telemetry};
//!
//! let config = TelemetryConfig::default();
//! let handle = init_telemetry(&config).expect("Failed to initialize telemetry");
//! println!("{}", handle.metrics.render());
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{
    init_logging, redact_connection_string, redact_email, LogFormat, LoggingConfig,
    RedactionConfig, SensitiveFieldRedactor,
};
pub use metrics::{
    init_metrics, CascadeMetrics, EmbeddingJobMetrics, FanoutMetrics, InvitationMetrics,
    MetricsConfig, MetricsRegistry, RequestDurationHistogram,
};

use serde::Deserialize;

/// Unified telemetry configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "warehub".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

/// Initialize metrics, then logging. Call once at startup.
///
/// # Errors
///
/// Returns an error if either component fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryHandle> {
    let metrics = init_metrics(&config.metrics, &config.service_name)?;
    init_logging(&config.logging, &config.environment)?;

    ::tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        metrics_enabled = metrics.is_enabled(),
        "telemetry initialized"
    );

    Ok(TelemetryHandle { metrics })
}

/// Handle kept by the binary for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    pub metrics: MetricsRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "warehub");
        assert_eq!(config.environment, "development");
        assert!(config.metrics.enabled);
    }
}
