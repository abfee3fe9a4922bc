//! Configuration management.
//!
//! Values come from `WAREHUB__SECTION__KEY` environment variables, optionally
//! layered over a config file. Every section has working defaults, so an
//! empty environment yields a runnable in-memory server.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{Result, WarehubError};
use crate::search::EMBEDDING_DIMENSIONS;
use crate::telemetry::{LoggingConfig, MetricsConfig, TelemetryConfig};

const ENV_PREFIX: &str = "WAREHUB";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub fanout: FanoutConfig,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub hierarchy: HierarchyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Which [`TenantStore`](crate::db::TenantStore) backs the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// PostgreSQL connection URL; required for the postgres backend
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics_enabled: true,
        }
    }
}

impl ObservabilityConfig {
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.service_name.clone(),
            environment: self.environment.clone(),
            logging: self.logging.clone(),
            metrics: MetricsConfig {
                enabled: self.metrics_enabled,
                ..MetricsConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Maximum results returned by a semantic search
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,

    /// Hits requested from the provider for each store
    #[serde(default = "default_per_store_top_k")]
    pub per_store_top_k: usize,

    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_cap: default_result_cap(),
            per_store_top_k: default_per_store_top_k(),
            embedding_dimensions: default_embedding_dimensions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    /// Hard cap on the number of stores one fan-out visits
    #[serde(default = "default_max_stores")]
    pub max_stores: usize,

    /// Per-store sub-queries in flight at once
    #[serde(default = "default_fanout_concurrency")]
    pub concurrency: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_stores: default_max_stores(),
            concurrency: default_fanout_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_worker_name")]
    pub name: String,

    /// Bounded capacity of the background task queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Tasks processed concurrently
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            queue_capacity: default_queue_capacity(),
            concurrency: default_worker_concurrency(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Refuse to remove or demote a warehouse's only owner
    #[serde(default = "default_true")]
    pub protect_last_owner: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            protect_last_owner: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HierarchyConfig {
    /// Attempts for a cascade that fails with a retryable error
    #[serde(default = "default_cascade_retry_attempts")]
    pub cascade_retry_attempts: u32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            cascade_retry_attempts: default_cascade_retry_attempts(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> Duration { Duration::from_secs(30) }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_true() -> bool { true }
fn default_service_name() -> String { "warehub".to_string() }
fn default_environment() -> String { "development".to_string() }
fn default_result_cap() -> usize { 20 }
fn default_per_store_top_k() -> usize { 10 }
fn default_embedding_dimensions() -> usize { EMBEDDING_DIMENSIONS }
fn default_max_stores() -> usize { 500 }
fn default_fanout_concurrency() -> usize { 16 }
fn default_worker_name() -> String { "embedding-worker".to_string() }
fn default_queue_capacity() -> usize { 1024 }
fn default_worker_concurrency() -> usize { 4 }
fn default_shutdown_timeout() -> Duration { Duration::from_secs(10) }
fn default_cascade_retry_attempts() -> u32 { 3 }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a file, with the environment layered on top.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.backend == StoreBackend::Postgres && self.database.url.is_none() {
            return Err(WarehubError::configuration(
                "database.url is required when database.backend = postgres",
            ));
        }
        if self.search.embedding_dimensions == 0 {
            return Err(WarehubError::configuration(
                "search.embedding_dimensions must be positive",
            ));
        }
        if self.fanout.concurrency == 0 || self.worker.concurrency == 0 {
            return Err(WarehubError::configuration("concurrency must be positive"));
        }
        if self.worker.queue_capacity == 0 {
            return Err(WarehubError::configuration(
                "worker.queue_capacity must be positive",
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.request_timeout, Duration::from_secs(30));
        assert_eq!(config.database.backend, StoreBackend::Memory);
        assert_eq!(config.search.result_cap, 20);
        assert_eq!(config.search.embedding_dimensions, 768);
        assert_eq!(config.fanout.max_stores, 500);
        assert!(config.policy.protect_last_owner);
        assert_eq!(config.hierarchy.cascade_retry_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = Config::default();
        config.database.backend = StoreBackend::Postgres;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000
request_timeout = "45s"

[search]
result_cap = 5

[policy]
protect_last_owner = false
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.request_timeout, Duration::from_secs(45));
        assert_eq!(config.search.result_cap, 5);
        assert!(!config.policy.protect_last_owner);
        assert_eq!(config.fanout.concurrency, 16);
    }
}
