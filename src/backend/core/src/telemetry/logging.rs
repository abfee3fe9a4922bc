//! Structured logging with JSON/pretty/compact output and personal-data redaction.
//!
//! Invitee addresses and connection strings pass through log fields often
//! enough that they are masked at the call site with [`redact_email`] and
//! [`redact_connection_string`] before being recorded.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level or filter directive (`info`, `warehub_core=debug`)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    #[serde(default = "default_include_location")]
    pub include_location: bool,

    #[serde(default)]
    pub include_thread: bool,

    #[serde(default = "default_include_target")]
    pub include_target: bool,

    /// Emit an event when spans close (carries span timing)
    #[serde(default)]
    pub span_close_events: bool,

    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: default_include_location(),
            include_thread: false,
            include_target: default_include_target(),
            span_close_events: false,
            redaction: RedactionConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

/// Configuration for personal-data redaction.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_redaction_enabled")]
    pub enabled: bool,

    /// Field names whose values are replaced outright (case-insensitive substring match)
    #[serde(default = "default_secret_fields")]
    pub secret_fields: Vec<String>,

    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_redaction_enabled(),
            secret_fields: default_secret_fields(),
            replacement: default_redaction_replacement(),
        }
    }
}

/// Masks e-mail local parts and connection-string passwords.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    secret_fields: Vec<String>,
    replacement: String,
    enabled: bool,
    email: Option<regex::Regex>,
    url_password: Option<regex::Regex>,
}

impl SensitiveFieldRedactor {
    pub fn new(config: &RedactionConfig) -> Self {
        Self {
            secret_fields: config
                .secret_fields
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            replacement: config.replacement.clone(),
            enabled: config.enabled,
            email: regex::Regex::new(r"([A-Za-z0-9])[A-Za-z0-9._%+-]*@([A-Za-z0-9.-]+\.[A-Za-z]{2,})").ok(),
            url_password: regex::Regex::new(r"(://[^:/@\s]+):[^@\s]+@").ok(),
        }
    }

    /// Check if a field name should be replaced outright.
    pub fn should_redact_field(&self, field_name: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let lower = field_name.to_lowercase();
        self.secret_fields.iter().any(|f| lower.contains(f))
    }

    /// Mask e-mail local parts (`alice@x.com` → `a***@x.com`) and URL passwords.
    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }

        let mut result = value.to_string();
        if let Some(regex) = &self.email {
            result = regex.replace_all(&result, "${1}***@${2}").into_owned();
        }
        if let Some(regex) = &self.url_password {
            result = regex
                .replace_all(&result, format!("${{1}}:{}@", self.replacement).as_str())
                .into_owned();
        }
        result
    }

    /// Redact a field value, checking both field name and value patterns.
    pub fn redact(&self, field_name: &str, value: &str) -> String {
        if self.should_redact_field(field_name) {
            return self.replacement.clone();
        }
        self.redact_value(value)
    }

    /// Get the global redactor instance.
    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| SensitiveFieldRedactor::new(&RedactionConfig::default()))
    }
}

/// Mask an e-mail address for logging with the global redactor.
pub fn redact_email(email: &str) -> String {
    SensitiveFieldRedactor::global().redact_value(email)
}

/// Mask a database URL for logging with the global redactor. The field name
/// is checked too, so a secret-looking name hides the whole value.
pub fn redact_connection_string(url: &str) -> String {
    SensitiveFieldRedactor::global().redact("database_url", url)
}

fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_include_location() -> bool {
    true
}

fn default_include_target() -> bool {
    true
}

fn default_redaction_enabled() -> bool {
    true
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_secret_fields() -> Vec<String> {
    vec![
        "password".to_string(),
        "secret".to_string(),
        "token".to_string(),
        "authorization".to_string(),
    ]
}

/// Initialize the logging subsystem.
///
/// In `development` a json format is swapped for pretty output.
///
/// # Errors
///
/// Returns an error if a filter directive is malformed or a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let _ = REDACTOR.set(SensitiveFieldRedactor::new(&config.redaction));

    let mut filter = EnvFilter::try_new(&config.level)?;
    for (module, level) in &config.module_levels {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(directive.parse()?);
    }

    let format = if environment == "development" && config.format == LogFormat::Json {
        &LogFormat::Pretty
    } else {
        &config.format
    };

    let span_events = if config.span_close_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread)
                .with_thread_names(config.include_thread)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread)
                .with_thread_names(config.include_thread)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_span_events(span_events)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread)
                .with_thread_names(config.include_thread)
                .with_target(config.include_target);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}
