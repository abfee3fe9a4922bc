//! Error handling for Warehub.
//!
//! This module provides:
//! - A single error type carrying a stable machine-readable code
//! - The taxonomy used by callers (`ErrorKind`): not found, permission
//!   denied, conflict, forbidden self-action, validation, infrastructure
//! - HTTP status mapping for the API layer
//! - Severity-driven logging and an error counter
//!
//! # Usage
//!
//! ```rust,ignore
//! use warehub_core::error::{WarehubError, Result};
//!
//! fn load(id: StoreId) -> Result<Store> {
//!     lookup(id).ok_or_else(|| WarehubError::store_not_found(id))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Warehub operations.
pub type Result<T> = std::result::Result<T, WarehubError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Missing entities (1000-1099)
    UserNotFound,
    WarehouseNotFound,
    StoreNotFound,
    ProductNotFound,
    InvitationNotFound,
    MembershipNotFound,

    // Authorization (1100-1199)
    Unauthenticated,
    PermissionDenied,

    // Conflicts (1200-1299)
    AlreadyMember,
    InvitationAlreadyPending,
    InvitationNotPending,
    NotYourInvitation,
    LastOwner,
    DuplicateRecord,

    // Self-targeted actions (1300-1399)
    CannotChangeSelf,
    CannotRemoveSelf,

    // Database Errors (2000-2099)
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseQueryFailed,
    DatabaseTransactionFailed,

    // Serialization Errors (2200-2299)
    SerializationError,

    // Collaborator Errors (3000-3099)
    SearchProviderError,
    EmbeddingError,
    ObjectStorageError,
    QueueUnavailable,

    // Validation Errors (4100-4199)
    ValidationError,
    InvalidInput,

    // Configuration Errors (5000-5099)
    ConfigurationError,
    InvalidConfiguration,

    // Internal Errors (9000-9099)
    InternalError,
}

/// Coarse error taxonomy shared by every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthenticated,
    PermissionDenied,
    Conflict,
    SelfActionForbidden,
    Validation,
    Infrastructure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::Conflict => "conflict",
            Self::SelfActionForbidden => "self_action_forbidden",
            Self::Validation => "validation",
            Self::Infrastructure => "infrastructure",
        };
        f.write_str(s)
    }
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::UserNotFound => 1000,
            Self::WarehouseNotFound => 1001,
            Self::StoreNotFound => 1002,
            Self::ProductNotFound => 1003,
            Self::InvitationNotFound => 1004,
            Self::MembershipNotFound => 1005,

            Self::Unauthenticated => 1100,
            Self::PermissionDenied => 1101,

            Self::AlreadyMember => 1200,
            Self::InvitationAlreadyPending => 1201,
            Self::InvitationNotPending => 1202,
            Self::NotYourInvitation => 1203,
            Self::LastOwner => 1204,
            Self::DuplicateRecord => 1205,

            Self::CannotChangeSelf => 1300,
            Self::CannotRemoveSelf => 1301,

            Self::DatabaseError => 2000,
            Self::DatabaseConnectionFailed => 2001,
            Self::DatabaseQueryFailed => 2002,
            Self::DatabaseTransactionFailed => 2003,

            Self::SerializationError => 2200,

            Self::SearchProviderError => 3000,
            Self::EmbeddingError => 3001,
            Self::ObjectStorageError => 3002,
            Self::QueueUnavailable => 3003,

            Self::ValidationError => 4100,
            Self::InvalidInput => 4101,

            Self::ConfigurationError => 5000,
            Self::InvalidConfiguration => 5001,

            Self::InternalError => 9000,
        }
    }

    /// Map this code onto the error taxonomy.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UserNotFound
            | Self::WarehouseNotFound
            | Self::StoreNotFound
            | Self::ProductNotFound
            | Self::InvitationNotFound
            | Self::MembershipNotFound => ErrorKind::NotFound,

            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::PermissionDenied => ErrorKind::PermissionDenied,

            Self::AlreadyMember
            | Self::InvitationAlreadyPending
            | Self::InvitationNotPending
            | Self::NotYourInvitation
            | Self::LastOwner
            | Self::DuplicateRecord => ErrorKind::Conflict,

            Self::CannotChangeSelf | Self::CannotRemoveSelf => ErrorKind::SelfActionForbidden,

            Self::ValidationError | Self::InvalidInput => ErrorKind::Validation,

            Self::DatabaseError
            | Self::DatabaseConnectionFailed
            | Self::DatabaseQueryFailed
            | Self::DatabaseTransactionFailed
            | Self::SerializationError
            | Self::SearchProviderError
            | Self::EmbeddingError
            | Self::ObjectStorageError
            | Self::QueueUnavailable
            | Self::ConfigurationError
            | Self::InvalidConfiguration
            | Self::InternalError => ErrorKind::Infrastructure,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::DatabaseConnectionFailed | Self::QueueUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::SearchProviderError | Self::EmbeddingError | Self::ObjectStorageError => {
                StatusCode::BAD_GATEWAY
            }
            _ => match self.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
                ErrorKind::PermissionDenied | ErrorKind::SelfActionForbidden => {
                    StatusCode::FORBIDDEN
                }
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseConnectionFailed
                | Self::DatabaseQueryFailed
                | Self::DatabaseTransactionFailed
                | Self::SearchProviderError
                | Self::EmbeddingError
                | Self::ObjectStorageError
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "not_found",
            1100..=1199 => "authorization",
            1200..=1299 => "conflict",
            1300..=1399 => "self_action",
            2000..=2099 => "database",
            2200..=2299 => "serialization",
            3000..=3099 => "collaborator",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors: bad input, missing rows, state conflicts
    Low,
    /// Denied access and degraded collaborators
    Medium,
    /// Storage and internal faults
    High,
    /// The service cannot reach its database
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::DatabaseConnectionFailed | ErrorCode::InternalError => Self::Critical,

            ErrorCode::DatabaseError
            | ErrorCode::DatabaseQueryFailed
            | ErrorCode::DatabaseTransactionFailed
            | ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::PermissionDenied
            | ErrorCode::Unauthenticated
            | ErrorCode::SearchProviderError
            | ErrorCode::EmbeddingError
            | ErrorCode::ObjectStorageError
            | ErrorCode::QueueUnavailable => Self::Medium,

            _ => Self::Low,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type (warehouse, store, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_id.is_none() && self.suggested_action.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Warehub.
///
/// Every failure surfaced by the engine carries a stable [`ErrorCode`], a
/// message that is safe to return to API clients, and optionally an internal
/// message and source error that are only ever logged.
#[derive(Error, Debug)]
pub struct WarehubError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for WarehubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl WarehubError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create an unauthenticated error.
    pub fn unauthenticated(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Get the user-friendly message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// The permission a guard rejection was raised for.
    pub fn denied_permission(&self) -> Option<&str> {
        if self.code != ErrorCode::PermissionDenied {
            return None;
        }
        self.details.context.get("permission").and_then(|v| v.as_str())
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let kind = self.code.kind();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    kind = %kind,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    kind = %kind,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    kind = %kind,
                    http_status = status,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    kind = %kind,
                    http_status = status,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "warehub_errors_total",
            "code" => self.code.to_string(),
            "kind" => self.code.kind().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// Taxonomy bucket
    pub kind: ErrorKind,

    /// User-friendly error message
    pub message: String,

    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&WarehubError> for ErrorResponse {
    fn from(error: &WarehubError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                kind: error.code.kind(),
                message: error.user_message.to_string(),
                details: if error.details.is_empty() {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for WarehubError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique index on `memberships (warehouse_id, user_id)`.
pub const MEMBERSHIP_PAIR_CONSTRAINT: &str = "memberships_warehouse_user_key";
/// Partial unique index on `invitations (email, warehouse_id) WHERE status = 'pending'`.
pub const PENDING_INVITATION_CONSTRAINT: &str = "invitations_pending_email_warehouse_idx";

impl From<sqlx::Error> for WarehubError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (
                ErrorCode::DatabaseQueryFailed,
                "The requested record was not found",
            ),
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    let mapped = match constraint {
                        MEMBERSHIP_PAIR_CONSTRAINT => Some((
                            ErrorCode::AlreadyMember,
                            "User is already a member of this warehouse",
                        )),
                        PENDING_INVITATION_CONSTRAINT => Some((
                            ErrorCode::InvitationAlreadyPending,
                            "An invitation is already pending for this email",
                        )),
                        c if c.ends_with("_key") || c.ends_with("pkey") => Some((
                            ErrorCode::DuplicateRecord,
                            "A record with this identifier already exists",
                        )),
                        c if c.ends_with("_fkey") => Some((
                            ErrorCode::InvalidInput,
                            "A referenced record does not exist",
                        )),
                        _ => None,
                    };
                    if let Some((code, msg)) = mapped {
                        return Self::with_internal(
                            code,
                            msg,
                            format!("Constraint violation: {}", constraint),
                        )
                        .with_source(error);
                    }
                }
                // 40001 serialization_failure, 40P01 deadlock_detected
                match db_err.code().as_deref() {
                    Some("40001") | Some("40P01") => (
                        ErrorCode::DatabaseTransactionFailed,
                        "The operation conflicted with a concurrent change",
                    ),
                    _ => (ErrorCode::DatabaseQueryFailed, "A database error occurred"),
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => (
                ErrorCode::DatabaseConnectionFailed,
                "Unable to connect to the database",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for WarehubError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(
            ErrorCode::DatabaseError,
            "Database migration failed",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<serde_json::Error> for WarehubError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<anyhow::Error> for WarehubError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<WarehubError>() {
            Ok(warehub_error) => warehub_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for WarehubError {
    fn from(error: config::ConfigError) -> Self {
        let (code, user_msg) = match &error {
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => (
                ErrorCode::InvalidConfiguration,
                "Configuration file is invalid",
            ),
            _ => (ErrorCode::ConfigurationError, "Configuration error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Convenience Constructors for Domain Errors
// ═══════════════════════════════════════════════════════════════════════════════

impl WarehubError {
    // ─────────────────────────────────────────────────────────────────────────
    // Missing entities
    // ─────────────────────────────────────────────────────────────────────────

    fn missing(code: ErrorCode, entity: &'static str, id: impl fmt::Display) -> Self {
        let id = id.to_string();
        let label = match entity {
            "user" => "User",
            "warehouse" => "Warehouse",
            "store" => "Store",
            "product" => "Product",
            "invitation" => "Invitation",
            _ => "Membership",
        };
        Self::new(code, format!("{} not found: {}", label, id))
            .with_details(ErrorDetails::new().with_entity(entity, id))
    }

    pub fn user_not_found(id: impl fmt::Display) -> Self {
        Self::missing(ErrorCode::UserNotFound, "user", id)
    }

    pub fn warehouse_not_found(id: impl fmt::Display) -> Self {
        Self::missing(ErrorCode::WarehouseNotFound, "warehouse", id)
    }

    pub fn store_not_found(id: impl fmt::Display) -> Self {
        Self::missing(ErrorCode::StoreNotFound, "store", id)
    }

    pub fn product_not_found(id: impl fmt::Display) -> Self {
        Self::missing(ErrorCode::ProductNotFound, "product", id)
    }

    pub fn invitation_not_found(id: impl fmt::Display) -> Self {
        Self::missing(ErrorCode::InvitationNotFound, "invitation", id)
    }

    pub fn membership_not_found(id: impl fmt::Display) -> Self {
        Self::missing(ErrorCode::MembershipNotFound, "membership", id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization
    // ─────────────────────────────────────────────────────────────────────────

    /// Guard rejection. The message names the missing permission.
    pub fn permission_denied(permission: impl fmt::Display) -> Self {
        let permission = permission.to_string();
        Self::new(
            ErrorCode::PermissionDenied,
            format!("Permission denied: {}", permission),
        )
        .with_context("permission", &permission)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Membership and invitation conflicts
    // ─────────────────────────────────────────────────────────────────────────

    pub fn already_member(warehouse_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::AlreadyMember,
            "User is already a member of this warehouse",
        )
        .with_details(ErrorDetails::new().with_entity("warehouse", warehouse_id.to_string()))
    }

    pub fn invitation_already_pending(warehouse_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvitationAlreadyPending,
            "An invitation is already pending for this email",
        )
        .with_details(ErrorDetails::new().with_entity("warehouse", warehouse_id.to_string()))
    }

    pub fn invitation_not_pending(status: impl fmt::Display) -> Self {
        let status = status.to_string();
        Self::new(
            ErrorCode::InvitationNotPending,
            format!("Invitation is no longer pending (status: {})", status),
        )
        .with_context("status", status)
    }

    pub fn not_your_invitation() -> Self {
        Self::new(
            ErrorCode::NotYourInvitation,
            "This invitation was issued to a different email address",
        )
    }

    pub fn last_owner(warehouse_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::LastOwner,
            "A warehouse must keep at least one owner",
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("warehouse", warehouse_id.to_string())
                .with_suggestion("Promote another member to owner first"),
        )
    }

    pub fn cannot_change_self() -> Self {
        Self::new(ErrorCode::CannotChangeSelf, "You cannot change your own role")
    }

    pub fn cannot_remove_self() -> Self {
        Self::new(
            ErrorCode::CannotRemoveSelf,
            "You cannot remove yourself from a warehouse",
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Collaborators
    // ─────────────────────────────────────────────────────────────────────────

    pub fn search_provider(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::SearchProviderError,
            "The search provider failed",
            message,
        )
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::EmbeddingError,
            "Failed to compute a search vector",
            message,
        )
    }

    pub fn object_storage(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ObjectStorageError,
            "Object storage request failed",
            message,
        )
    }

    pub fn queue_unavailable(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::QueueUnavailable,
            "Background task queue is unavailable",
            message,
        )
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
