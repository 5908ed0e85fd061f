//! Unified error types for all layers of the job pipeline.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for the Beacon job pipeline.
///
/// This enum provides the error variants shared by the domain, repository,
/// and pipeline layers. Caller-facing variants carry stable codes so the
/// excluded application layer can surface them without string matching.
#[derive(Error, Debug)]
pub enum BeaconError {
    // ============ Domain Errors ============
    /// Resource not found. Also returned for resources the caller's tenant
    /// does not own; existence is never leaked to non-owners.
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (e.g., duplicate entry)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Illegal job status transition. Signals a race or programming defect;
    /// never expected in normal operation.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    // ============ Authentication/Authorization Errors ============
    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden access
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ============ Quota/Backpressure Errors ============
    /// Billing/plan quota exhausted for a metered resource.
    #[error("Quota exceeded for {metric}: {used}/{limit}")]
    QuotaExceeded {
        metric: String,
        limit: u64,
        used: u64,
    },

    /// Tenant is at its in-flight job ceiling; retry later.
    #[error("Concurrency limit reached: {limit} jobs in flight")]
    ConcurrencyDenied { limit: u64 },

    // ============ Infrastructure Errors ============
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External service error
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeaconError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) | Self::InvalidTransition { .. } => 409,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::QuotaExceeded { .. } | Self::ConcurrencyDenied { .. } => 429,
            Self::Timeout(_) => 503,
            Self::ExternalService { .. } => 502,
            Self::Database(_) | Self::Configuration(_) | Self::Internal(_) | Self::Other(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::ConcurrencyDenied { .. } => "CONCURRENCY_DENIED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Creates an invalid transition error from a status pair.
    #[must_use]
    pub fn invalid_transition<F: ToString, T: ToString>(from: F, to: T) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Checks if this error is retriable by the caller.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::ExternalService { .. }
                | Self::Timeout(_)
                | Self::ConcurrencyDenied { .. }
        )
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for BeaconError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound {
                resource_type: "database_row",
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                // Check for unique constraint violation
                if let Some(code) = db_err.code() {
                    if code == "23505" || code == "1062" {
                        // PostgreSQL / MySQL unique violation
                        return Self::Conflict(db_err.message().to_string());
                    }
                }
                Self::Database(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for BeaconError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Serializable error response for the application layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Field-level validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name
    pub field: String,
    /// Error message
    pub message: String,
    /// Error code
    pub code: String,
}

impl ErrorResponse {
    /// Creates a new error response from a `BeaconError`.
    #[must_use]
    pub fn from_error(error: &BeaconError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }

    /// Attaches field-level errors.
    #[must_use]
    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BeaconError::not_found("Job", "abc").status_code(), 404);
        assert_eq!(BeaconError::validation("bad").status_code(), 400);
        assert_eq!(BeaconError::conflict("dup").status_code(), 409);
        assert_eq!(
            BeaconError::QuotaExceeded {
                metric: "jobs".into(),
                limit: 10,
                used: 10,
            }
            .status_code(),
            429
        );
        assert_eq!(BeaconError::ConcurrencyDenied { limit: 3 }.status_code(), 429);
    }

    #[test]
    fn test_invalid_transition_code() {
        let err = BeaconError::invalid_transition("completed", "running");
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert_eq!(err.status_code(), 409);
        let msg = err.to_string();
        assert!(msg.contains("completed") && msg.contains("running"));
    }

    #[test]
    fn test_concurrency_denied_is_retriable() {
        assert!(BeaconError::ConcurrencyDenied { limit: 3 }.is_retriable());
        assert!(!BeaconError::validation("nope").is_retriable());
    }

    #[test]
    fn test_quota_exceeded_message() {
        let err = BeaconError::QuotaExceeded {
            metric: "research_jobs".into(),
            limit: 50,
            used: 50,
        };
        let msg = err.to_string();
        assert!(msg.contains("research_jobs") && msg.contains("50/50"));
    }

    #[test]
    fn test_error_response() {
        let err = BeaconError::validation("payload: missing");
        let resp = ErrorResponse::from_error(&err);
        assert_eq!(resp.code, "VALIDATION_ERROR");
        assert!(resp.details.is_none());
    }
}
