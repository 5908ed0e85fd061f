//! Pipeline error types.

use beacon_core::BeaconError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline-related errors.
///
/// Caller-facing variants map one-to-one onto stable codes. The worker loop
/// never propagates executor failures through this type; they are recorded
/// on the job instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed submission; no state was mutated.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller identity could not be resolved.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource absent or not owned by the caller's tenant.
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Billing/plan limit reached; no job was created.
    #[error("Quota exceeded for {metric}: {used}/{limit}")]
    QuotaExceeded {
        metric: String,
        limit: u64,
        used: u64,
    },

    /// Tenant at its in-flight ceiling; any quota reservation taken for
    /// this submission has been rolled back.
    #[error("Concurrency limit reached: {limit} jobs in flight")]
    ConcurrencyDenied { limit: u64 },

    /// Illegal status transition; signals a race or programming defect.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Duplicate entry or conflicting concurrent update.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The pluggable executor returned an error.
    #[error("Executor error: {0}")]
    Executor(String),

    /// Job execution exceeded its timeout.
    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration error (missing executor, bad settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Job store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::ConcurrencyDenied { .. } => "CONCURRENCY_DENIED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Conflict(_) => "CONFLICT",
            Self::Executor(_) => "EXECUTOR_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Serialization(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the caller may retry the operation later.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyDenied { .. } | Self::Storage(_) | Self::Timeout(_)
        )
    }
}

impl From<BeaconError> for PipelineError {
    fn from(err: BeaconError) -> Self {
        match err {
            BeaconError::NotFound { resource_type, id } => Self::NotFound { resource_type, id },
            BeaconError::Validation(msg) => Self::Validation(msg),
            BeaconError::Conflict(msg) => Self::Conflict(msg),
            BeaconError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            BeaconError::Unauthorized(msg) | BeaconError::Forbidden(msg) => Self::Unauthorized(msg),
            BeaconError::QuotaExceeded {
                metric,
                limit,
                used,
            } => Self::QuotaExceeded {
                metric,
                limit,
                used,
            },
            BeaconError::ConcurrencyDenied { limit } => Self::ConcurrencyDenied { limit },
            BeaconError::Database(msg) => Self::Storage(msg),
            BeaconError::Configuration(msg) => Self::Configuration(msg),
            BeaconError::Timeout(msg) => Self::Storage(msg),
            BeaconError::ExternalService { service, message } => {
                Self::Internal(format!("{service}: {message}"))
            }
            BeaconError::Internal(msg) => Self::Internal(msg),
            BeaconError::Other(err) => Self::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retriable_concurrency_denied() {
        let err = PipelineError::ConcurrencyDenied { limit: 3 };
        assert!(err.is_retriable());
    }

    #[test]
    fn test_is_not_retriable_validation() {
        let err = PipelineError::Validation("payload: missing".into());
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_is_not_retriable_quota() {
        let err = PipelineError::QuotaExceeded {
            metric: "research_jobs".into(),
            limit: 10,
            used: 10,
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_error_code_stability() {
        assert_eq!(
            PipelineError::ConcurrencyDenied { limit: 1 }.error_code(),
            "CONCURRENCY_DENIED"
        );
        assert_eq!(
            PipelineError::InvalidTransition {
                from: "completed".into(),
                to: "running".into(),
            }
            .error_code(),
            "INVALID_TRANSITION"
        );
    }

    #[test]
    fn test_from_beacon_not_found() {
        let err = PipelineError::from(BeaconError::not_found("Job", "abc"));
        match err {
            PipelineError::NotFound { resource_type, id } => {
                assert_eq!(resource_type, "Job");
                assert_eq!(id, "abc");
            }
            _ => panic!("Expected NotFound"),
        }
    }

    #[test]
    fn test_from_beacon_invalid_transition() {
        let err = PipelineError::from(BeaconError::invalid_transition("running", "pending"));
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_display_timeout() {
        let err = PipelineError::Timeout(60);
        assert!(err.to_string().contains("60"));
    }
}
