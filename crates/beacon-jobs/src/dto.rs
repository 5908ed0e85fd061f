//! Request and view types exposed to the application layer.

use beacon_core::{Job, JobFailure, JobId, JobStatus, JobType, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use validator::{Validate, ValidationError};

/// A job submission.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitRequest {
    /// Opaque auth material; interpreted by the caller resolver.
    #[validate(length(min = 1, message = "Credential must not be empty"))]
    pub credential: String,

    /// Project the job operates on.
    pub project_id: ProjectId,

    /// Job kind to run.
    pub job_type: JobType,

    /// Deduplication key for this submission.
    #[validate(
        length(min = 1, max = 128, message = "Idempotency key must be 1-128 characters"),
        custom(function = beacon_core::validation::rules::not_blank)
    )]
    pub idempotency_key: String,

    /// Executor input.
    #[validate(custom(function = payload_is_object))]
    pub payload: JsonValue,
}

fn payload_is_object(payload: &JsonValue) -> Result<(), ValidationError> {
    if payload.is_object() {
        Ok(())
    } else {
        let mut error = ValidationError::new("payload_not_object");
        error.message = Some("Payload must be a JSON object".into());
        Err(error)
    }
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    /// The job handling this submission.
    pub job_id: JobId,
    /// Always true for a returned submission; denials surface as errors.
    pub accepted: bool,
    /// True when an existing live job absorbed this submission.
    pub reused: bool,
}

/// Status view of a job for polling clients.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    /// Job id.
    pub job_id: JobId,
    /// Project the job operates on.
    pub project_id: ProjectId,
    /// Job kind.
    pub job_type: JobType,
    /// Lifecycle state.
    pub status: JobStatus,
    /// Outcome text, present once COMPLETED.
    pub result_summary: Option<String>,
    /// Failure detail, present once FAILED.
    pub error: Option<JobFailure>,
    /// Failed execution attempts.
    pub attempts: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            project_id: job.project_id,
            job_type: job.job_type,
            status: job.status,
            result_summary: job.result_summary,
            error: job.error,
            attempts: job.retry.attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Dead-letter view of a failed job.
#[derive(Debug, Clone, Serialize)]
pub struct FailedJobView {
    /// Job id.
    pub job_id: JobId,
    /// Project the job operates on.
    pub project_id: ProjectId,
    /// Job kind.
    pub job_type: JobType,
    /// Failure detail.
    pub error: Option<JobFailure>,
    /// Failed execution attempts.
    pub attempts: u32,
    /// Whether the failure is classified as transient.
    pub transient: bool,
    /// When the job failed.
    pub failed_at: DateTime<Utc>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
}

impl FailedJobView {
    /// Builds the view from a failed job and its classification.
    #[must_use]
    pub fn from_job(job: Job, transient: bool) -> Self {
        Self {
            job_id: job.id,
            project_id: job.project_id,
            job_type: job.job_type,
            error: job.error,
            attempts: job.retry.attempts,
            transient,
            failed_at: job.updated_at,
            created_at: job.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::ValidateExt;
    use serde_json::json;

    fn valid_request() -> SubmitRequest {
        SubmitRequest {
            credential: "token-abc".into(),
            project_id: ProjectId::new(),
            job_type: JobType::Research,
            idempotency_key: "k1".into(),
            payload: json!({"query": "market sizing"}),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(valid_request().validate_request().is_ok());
    }

    #[test]
    fn test_empty_idempotency_key_rejected() {
        let mut request = valid_request();
        request.idempotency_key = String::new();
        assert!(request.validate_request().is_err());
    }

    #[test]
    fn test_blank_idempotency_key_rejected() {
        let mut request = valid_request();
        request.idempotency_key = "   ".into();
        assert!(request.validate_request().is_err());
    }

    #[test]
    fn test_oversized_idempotency_key_rejected() {
        let mut request = valid_request();
        request.idempotency_key = "k".repeat(129);
        assert!(request.validate_request().is_err());
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let mut request = valid_request();
        request.payload = json!([1, 2, 3]);
        let err = request.validate_request().unwrap_err();
        assert!(err.to_string().contains("payload"));
    }

    #[test]
    fn test_status_view_from_job() {
        let job = Job::new(
            beacon_core::TenantId::new(),
            beacon_core::UserId::new(),
            ProjectId::new(),
            JobType::Analysis,
            "k1",
            json!({}),
        );
        let view = JobStatusView::from(job.clone());
        assert_eq!(view.job_id, job.id);
        assert_eq!(view.status, JobStatus::Pending);
        assert!(view.error.is_none());
    }
}
