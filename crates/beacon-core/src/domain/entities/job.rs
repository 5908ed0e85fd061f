//! Job entity: the central record of the pipeline.

use crate::{
    Entity, FailureKind, JobFailure, JobId, JobStatus, JobType, ProjectId, TenantId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Retry-management metadata, kept as a dedicated sub-record rather than
/// inside the executor payload. Meaningful only while a job is FAILED;
/// cleared when the job re-enters PENDING.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Number of failed execution attempts since the last operator reset.
    pub attempts: u32,

    /// Earliest time the job becomes claimable again.
    pub next_run_at: Option<DateTime<Utc>>,

    /// Hidden from the dead-letter listing; the record is retained.
    pub dismissed: bool,

    /// When the job was dismissed.
    pub dismissed_at: Option<DateTime<Utc>>,

    /// Error text of the most recent failure.
    pub last_error: Option<String>,
}

/// The closed set of named update operations accepted by the job store.
///
/// Each variant encodes its expected current status, its target status, and
/// the fields it is allowed to touch; there is no free-form field update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTransition {
    /// PENDING → RUNNING: a worker takes exclusive ownership.
    Claim,
    /// RUNNING → COMPLETED: records the outcome summary.
    Complete {
        /// Human-readable outcome text.
        result_summary: String,
    },
    /// RUNNING → FAILED: records the failure and counts the attempt.
    Fail {
        /// Structured failure detail.
        error: JobFailure,
    },
    /// FAILED → PENDING: operator retry; clears failure state and retry
    /// metadata and makes the job immediately claimable.
    Retry,
    /// PENDING → FAILED: cancellation or pre-execution validation failure.
    Cancel {
        /// Cancellation reason.
        reason: String,
    },
}

impl JobTransition {
    /// The status the persisted job must currently hold.
    #[must_use]
    pub const fn from_status(&self) -> JobStatus {
        match self {
            Self::Claim | Self::Cancel { .. } => JobStatus::Pending,
            Self::Complete { .. } | Self::Fail { .. } => JobStatus::Running,
            Self::Retry => JobStatus::Failed,
        }
    }

    /// The status the job moves to.
    #[must_use]
    pub const fn target_status(&self) -> JobStatus {
        match self {
            Self::Claim => JobStatus::Running,
            Self::Complete { .. } => JobStatus::Completed,
            Self::Fail { .. } | Self::Cancel { .. } => JobStatus::Failed,
            Self::Retry => JobStatus::Pending,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::Complete { .. } => "complete",
            Self::Fail { .. } => "fail",
            Self::Retry => "retry",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// A unit of asynchronous, possibly long-running work tracked through the
/// status lifecycle.
///
/// `tenant_id` and `owner_id` never change after creation; every read and
/// write is scoped by tenant. The payload is opaque input for the executor
/// and is immutable once the job is RUNNING.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, generated at creation.
    pub id: JobId,

    /// Account/organization the job belongs to.
    pub tenant_id: TenantId,

    /// User who submitted the job.
    pub owner_id: UserId,

    /// Project the job operates on; scoping key for idempotency.
    pub project_id: ProjectId,

    /// Discriminates which executor handles the job.
    pub job_type: JobType,

    /// Lifecycle state.
    pub status: JobStatus,

    /// Caller- or system-supplied deduplication key, unique within
    /// (tenant, project, type) while the job is live.
    pub idempotency_key: String,

    /// Opaque structured input for the executor.
    pub payload: JsonValue,

    /// Human-readable outcome text, set only on COMPLETED.
    pub result_summary: Option<String>,

    /// Structured failure detail, set only on FAILED.
    pub error: Option<JobFailure>,

    /// Retry-management metadata.
    pub retry: RetryState,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last transition timestamp; changes on every transition.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a new PENDING job.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        owner_id: UserId,
        project_id: ProjectId,
        job_type: JobType,
        idempotency_key: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id,
            owner_id,
            project_id,
            job_type,
            status: JobStatus::Pending,
            idempotency_key: idempotency_key.into(),
            payload,
            result_summary: None,
            error: None,
            retry: RetryState::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks if the job counts against its tenant's in-flight ceiling.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }

    /// Checks if the job is visible in the dead-letter listing.
    #[must_use]
    pub fn is_dead_letter(&self) -> bool {
        self.status == JobStatus::Failed && !self.retry.dismissed
    }

    /// Applies a transition in place, verifying the current status matches
    /// the transition's expected `from` status.
    ///
    /// This is the single place transition field semantics live; both store
    /// backends go through it (the SQL backend mirrors it column-for-column).
    ///
    /// # Errors
    ///
    /// Returns [`crate::BeaconError::InvalidTransition`] when the current
    /// status does not match; the job is left unchanged.
    pub fn apply(&mut self, transition: &JobTransition) -> crate::BeaconResult<()> {
        if self.status != transition.from_status() {
            return Err(crate::BeaconError::invalid_transition(
                self.status,
                transition.target_status(),
            ));
        }

        let now = Utc::now();
        match transition {
            JobTransition::Claim => {
                self.status = JobStatus::Running;
            }
            JobTransition::Complete { result_summary } => {
                self.status = JobStatus::Completed;
                self.result_summary = Some(result_summary.clone());
                self.error = None;
            }
            JobTransition::Fail { error } => {
                self.status = JobStatus::Failed;
                self.retry.attempts += 1;
                self.retry.last_error = Some(error.message.clone());
                self.error = Some(error.clone());
            }
            JobTransition::Retry => {
                self.status = JobStatus::Pending;
                self.result_summary = None;
                self.error = None;
                self.retry = RetryState {
                    next_run_at: Some(now),
                    ..RetryState::default()
                };
            }
            JobTransition::Cancel { reason } => {
                let failure = JobFailure::new(FailureKind::Cancelled, reason.clone());
                self.status = JobStatus::Failed;
                self.retry.last_error = Some(failure.message.clone());
                self.error = Some(failure);
            }
        }
        self.updated_at = now;
        Ok(())
    }
}

impl Entity<JobId> for Job {
    fn id(&self) -> &JobId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_job() -> Job {
        Job::new(
            TenantId::new(),
            UserId::new(),
            ProjectId::new(),
            JobType::Research,
            "k1",
            json!({"query": "market sizing"}),
        )
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.is_in_flight());
        assert_eq!(job.retry, RetryState::default());
    }

    #[test]
    fn test_claim_then_complete() {
        let mut job = sample_job();
        job.apply(&JobTransition::Claim).unwrap();
        assert_eq!(job.status, JobStatus::Running);

        job.apply(&JobTransition::Complete {
            result_summary: "12 sources collected".into(),
        })
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result_summary.as_deref(), Some("12 sources collected"));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_fail_records_error_and_attempt() {
        let mut job = sample_job();
        job.apply(&JobTransition::Claim).unwrap();
        job.apply(&JobTransition::Fail {
            error: JobFailure::executor("rate limited"),
        })
        .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry.attempts, 1);
        assert_eq!(job.retry.last_error.as_deref(), Some("rate limited"));
        assert!(job.is_dead_letter());
    }

    #[test]
    fn test_retry_clears_failure_state() {
        let mut job = sample_job();
        job.apply(&JobTransition::Claim).unwrap();
        job.apply(&JobTransition::Fail {
            error: JobFailure::executor("boom"),
        })
        .unwrap();
        job.apply(&JobTransition::Retry).unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.error.is_none());
        assert_eq!(job.retry.attempts, 0);
        assert!(!job.retry.dismissed);
        assert!(job.retry.next_run_at.is_some());
    }

    #[test]
    fn test_cancel_from_pending() {
        let mut job = sample_job();
        job.apply(&JobTransition::Cancel {
            reason: "superseded by newer submission".into(),
        })
        .unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        let error = job.error.unwrap();
        assert_eq!(error.kind, FailureKind::Cancelled);
        // cancellation is not an execution attempt
        assert_eq!(job.retry.attempts, 0);
    }

    #[test]
    fn test_illegal_apply_leaves_job_unchanged() {
        let mut job = sample_job();
        job.apply(&JobTransition::Claim).unwrap();
        job.apply(&JobTransition::Complete {
            result_summary: "done".into(),
        })
        .unwrap();

        let before = job.clone();
        let err = job.apply(&JobTransition::Claim).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert_eq!(job.status, before.status);
        assert_eq!(job.updated_at, before.updated_at);
    }

    #[test]
    fn test_duplicate_completion_rejected() {
        let mut job = sample_job();
        job.apply(&JobTransition::Claim).unwrap();
        job.apply(&JobTransition::Complete {
            result_summary: "done".into(),
        })
        .unwrap();

        let err = job
            .apply(&JobTransition::Complete {
                result_summary: "done again".into(),
            })
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
    }
}
