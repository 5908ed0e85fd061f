//! Dead-letter queue management.
//!
//! FAILED jobs are retained for operator inspection rather than deleted.
//! The manager lists them, retries or dismisses them individually, and
//! applies bulk actions; bulk transient retry consults the failure
//! classifier so permanently failed jobs are not re-queued unfixed.

use crate::classify::{FailureClass, FailureClassifier};
use crate::dto::{FailedJobView, JobStatusView};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;
use beacon_core::{Job, JobId, JobTransition, TenantId};
use beacon_repository::JobRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Bulk operation over a tenant's non-dismissed FAILED jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    /// Retry every listed job.
    RetryAll,
    /// Retry only jobs whose failure classifies as transient.
    RetryTransient,
    /// Dismiss every listed job.
    DismissAll,
    /// Reset retry counters without changing status.
    ClearAttempts,
}

/// Result of a bulk operation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BulkOutcome {
    /// Jobs the action was considered for.
    pub matched: u64,
    /// Jobs the action was applied to.
    pub applied: u64,
    /// Jobs skipped (permanent failures under `RetryTransient`, or
    /// per-job errors).
    pub skipped: u64,
}

/// Surfaces and recovers failed jobs.
pub struct DeadLetterManager {
    repository: Arc<dyn JobRepository>,
    classifier: Arc<dyn FailureClassifier>,
}

impl DeadLetterManager {
    /// Creates a new dead-letter manager.
    #[must_use]
    pub fn new(repository: Arc<dyn JobRepository>, classifier: Arc<dyn FailureClassifier>) -> Self {
        Self {
            repository,
            classifier,
        }
    }

    /// Lists the tenant's non-dismissed FAILED jobs, newest failure first.
    pub async fn list(&self, tenant_id: TenantId) -> PipelineResult<Vec<FailedJobView>> {
        let jobs = self.repository.list_dead_letter(tenant_id).await?;
        Ok(jobs
            .into_iter()
            .map(|job| {
                let transient = self.is_transient(&job);
                FailedJobView::from_job(job, transient)
            })
            .collect())
    }

    /// Retries a failed job: FAILED → PENDING, failure state and retry
    /// metadata cleared, immediately claimable.
    pub async fn retry(&self, job_id: JobId, tenant_id: TenantId) -> PipelineResult<JobStatusView> {
        let job = self.require(job_id, tenant_id).await?;

        let retried = self
            .repository
            .transition(job.id, JobTransition::Retry)
            .await?;

        info!(job_id = %job_id, tenant_id = %tenant_id, "Job re-queued from dead letter");
        metrics::increment(metrics::names::JOBS_RETRIED_TOTAL, retried.job_type.as_str());

        Ok(JobStatusView::from(retried))
    }

    /// Hides a failed job from the listing. The record is retained.
    pub async fn dismiss(&self, job_id: JobId, tenant_id: TenantId) -> PipelineResult<()> {
        self.repository
            .set_dismissed(job_id, tenant_id, true)
            .await?;
        info!(job_id = %job_id, tenant_id = %tenant_id, "Dead-letter job dismissed");
        Ok(())
    }

    /// Resets the retry counter of a failed job without changing status.
    pub async fn clear_attempts(
        &self,
        job_id: JobId,
        tenant_id: TenantId,
    ) -> PipelineResult<JobStatusView> {
        let job = self.repository.clear_attempts(job_id, tenant_id).await?;
        Ok(JobStatusView::from(job))
    }

    /// Applies a bulk action to all non-dismissed FAILED jobs of the tenant.
    ///
    /// Per-job errors are logged and counted as skipped; the bulk operation
    /// itself keeps going.
    pub async fn bulk(&self, tenant_id: TenantId, action: BulkAction) -> PipelineResult<BulkOutcome> {
        let jobs = self.repository.list_dead_letter(tenant_id).await?;

        let mut outcome = BulkOutcome {
            matched: jobs.len() as u64,
            ..BulkOutcome::default()
        };

        for job in jobs {
            let applied = match action {
                BulkAction::RetryAll => self.apply_retry(&job).await,
                BulkAction::RetryTransient => {
                    if self.is_transient(&job) {
                        self.apply_retry(&job).await
                    } else {
                        false
                    }
                }
                BulkAction::DismissAll => self
                    .repository
                    .set_dismissed(job.id, tenant_id, true)
                    .await
                    .map_err(|e| warn!(job_id = %job.id, error = %e, "Bulk dismiss failed"))
                    .is_ok(),
                BulkAction::ClearAttempts => self
                    .repository
                    .clear_attempts(job.id, tenant_id)
                    .await
                    .map_err(|e| warn!(job_id = %job.id, error = %e, "Bulk clear failed"))
                    .is_ok(),
            };

            if applied {
                outcome.applied += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        info!(
            tenant_id = %tenant_id,
            action = ?action,
            matched = outcome.matched,
            applied = outcome.applied,
            skipped = outcome.skipped,
            "Bulk dead-letter action finished"
        );

        Ok(outcome)
    }

    fn is_transient(&self, job: &Job) -> bool {
        job.error
            .as_ref()
            .map_or(true, |f| self.classifier.classify(f) == FailureClass::Transient)
    }

    async fn apply_retry(&self, job: &Job) -> bool {
        match self
            .repository
            .transition(job.id, JobTransition::Retry)
            .await
        {
            Ok(retried) => {
                metrics::increment(metrics::names::JOBS_RETRIED_TOTAL, retried.job_type.as_str());
                true
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Bulk retry failed");
                false
            }
        }
    }

    async fn require(&self, job_id: JobId, tenant_id: TenantId) -> PipelineResult<Job> {
        self.repository
            .find_by_id(job_id, tenant_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound {
                resource_type: "Job",
                id: job_id.to_string(),
            })
    }
}
