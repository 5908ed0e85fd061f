//! Dependency injection interfaces for the pipeline.
//!
//! [`JobPipeline`] is the single facade the surrounding application layer
//! consumes: submission, status polling, cancellation, listings, and the
//! dead-letter workflow, with the worker pool and reaper running alongside
//! as background tasks.

use crate::dead_letter::{BulkAction, BulkOutcome, DeadLetterManager};
use crate::dispatcher::Dispatcher;
use crate::dto::{FailedJobView, JobStatusView, SubmitRequest, Submission};
use crate::error::PipelineResult;
use async_trait::async_trait;
use beacon_core::{Interface, JobId, Page, PageRequest, TenantId};
use beacon_repository::{JobFilter, JobRepository, PipelineStats};
use std::sync::Arc;

/// Interface for job pipeline operations.
#[async_trait]
pub trait JobPipelineInterface: Interface + Send + Sync {
    /// Submits a job through the admission gates.
    async fn submit(&self, request: SubmitRequest) -> PipelineResult<Submission>;

    /// Returns the status view of a job, scoped to the tenant.
    async fn get_status(&self, job_id: JobId, tenant_id: TenantId)
        -> PipelineResult<JobStatusView>;

    /// Cancels a PENDING job.
    async fn cancel(
        &self,
        job_id: JobId,
        tenant_id: TenantId,
        reason: String,
    ) -> PipelineResult<JobStatusView>;

    /// Lists the tenant's jobs with optional filters, newest first.
    async fn list_jobs(
        &self,
        tenant_id: TenantId,
        filter: JobFilter,
        page: PageRequest,
    ) -> PipelineResult<Page<JobStatusView>>;

    /// Lists the tenant's non-dismissed failed jobs.
    async fn list_dead_letter(&self, tenant_id: TenantId) -> PipelineResult<Vec<FailedJobView>>;

    /// Retries a failed job.
    async fn retry(&self, job_id: JobId, tenant_id: TenantId) -> PipelineResult<JobStatusView>;

    /// Dismisses a failed job from the dead-letter listing.
    async fn dismiss(&self, job_id: JobId, tenant_id: TenantId) -> PipelineResult<()>;

    /// Resets a failed job's retry counter.
    async fn clear_attempts(
        &self,
        job_id: JobId,
        tenant_id: TenantId,
    ) -> PipelineResult<JobStatusView>;

    /// Applies a bulk dead-letter action.
    async fn bulk_action(
        &self,
        tenant_id: TenantId,
        action: BulkAction,
    ) -> PipelineResult<BulkOutcome>;

    /// Returns per-status job counts for the tenant.
    async fn stats(&self, tenant_id: TenantId) -> PipelineResult<PipelineStats>;
}

/// Job pipeline facade implementation.
pub struct JobPipeline {
    dispatcher: Dispatcher,
    dead_letter: DeadLetterManager,
    repository: Arc<dyn JobRepository>,
}

impl JobPipeline {
    /// Creates a new pipeline facade.
    #[must_use]
    pub fn new(
        dispatcher: Dispatcher,
        dead_letter: DeadLetterManager,
        repository: Arc<dyn JobRepository>,
    ) -> Self {
        Self {
            dispatcher,
            dead_letter,
            repository,
        }
    }
}

#[async_trait]
impl JobPipelineInterface for JobPipeline {
    async fn submit(&self, request: SubmitRequest) -> PipelineResult<Submission> {
        self.dispatcher.submit(request).await
    }

    async fn get_status(
        &self,
        job_id: JobId,
        tenant_id: TenantId,
    ) -> PipelineResult<JobStatusView> {
        self.dispatcher.get_status(job_id, tenant_id).await
    }

    async fn cancel(
        &self,
        job_id: JobId,
        tenant_id: TenantId,
        reason: String,
    ) -> PipelineResult<JobStatusView> {
        self.dispatcher.cancel(job_id, tenant_id, reason).await
    }

    async fn list_jobs(
        &self,
        tenant_id: TenantId,
        filter: JobFilter,
        page: PageRequest,
    ) -> PipelineResult<Page<JobStatusView>> {
        let jobs = self.repository.list_by_tenant(tenant_id, filter, page).await?;
        Ok(jobs.map(JobStatusView::from))
    }

    async fn list_dead_letter(&self, tenant_id: TenantId) -> PipelineResult<Vec<FailedJobView>> {
        self.dead_letter.list(tenant_id).await
    }

    async fn retry(&self, job_id: JobId, tenant_id: TenantId) -> PipelineResult<JobStatusView> {
        self.dead_letter.retry(job_id, tenant_id).await
    }

    async fn dismiss(&self, job_id: JobId, tenant_id: TenantId) -> PipelineResult<()> {
        self.dead_letter.dismiss(job_id, tenant_id).await
    }

    async fn clear_attempts(
        &self,
        job_id: JobId,
        tenant_id: TenantId,
    ) -> PipelineResult<JobStatusView> {
        self.dead_letter.clear_attempts(job_id, tenant_id).await
    }

    async fn bulk_action(
        &self,
        tenant_id: TenantId,
        action: BulkAction,
    ) -> PipelineResult<BulkOutcome> {
        self.dead_letter.bulk(tenant_id, action).await
    }

    async fn stats(&self, tenant_id: TenantId) -> PipelineResult<PipelineStats> {
        Ok(self.repository.stats(tenant_id).await?)
    }
}
