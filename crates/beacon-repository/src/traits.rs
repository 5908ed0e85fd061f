//! Job store trait definitions.

use async_trait::async_trait;
use beacon_core::{
    BeaconResult, Interface, Job, JobId, JobStatus, JobTransition, JobType, Page, PageRequest,
    ProjectId, TenantId, UserId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Specification for a job to be created.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Tenant the job belongs to.
    pub tenant_id: TenantId,
    /// Submitting user.
    pub owner_id: UserId,
    /// Project the job operates on.
    pub project_id: ProjectId,
    /// Job kind.
    pub job_type: JobType,
    /// Deduplication key, unique within (tenant, project, type) while live.
    pub idempotency_key: String,
    /// Opaque executor input.
    pub payload: JsonValue,
}

impl NewJob {
    /// Builds the PENDING job entity this specification describes.
    #[must_use]
    pub fn into_job(self) -> Job {
        Job::new(
            self.tenant_id,
            self.owner_id,
            self.project_id,
            self.job_type,
            self.idempotency_key,
            self.payload,
        )
    }
}

/// Outcome of an idempotent reservation.
///
/// A racing duplicate submission is absorbed: the loser receives the
/// winner's job as [`Reservation::Reused`] instead of an error.
#[derive(Debug, Clone)]
pub enum Reservation {
    /// A new job row was created.
    Created(Job),
    /// A live job with the same (tenant, project, type, key) already
    /// existed and is returned instead.
    Reused(Job),
}

impl Reservation {
    /// Returns the reserved job.
    #[must_use]
    pub fn job(&self) -> &Job {
        match self {
            Self::Created(job) | Self::Reused(job) => job,
        }
    }

    /// Consumes the reservation, returning the job.
    #[must_use]
    pub fn into_job(self) -> Job {
        match self {
            Self::Created(job) | Self::Reused(job) => job,
        }
    }

    /// True if a new row was created.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Filter for tenant-scoped job listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter {
    /// Restrict to one status.
    pub status: Option<JobStatus>,
    /// Restrict to one job type.
    pub job_type: Option<JobType>,
    /// Restrict to one project.
    pub project_id: Option<ProjectId>,
}

/// Per-tenant job counts by lifecycle state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Jobs waiting to be claimed.
    pub pending: u64,
    /// Jobs currently executing.
    pub running: u64,
    /// Jobs finished successfully.
    pub completed: u64,
    /// Jobs in FAILED state (dismissed included).
    pub failed: u64,
    /// FAILED jobs visible in the dead-letter listing.
    pub dead_letter: u64,
}

/// The job store contract.
///
/// `transition` is the sole mutation primitive for lifecycle state: it
/// compare-and-sets against the transition's expected current status, so
/// two workers can never both claim the same job and a duplicate completion
/// callback cannot overwrite a terminal row.
///
/// All tenant-scoped reads report a job owned by another tenant as absent,
/// never as forbidden.
#[async_trait]
pub trait JobRepository: Interface + Send + Sync {
    /// Creates a PENDING job.
    ///
    /// # Errors
    ///
    /// Returns [`beacon_core::BeaconError::Conflict`] when a live job with
    /// the same (tenant, project, type, idempotency key) already exists.
    async fn create(&self, new_job: NewJob) -> BeaconResult<Job>;

    /// Atomically creates a PENDING job or fetches the live job holding the
    /// same idempotency tuple.
    async fn reserve(&self, new_job: NewJob) -> BeaconResult<Reservation>;

    /// Finds a job by id, scoped to the tenant.
    async fn find_by_id(&self, id: JobId, tenant_id: TenantId) -> BeaconResult<Option<Job>>;

    /// Returns claimable PENDING jobs in FIFO order (creation time, id as
    /// tiebreak), skipping jobs whose `next_run_at` lies in the future.
    async fn find_pending(&self, limit: usize) -> BeaconResult<Vec<Job>>;

    /// Applies a named transition, verifying the persisted status equals
    /// the transition's expected `from` status in the same atomic step.
    ///
    /// # Errors
    ///
    /// Returns [`beacon_core::BeaconError::InvalidTransition`] when the
    /// persisted status does not match; the row is left unchanged.
    async fn transition(&self, id: JobId, transition: JobTransition) -> BeaconResult<Job>;

    /// Counts PENDING and RUNNING jobs for a tenant.
    async fn count_in_flight(&self, tenant_id: TenantId) -> BeaconResult<u64>;

    /// Lists jobs for a tenant with optional filters, newest first.
    async fn list_by_tenant(
        &self,
        tenant_id: TenantId,
        filter: JobFilter,
        page: PageRequest,
    ) -> BeaconResult<Page<Job>>;

    /// Lists non-dismissed FAILED jobs for a tenant, newest failure first.
    async fn list_dead_letter(&self, tenant_id: TenantId) -> BeaconResult<Vec<Job>>;

    /// Returns RUNNING jobs whose `updated_at` is older than `stale_after`.
    async fn find_stale_running(&self, stale_after: Duration) -> BeaconResult<Vec<Job>>;

    /// Sets the dismissed flag on a FAILED job. The record is retained.
    async fn set_dismissed(
        &self,
        id: JobId,
        tenant_id: TenantId,
        dismissed: bool,
    ) -> BeaconResult<Job>;

    /// Resets the retry counter of a FAILED job without changing status.
    async fn clear_attempts(&self, id: JobId, tenant_id: TenantId) -> BeaconResult<Job>;

    /// Returns per-status job counts for a tenant.
    async fn stats(&self, tenant_id: TenantId) -> BeaconResult<PipelineStats>;
}
