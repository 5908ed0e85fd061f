//! In-memory job repository implementation.
//!
//! Holds all rows behind a single lock, so the create-or-fetch reservation
//! and the compare-and-set transition are strictly atomic. Used by pipeline
//! unit tests and embedded development setups.

use crate::traits::{JobFilter, JobRepository, NewJob, PipelineStats, Reservation};
use async_trait::async_trait;
use beacon_core::{
    BeaconError, BeaconResult, Job, JobId, JobStatus, JobTransition, Page, PageRequest, TenantId,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// In-memory job repository.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn find_live_locked(&self, jobs: &HashMap<JobId, Job>, new_job: &NewJob) -> Option<Job> {
        jobs.values()
            .find(|job| {
                job.is_in_flight()
                    && job.tenant_id == new_job.tenant_id
                    && job.project_id == new_job.project_id
                    && job.job_type == new_job.job_type
                    && job.idempotency_key == new_job.idempotency_key
            })
            .cloned()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, new_job: NewJob) -> BeaconResult<Job> {
        let mut jobs = self.jobs.write();

        if self.find_live_locked(&jobs, &new_job).is_some() {
            return Err(BeaconError::conflict(format!(
                "Live job already exists for idempotency key {}",
                new_job.idempotency_key
            )));
        }

        let job = new_job.into_job();
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn reserve(&self, new_job: NewJob) -> BeaconResult<Reservation> {
        let mut jobs = self.jobs.write();

        if let Some(existing) = self.find_live_locked(&jobs, &new_job) {
            return Ok(Reservation::Reused(existing));
        }

        let job = new_job.into_job();
        jobs.insert(job.id, job.clone());
        Ok(Reservation::Created(job))
    }

    async fn find_by_id(&self, id: JobId, tenant_id: TenantId) -> BeaconResult<Option<Job>> {
        let jobs = self.jobs.read();
        Ok(jobs
            .get(&id)
            .filter(|job| job.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_pending(&self, limit: usize) -> BeaconResult<Vec<Job>> {
        let now = Utc::now();
        let jobs = self.jobs.read();

        let mut pending: Vec<Job> = jobs
            .values()
            .filter(|job| {
                job.status == JobStatus::Pending
                    && job.retry.next_run_at.map_or(true, |at| at <= now)
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn transition(&self, id: JobId, transition: JobTransition) -> BeaconResult<Job> {
        let mut jobs = self.jobs.write();

        // Retrying into an occupied idempotency slot would violate the
        // live-uniqueness constraint, same as the SQL unique index.
        if matches!(transition, JobTransition::Retry) {
            let target = jobs
                .get(&id)
                .ok_or_else(|| BeaconError::not_found("Job", id))?;
            let occupied = jobs.values().any(|other| {
                other.id != id
                    && other.is_in_flight()
                    && other.tenant_id == target.tenant_id
                    && other.project_id == target.project_id
                    && other.job_type == target.job_type
                    && other.idempotency_key == target.idempotency_key
            });
            if occupied {
                return Err(BeaconError::conflict(format!(
                    "Live job already exists for idempotency key {}",
                    target.idempotency_key
                )));
            }
        }

        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| BeaconError::not_found("Job", id))?;
        job.apply(&transition)?;
        Ok(job.clone())
    }

    async fn count_in_flight(&self, tenant_id: TenantId) -> BeaconResult<u64> {
        let jobs = self.jobs.read();
        Ok(jobs
            .values()
            .filter(|job| job.tenant_id == tenant_id && job.is_in_flight())
            .count() as u64)
    }

    async fn list_by_tenant(
        &self,
        tenant_id: TenantId,
        filter: JobFilter,
        page: PageRequest,
    ) -> BeaconResult<Page<Job>> {
        let jobs = self.jobs.read();

        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|job| {
                job.tenant_id == tenant_id
                    && filter.status.map_or(true, |s| job.status == s)
                    && filter.job_type.map_or(true, |t| job.job_type == t)
                    && filter.project_id.map_or(true, |p| job.project_id == p)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.0.cmp(&a.id.0))
        });

        let total = matching.len() as u64;
        let content: Vec<Job> = matching
            .into_iter()
            .skip(page.offset())
            .take(page.limit())
            .collect();

        Ok(Page::new(content, page, total))
    }

    async fn list_dead_letter(&self, tenant_id: TenantId) -> BeaconResult<Vec<Job>> {
        let jobs = self.jobs.read();

        let mut failed: Vec<Job> = jobs
            .values()
            .filter(|job| job.tenant_id == tenant_id && job.is_dead_letter())
            .cloned()
            .collect();
        failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(failed)
    }

    async fn find_stale_running(&self, stale_after: Duration) -> BeaconResult<Vec<Job>> {
        let threshold = Utc::now()
            - chrono::Duration::from_std(stale_after)
                .map_err(|e| BeaconError::Internal(format!("Invalid staleness threshold: {e}")))?;
        let jobs = self.jobs.read();

        let mut stale: Vec<Job> = jobs
            .values()
            .filter(|job| job.status == JobStatus::Running && job.updated_at < threshold)
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(stale)
    }

    async fn set_dismissed(
        &self,
        id: JobId,
        tenant_id: TenantId,
        dismissed: bool,
    ) -> BeaconResult<Job> {
        let mut jobs = self.jobs.write();

        let job = jobs
            .get_mut(&id)
            .filter(|job| job.tenant_id == tenant_id)
            .ok_or_else(|| BeaconError::not_found("Job", id))?;

        if job.status != JobStatus::Failed {
            return Err(BeaconError::conflict(format!(
                "Job {} is {}, not failed",
                id, job.status
            )));
        }

        let now = Utc::now();
        job.retry.dismissed = dismissed;
        job.retry.dismissed_at = dismissed.then_some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn clear_attempts(&self, id: JobId, tenant_id: TenantId) -> BeaconResult<Job> {
        let mut jobs = self.jobs.write();

        let job = jobs
            .get_mut(&id)
            .filter(|job| job.tenant_id == tenant_id)
            .ok_or_else(|| BeaconError::not_found("Job", id))?;

        if job.status != JobStatus::Failed {
            return Err(BeaconError::conflict(format!(
                "Job {} is {}, not failed",
                id, job.status
            )));
        }

        job.retry.attempts = 0;
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    async fn stats(&self, tenant_id: TenantId) -> BeaconResult<PipelineStats> {
        let jobs = self.jobs.read();

        let mut stats = PipelineStats::default();
        for job in jobs.values().filter(|job| job.tenant_id == tenant_id) {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => {
                    stats.failed += 1;
                    if !job.retry.dismissed {
                        stats.dead_letter += 1;
                    }
                }
            }
        }
        Ok(stats)
    }
}
