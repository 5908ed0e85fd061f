//! Staleness reaper for jobs orphaned by dead workers.
//!
//! A RUNNING job whose worker died would otherwise stay RUNNING forever and
//! invisibly block its idempotency slot. The reaper force-fails such jobs
//! so they surface in the dead-letter queue and become retry-eligible.

use crate::error::PipelineResult;
use crate::metrics;
use beacon_config::ReaperConfig;
use beacon_core::{BeaconError, JobFailure, JobTransition};
use beacon_repository::JobRepository;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Periodic sweep that force-fails stale RUNNING jobs.
pub struct StaleJobReaper {
    repository: Arc<dyn JobRepository>,
    config: ReaperConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl StaleJobReaper {
    /// Creates a new reaper.
    #[must_use]
    pub fn new(repository: Arc<dyn JobRepository>, config: ReaperConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            repository,
            config,
            shutdown_tx,
        }
    }

    /// Runs sweeps on the configured interval until [`stop`](Self::stop).
    pub async fn run(&self) {
        info!(
            stale_after_secs = self.config.stale_after_secs,
            sweep_interval_secs = self.config.sweep_interval_secs,
            "Starting stale job reaper"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Stale job reaper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Reaper sweep failed");
                    }
                }
            }
        }
    }

    /// Performs one sweep. Returns the number of jobs reaped.
    pub async fn sweep(&self) -> PipelineResult<u64> {
        let stale = self
            .repository
            .find_stale_running(self.config.stale_after())
            .await?;

        let mut reaped = 0u64;
        for job in stale {
            match self
                .repository
                .transition(
                    job.id,
                    JobTransition::Fail {
                        error: JobFailure::stale_worker(),
                    },
                )
                .await
            {
                Ok(_) => {
                    warn!(
                        job_id = %job.id,
                        tenant_id = %job.tenant_id,
                        updated_at = %job.updated_at,
                        "Reaped stale running job"
                    );
                    metrics::increment(metrics::names::JOBS_REAPED_TOTAL, job.job_type.as_str());
                    reaped += 1;
                }
                // the job finished in the window between query and sweep
                Err(BeaconError::InvalidTransition { .. }) => {
                    debug!(job_id = %job.id, "Job finished before reaping");
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to reap stale job");
                }
            }
        }

        if reaped > 0 {
            info!(count = reaped, "Reaped stale jobs");
        }

        Ok(reaped)
    }

    /// Signals the reaper loop to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{FailureKind, JobStatus, JobType, ProjectId, TenantId, UserId};
    use beacon_repository::{InMemoryJobRepository, NewJob};
    use serde_json::json;
    use std::time::Duration;

    fn reaper_over(
        repository: Arc<InMemoryJobRepository>,
        stale_after_secs: u64,
    ) -> StaleJobReaper {
        StaleJobReaper::new(
            repository,
            ReaperConfig {
                stale_after_secs,
                sweep_interval_secs: 1,
            },
        )
    }

    async fn running_job(repository: &Arc<InMemoryJobRepository>) -> (TenantId, beacon_core::Job) {
        let tenant = TenantId::new();
        let job = repository
            .create(NewJob {
                tenant_id: tenant,
                owner_id: UserId::new(),
                project_id: ProjectId::new(),
                job_type: JobType::Research,
                idempotency_key: "k1".to_string(),
                payload: json!({}),
            })
            .await
            .unwrap();
        let claimed = repository
            .transition(job.id, JobTransition::Claim)
            .await
            .unwrap();
        (tenant, claimed)
    }

    #[tokio::test]
    async fn test_sweep_reaps_stale_running_job() {
        let repository = Arc::new(InMemoryJobRepository::new());
        let (tenant, job) = running_job(&repository).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
        let reaper = reaper_over(repository.clone(), 0);

        let reaped = reaper.sweep().await.unwrap();
        assert_eq!(reaped, 1);

        let failed = repository
            .find_by_id(job.id, tenant)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.unwrap().kind, FailureKind::StaleWorker);

        // reaped jobs surface in the dead-letter queue
        assert_eq!(repository.list_dead_letter(tenant).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_leaves_fresh_jobs_alone() {
        let repository = Arc::new(InMemoryJobRepository::new());
        let (tenant, job) = running_job(&repository).await;

        let reaper = reaper_over(repository.clone(), 3600);
        assert_eq!(reaper.sweep().await.unwrap(), 0);

        let unchanged = repository
            .find_by_id(job.id, tenant)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_sweep_ignores_pending_and_terminal_jobs() {
        let repository = Arc::new(InMemoryJobRepository::new());
        let tenant = TenantId::new();
        repository
            .create(NewJob {
                tenant_id: tenant,
                owner_id: UserId::new(),
                project_id: ProjectId::new(),
                job_type: JobType::Research,
                idempotency_key: "k1".to_string(),
                payload: json!({}),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let reaper = reaper_over(repository.clone(), 0);
        assert_eq!(reaper.sweep().await.unwrap(), 0);
    }
}
