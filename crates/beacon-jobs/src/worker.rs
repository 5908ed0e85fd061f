//! Worker pool for claiming and executing jobs.
//!
//! Many pool instances may run in parallel across processes; exclusivity
//! comes solely from the store's compare-and-set claim transition, not from
//! any coordination between instances.

use crate::error::{PipelineError, PipelineResult};
use crate::executor::{ExecutorRegistry, JobContext};
use crate::metrics;
use beacon_config::WorkerConfig;
use beacon_core::{BeaconError, FailureKind, Job, JobFailure, JobTransition};
use beacon_repository::JobRepository;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// How many pending candidates one claim attempt scans. Losing a claim race
/// falls through to the next candidate instead of waiting a poll interval.
const CLAIM_BATCH: usize = 8;

/// Worker pool for concurrent job processing.
pub struct WorkerPool {
    /// Unique pool ID.
    id: String,

    /// Job store.
    repository: Arc<dyn JobRepository>,

    /// Executors keyed by job type.
    executors: Arc<ExecutorRegistry>,

    /// Pool configuration.
    config: WorkerConfig,

    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,

    /// Running flag.
    running: Arc<AtomicBool>,

    /// Jobs processed counter.
    jobs_processed: Arc<AtomicU64>,

    /// Jobs failed counter.
    jobs_failed: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Creates a new worker pool.
    #[must_use]
    pub fn new(
        repository: Arc<dyn JobRepository>,
        executors: Arc<ExecutorRegistry>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            id: format!("worker-pool-{}", Uuid::new_v4()),
            repository,
            executors,
            config,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
            jobs_processed: Arc::new(AtomicU64::new(0)),
            jobs_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs the claim loop until [`stop`](Self::stop) is called.
    pub async fn start(&self) -> PipelineResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::Configuration(
                "Worker pool already running".to_string(),
            ));
        }

        info!(
            pool_id = %self.id,
            concurrency = self.config.concurrency,
            "Starting worker pool"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(pool_id = %self.id, "Received shutdown signal");
                    break;
                }

                permit = semaphore.clone().acquire_owned() => {
                    if let Ok(permit) = permit {
                        let repository = self.repository.clone();
                        let executors = self.executors.clone();
                        let config = self.config.clone();
                        let worker_id = format!("{}-{}", self.id, Uuid::new_v4());
                        let jobs_processed = self.jobs_processed.clone();
                        let jobs_failed = self.jobs_failed.clone();

                        tokio::spawn(async move {
                            match claim_next(&repository).await {
                                Some(job) => {
                                    debug!(
                                        job_id = %job.id,
                                        job_type = %job.job_type,
                                        worker_id = %worker_id,
                                        "Processing job"
                                    );
                                    let failed =
                                        execute_and_finalize(&repository, &executors, &config, job)
                                            .await;
                                    if failed {
                                        jobs_failed.fetch_add(1, Ordering::Relaxed);
                                    } else {
                                        jobs_processed.fetch_add(1, Ordering::Relaxed);
                                    }
                                }
                                None => {
                                    // No claimable job this tick.
                                }
                            }

                            drop(permit);
                        }.instrument(tracing::info_span!("worker")));
                    }
                }
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }

        info!(pool_id = %self.id, "Waiting for workers to finish...");
        let _ = timeout(self.config.shutdown_timeout(), async {
            while semaphore.available_permits() < self.config.concurrency {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        self.running.store(false, Ordering::SeqCst);

        info!(
            pool_id = %self.id,
            processed = self.jobs_processed.load(Ordering::Relaxed),
            failed = self.jobs_failed.load(Ordering::Relaxed),
            "Worker pool stopped"
        );

        Ok(())
    }

    /// Signals the pool to stop after in-flight jobs drain.
    pub fn stop(&self) {
        info!(pool_id = %self.id, "Stopping worker pool...");
        let _ = self.shutdown_tx.send(());
    }

    /// Checks if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of jobs that completed successfully.
    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Number of jobs that ended FAILED.
    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// The pool ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Pool statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            concurrency: self.config.concurrency,
            jobs_processed: self.jobs_processed(),
            jobs_failed: self.jobs_failed(),
        }
    }
}

/// Worker pool statistics.
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    /// Pool ID.
    pub id: String,
    /// Is running.
    pub running: bool,
    /// Configured concurrency.
    pub concurrency: usize,
    /// Jobs processed.
    pub jobs_processed: u64,
    /// Jobs failed.
    pub jobs_failed: u64,
}

/// Claims the oldest claimable PENDING job.
///
/// A lost claim race (another instance won the compare-and-set) moves on to
/// the next candidate; any other store error ends the attempt.
async fn claim_next(repository: &Arc<dyn JobRepository>) -> Option<Job> {
    let candidates = match repository.find_pending(CLAIM_BATCH).await {
        Ok(candidates) => candidates,
        Err(e) => {
            error!(error = %e, "Failed to query pending jobs");
            return None;
        }
    };

    for candidate in candidates {
        match repository.transition(candidate.id, JobTransition::Claim).await {
            Ok(job) => {
                metrics::increment(metrics::names::JOBS_CLAIMED_TOTAL, job.job_type.as_str());
                return Some(job);
            }
            Err(BeaconError::InvalidTransition { .. }) => {
                // another worker won this job
                continue;
            }
            Err(BeaconError::NotFound { .. }) => continue,
            Err(e) => {
                error!(job_id = %candidate.id, error = %e, "Claim failed");
                return None;
            }
        }
    }

    None
}

/// Executes a claimed job and records its outcome. Returns true when the
/// job ended FAILED.
async fn execute_and_finalize(
    repository: &Arc<dyn JobRepository>,
    executors: &Arc<ExecutorRegistry>,
    config: &WorkerConfig,
    job: Job,
) -> bool {
    let job_timeout = config.timeout_for(job.job_type);
    let started = Instant::now();

    let ctx = JobContext {
        job_id: job.id,
        tenant_id: job.tenant_id,
        project_id: job.project_id,
        job_type: job.job_type,
        attempt: job.retry.attempts + 1,
        timeout: job_timeout,
    };

    let outcome = run_executor(executors, ctx, job.payload.clone(), job_timeout).await;

    metrics::record_job_duration(job.job_type.as_str(), started.elapsed());

    match outcome {
        Ok(result_summary) => {
            debug!(job_id = %job.id, "Job completed successfully");
            metrics::increment(metrics::names::JOBS_COMPLETED_TOTAL, job.job_type.as_str());
            if let Err(e) = repository
                .transition(job.id, JobTransition::Complete { result_summary })
                .await
            {
                error!(job_id = %job.id, error = %e, "Failed to record job completion");
            }
            false
        }
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "Job execution failed");
            if matches!(e, PipelineError::Timeout(_)) {
                metrics::increment(metrics::names::JOBS_TIMED_OUT_TOTAL, job.job_type.as_str());
            }
            metrics::increment(metrics::names::JOBS_FAILED_TOTAL, job.job_type.as_str());
            let failure = failure_from_error(&e);
            if let Err(e) = repository
                .transition(job.id, JobTransition::Fail { error: failure })
                .await
            {
                error!(job_id = %job.id, error = %e, "Failed to record job failure");
            }
            true
        }
    }
}

/// Runs the executor for a job under its timeout, isolating panics.
async fn run_executor(
    executors: &Arc<ExecutorRegistry>,
    ctx: JobContext,
    payload: serde_json::Value,
    job_timeout: Duration,
) -> PipelineResult<String> {
    let Some(executor) = executors.get(ctx.job_type) else {
        return Err(PipelineError::Configuration(format!(
            "No executor registered for job type: {}",
            ctx.job_type
        )));
    };

    // Executed on its own task so a panicking executor is contained and
    // surfaces as a failure instead of taking the worker down.
    let mut handle = tokio::spawn(async move { executor.execute(&ctx, &payload).await });

    match timeout(job_timeout, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(PipelineError::Executor(format!(
            "executor panicked: {join_error}"
        ))),
        Err(_) => {
            handle.abort();
            Err(PipelineError::Timeout(job_timeout.as_secs()))
        }
    }
}

/// Converts an execution error into the failure record stored on the job.
fn failure_from_error(error: &PipelineError) -> JobFailure {
    match error {
        PipelineError::Timeout(secs) => JobFailure::timeout(*secs),
        PipelineError::Configuration(message) => {
            JobFailure::new(FailureKind::Validation, message.clone())
        }
        other => JobFailure::executor(other.to_string()),
    }
}
