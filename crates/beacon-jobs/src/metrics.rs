//! Prometheus metrics for pipeline monitoring.

use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names for the job pipeline.
pub mod names {
    /// Total jobs submitted (created, not reused).
    pub const JOBS_SUBMITTED_TOTAL: &str = "beacon_jobs_submitted_total";
    /// Total submissions absorbed by an existing live job.
    pub const JOBS_REUSED_TOTAL: &str = "beacon_jobs_reused_total";
    /// Total submissions denied (validation, quota, concurrency).
    pub const JOBS_DENIED_TOTAL: &str = "beacon_jobs_denied_total";
    /// Total jobs claimed by workers.
    pub const JOBS_CLAIMED_TOTAL: &str = "beacon_jobs_claimed_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "beacon_jobs_completed_total";
    /// Total jobs failed.
    pub const JOBS_FAILED_TOTAL: &str = "beacon_jobs_failed_total";
    /// Total jobs timed out.
    pub const JOBS_TIMED_OUT_TOTAL: &str = "beacon_jobs_timed_out_total";
    /// Total jobs retried out of the dead-letter queue.
    pub const JOBS_RETRIED_TOTAL: &str = "beacon_jobs_retried_total";
    /// Total jobs force-failed by the staleness reaper.
    pub const JOBS_REAPED_TOTAL: &str = "beacon_jobs_reaped_total";

    /// Job execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "beacon_job_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::JOBS_SUBMITTED_TOTAL,
        "Total number of jobs submitted"
    );
    describe_counter!(
        names::JOBS_REUSED_TOTAL,
        "Total number of submissions absorbed by an existing live job"
    );
    describe_counter!(
        names::JOBS_DENIED_TOTAL,
        "Total number of denied submissions"
    );
    describe_counter!(
        names::JOBS_CLAIMED_TOTAL,
        "Total number of jobs claimed by workers"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(names::JOBS_FAILED_TOTAL, "Total number of jobs that failed");
    describe_counter!(
        names::JOBS_TIMED_OUT_TOTAL,
        "Total number of jobs that timed out"
    );
    describe_counter!(
        names::JOBS_RETRIED_TOTAL,
        "Total number of jobs retried out of the dead-letter queue"
    );
    describe_counter!(
        names::JOBS_REAPED_TOTAL,
        "Total number of jobs force-failed by the staleness reaper"
    );
    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job execution duration in seconds"
    );
}

/// Records a job execution duration.
pub fn record_job_duration(job_type: &'static str, duration: Duration) {
    histogram!(names::JOB_DURATION_SECONDS, "job_type" => job_type).record(duration.as_secs_f64());
}

/// Increments a counter with a job type label.
pub fn increment(name: &'static str, job_type: &'static str) {
    counter!(name, "job_type" => job_type).increment(1);
}
