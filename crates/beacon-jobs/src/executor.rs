//! Pluggable job execution.
//!
//! The pipeline holds no knowledge of what work a job performs; the
//! surrounding application supplies one [`JobExecutor`] per job type, keyed
//! through an [`ExecutorRegistry`] built once at process start and passed
//! by reference into the worker pool.

use crate::error::PipelineResult;
use async_trait::async_trait;
use beacon_core::{JobId, JobType, ProjectId, TenantId};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Execution context handed to an executor alongside the payload.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job being executed.
    pub job_id: JobId,

    /// Tenant the job belongs to.
    pub tenant_id: TenantId,

    /// Project the job operates on.
    pub project_id: ProjectId,

    /// Job kind.
    pub job_type: JobType,

    /// Execution attempt number (1-based).
    pub attempt: u32,

    /// Budget for this execution; the worker enforces it.
    pub timeout: Duration,
}

/// A capability that performs the actual work of one job type.
///
/// On success the returned string becomes the job's result summary. Errors
/// are stored verbatim on the job; the worker loop converts them to a
/// FAILED transition and never propagates them further.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Executes the job.
    async fn execute(&self, ctx: &JobContext, payload: &JsonValue) -> PipelineResult<String>;
}

/// Registry of executors keyed by job type.
///
/// Built once at startup; immutable afterwards, so worker tasks share it
/// without locking.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the executor for a job type, replacing any previous one.
    pub fn register(&mut self, job_type: JobType, executor: Arc<dyn JobExecutor>) {
        tracing::info!(job_type = %job_type, "Registered job executor");
        self.executors.insert(job_type, executor);
    }

    /// Registers an executor, builder style.
    #[must_use]
    pub fn with(mut self, job_type: JobType, executor: Arc<dyn JobExecutor>) -> Self {
        self.register(job_type, executor);
        self
    }

    /// Returns the executor for a job type.
    #[must_use]
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(&job_type).cloned()
    }

    /// Job types with a registered executor.
    #[must_use]
    pub fn registered_types(&self) -> Vec<JobType> {
        self.executors.keys().copied().collect()
    }
}
