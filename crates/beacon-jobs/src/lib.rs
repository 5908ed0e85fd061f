//! Beacon Jobs - Durable Background Job Pipeline
//!
//! A store-backed job pipeline with:
//! - Exactly-once enqueue through idempotency keys
//! - Per-tenant concurrency ceilings with quota compensation
//! - A strict status state machine enforced by compare-and-set transitions
//! - Worker pools with per-type execution timeouts
//! - A staleness reaper for jobs orphaned by dead workers
//! - A dead-letter queue with classify-aware bulk retry
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Beacon Jobs Pipeline                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  submit()                                                     │
//! │     │                                                         │
//! │     ▼                                                         │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │ Dispatcher                                            │    │
//! │  │  validate → caller → ownership → quota → concurrency  │    │
//! │  │           → idempotency reservation → PENDING row     │    │
//! │  └───────────────────────┬──────────────────────────────┘    │
//! │                          │                                    │
//! │                          ▼                                    │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │ Job Store (unique live key + CAS transitions)         │    │
//! │  └───────┬───────────────────────────────┬──────────────┘    │
//! │          │ claim (PENDING→RUNNING)       │ sweep             │
//! │          ▼                               ▼                   │
//! │  ┌───────────────────┐          ┌──────────────────┐         │
//! │  │ Worker Pool       │          │ Stale Job Reaper │         │
//! │  │  execute + timeout│          └──────────────────┘         │
//! │  └───────┬───────────┘                                       │
//! │          │                                                   │
//! │   ┌──────┴───────┐                                           │
//! │   ▼              ▼                                           │
//! │ COMPLETED     FAILED ──────► Dead-Letter Manager             │
//! │                              (list / retry / dismiss / bulk) │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_jobs::prelude::*;
//!
//! let repository: Arc<dyn JobRepository> = Arc::new(MySqlJobRepository::new(pool));
//! let executors = Arc::new(
//!     ExecutorRegistry::new().with(JobType::Research, Arc::new(ResearchExecutor::new())),
//! );
//!
//! let limiter = ConcurrencyLimiter::new(repository.clone(), &config.pipeline.limits);
//! let dispatcher = Dispatcher::new(
//!     repository.clone(), caller_resolver, ownership, quota, limiter,
//!     Arc::new(TracingAuditSink),
//! );
//!
//! let pool = WorkerPool::new(repository.clone(), executors, config.pipeline.worker.clone());
//! tokio::spawn(async move { pool.start().await });
//! ```

pub mod classify;
pub mod collaborators;
pub mod dead_letter;
pub mod di;
pub mod dispatcher;
pub mod dto;
pub mod error;
pub mod executor;
pub mod limiter;
pub mod metrics;
pub mod reaper;
pub mod worker;

pub use classify::{FailureClass, FailureClassifier, KeywordClassifier};
pub use collaborators::{
    AuditEvent, AuditSink, CallerIdentity, CallerResolver, Ownership, OwnershipVerifier,
    QuotaDecision, QuotaService, TracingAuditSink,
};
pub use dead_letter::{BulkAction, BulkOutcome, DeadLetterManager};
pub use di::{JobPipeline, JobPipelineInterface};
pub use dispatcher::{quota_metric, Dispatcher};
pub use dto::{FailedJobView, JobStatusView, SubmitRequest, Submission};
pub use error::{PipelineError, PipelineResult};
pub use executor::{ExecutorRegistry, JobContext, JobExecutor};
pub use limiter::{Admission, ConcurrencyLimiter};
pub use metrics::register_metrics;
pub use reaper::StaleJobReaper;
pub use worker::{WorkerPool, WorkerPoolStats};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::classify::{FailureClass, FailureClassifier, KeywordClassifier};
    pub use crate::collaborators::{CallerResolver, OwnershipVerifier, QuotaService, TracingAuditSink};
    pub use crate::dead_letter::{BulkAction, DeadLetterManager};
    pub use crate::di::{JobPipeline, JobPipelineInterface};
    pub use crate::dispatcher::Dispatcher;
    pub use crate::error::{PipelineError, PipelineResult};
    pub use crate::executor::{ExecutorRegistry, JobContext, JobExecutor};
    pub use crate::limiter::ConcurrencyLimiter;
    pub use crate::worker::WorkerPool;
    pub use beacon_core::{Job, JobId, JobStatus, JobType, ProjectId, TenantId, UserId};
    pub use beacon_repository::JobRepository;
}
