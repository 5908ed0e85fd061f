//! Submission dispatcher.
//!
//! `submit` runs the admission gates in order: shape validation, caller
//! identity, project ownership, quota, concurrency, idempotency. Every gate
//! fails closed; the only side effect a denied submission can leave behind
//! is an audit record, because the quota reservation taken at the quota
//! gate is compensated whenever a later gate denies or an existing job
//! absorbs the submission.

use crate::collaborators::{
    AuditEvent, AuditSink, CallerIdentity, CallerResolver, Ownership, OwnershipVerifier,
    QuotaDecision, QuotaService,
};
use crate::dto::{JobStatusView, SubmitRequest, Submission};
use crate::error::{PipelineError, PipelineResult};
use crate::limiter::{Admission, ConcurrencyLimiter};
use crate::metrics;
use beacon_core::{JobId, JobTransition, JobType, TenantId, ValidateExt};
use beacon_repository::{JobRepository, NewJob, Reservation};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Quota metric name for a job type.
#[must_use]
pub fn quota_metric(job_type: JobType) -> String {
    format!("{}_jobs", job_type)
}

/// Validates, admits, and persists job submissions.
pub struct Dispatcher {
    repository: Arc<dyn JobRepository>,
    caller_resolver: Arc<dyn CallerResolver>,
    ownership: Arc<dyn OwnershipVerifier>,
    quota: Arc<dyn QuotaService>,
    limiter: ConcurrencyLimiter,
    audit: Arc<dyn AuditSink>,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    #[must_use]
    pub fn new(
        repository: Arc<dyn JobRepository>,
        caller_resolver: Arc<dyn CallerResolver>,
        ownership: Arc<dyn OwnershipVerifier>,
        quota: Arc<dyn QuotaService>,
        limiter: ConcurrencyLimiter,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            repository,
            caller_resolver,
            ownership,
            quota,
            limiter,
            audit,
        }
    }

    /// Submits a job.
    ///
    /// Returns the handling job's id; a duplicate submission returns the
    /// existing live job with `reused` set instead of an error.
    pub async fn submit(&self, request: SubmitRequest) -> PipelineResult<Submission> {
        // Gate 1: shape validation, nothing mutated yet.
        if let Err(e) = request.validate_request() {
            self.audit
                .emit(AuditEvent::new("job.submit", false).with_detail(e.to_string()))
                .await;
            return Err(e.into());
        }

        // Gate 2: identity and ownership.
        let caller = match self.caller_resolver.resolve_caller(&request).await? {
            Some(caller) => caller,
            None => {
                self.audit
                    .emit(AuditEvent::new("job.submit", false).with_detail("unresolved caller"))
                    .await;
                return Err(PipelineError::Unauthorized(
                    "caller identity could not be resolved".into(),
                ));
            }
        };

        match self
            .ownership
            .owner_of(caller.tenant_id, request.project_id)
            .await?
        {
            Ownership::Allowed => {}
            Ownership::NotFound => {
                self.audit_outcome(&caller, None, false, "project not owned")
                    .await;
                return Err(PipelineError::NotFound {
                    resource_type: "Project",
                    id: request.project_id.to_string(),
                });
            }
        }

        // Gate 3: quota.
        let metric = quota_metric(request.job_type);
        let period_key = match self
            .quota
            .reserve_quota(caller.tenant_id, &metric, 1)
            .await?
        {
            QuotaDecision::Reserved { period_key } => period_key,
            QuotaDecision::Exceeded { limit, used } => {
                metrics::increment(metrics::names::JOBS_DENIED_TOTAL, request.job_type.as_str());
                self.audit_outcome(&caller, None, false, "quota exceeded").await;
                return Err(PipelineError::QuotaExceeded {
                    metric,
                    limit,
                    used,
                });
            }
        };

        // Gate 4: concurrency. Denial compensates the reservation above so
        // a denied submission is net-zero on quota.
        match self.limiter.try_acquire(caller.tenant_id).await {
            Ok(Admission::Allowed) => {}
            Ok(Admission::Denied { limit }) => {
                self.quota
                    .rollback_quota(caller.tenant_id, &period_key, &metric, 1)
                    .await;
                metrics::increment(metrics::names::JOBS_DENIED_TOTAL, request.job_type.as_str());
                self.audit_outcome(&caller, None, false, "concurrency denied")
                    .await;
                return Err(PipelineError::ConcurrencyDenied { limit });
            }
            Err(e) => {
                self.quota
                    .rollback_quota(caller.tenant_id, &period_key, &metric, 1)
                    .await;
                return Err(e);
            }
        }

        // Gate 5: idempotency reservation and persistence.
        let new_job = NewJob {
            tenant_id: caller.tenant_id,
            owner_id: caller.user_id,
            project_id: request.project_id,
            job_type: request.job_type,
            idempotency_key: request.idempotency_key.clone(),
            payload: request.payload.clone(),
        };

        let reservation = match self.repository.reserve(new_job).await {
            Ok(reservation) => reservation,
            Err(e) => {
                self.quota
                    .rollback_quota(caller.tenant_id, &period_key, &metric, 1)
                    .await;
                return Err(e.into());
            }
        };

        let submission = match reservation {
            Reservation::Created(job) => {
                info!(
                    job_id = %job.id,
                    tenant_id = %caller.tenant_id,
                    job_type = %job.job_type,
                    "Job submitted"
                );
                metrics::increment(
                    metrics::names::JOBS_SUBMITTED_TOTAL,
                    request.job_type.as_str(),
                );
                Submission {
                    job_id: job.id,
                    accepted: true,
                    reused: false,
                }
            }
            Reservation::Reused(job) => {
                // the original submission already paid for this job
                self.quota
                    .rollback_quota(caller.tenant_id, &period_key, &metric, 1)
                    .await;
                debug!(
                    job_id = %job.id,
                    tenant_id = %caller.tenant_id,
                    "Duplicate submission absorbed by live job"
                );
                metrics::increment(
                    metrics::names::JOBS_REUSED_TOTAL,
                    request.job_type.as_str(),
                );
                Submission {
                    job_id: job.id,
                    accepted: true,
                    reused: true,
                }
            }
        };

        self.audit_outcome(&caller, Some(submission.job_id), true, "accepted")
            .await;

        Ok(submission)
    }

    /// Returns the status view of a job, scoped to the tenant.
    pub async fn get_status(
        &self,
        job_id: JobId,
        tenant_id: TenantId,
    ) -> PipelineResult<JobStatusView> {
        let job = self
            .repository
            .find_by_id(job_id, tenant_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound {
                resource_type: "Job",
                id: job_id.to_string(),
            })?;

        Ok(JobStatusView::from(job))
    }

    /// Cancels a PENDING job.
    ///
    /// A job that already started is not signalled; cancellation only
    /// applies before a worker claims it.
    pub async fn cancel(
        &self,
        job_id: JobId,
        tenant_id: TenantId,
        reason: impl Into<String>,
    ) -> PipelineResult<JobStatusView> {
        let job = self
            .repository
            .find_by_id(job_id, tenant_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound {
                resource_type: "Job",
                id: job_id.to_string(),
            })?;

        let cancelled = self
            .repository
            .transition(
                job.id,
                JobTransition::Cancel {
                    reason: reason.into(),
                },
            )
            .await?;

        warn!(job_id = %job_id, tenant_id = %tenant_id, "Job cancelled");

        self.audit
            .emit(
                AuditEvent::new("job.cancel", true)
                    .with_job(job_id)
                    .with_detail(cancelled.error.as_ref().map(|e| e.message.clone()).unwrap_or_default()),
            )
            .await;

        Ok(JobStatusView::from(cancelled))
    }

    async fn audit_outcome(
        &self,
        caller: &CallerIdentity,
        job_id: Option<JobId>,
        success: bool,
        detail: &str,
    ) {
        let mut event = AuditEvent::new("job.submit", success)
            .with_caller(caller)
            .with_detail(detail);
        event.job_id = job_id;
        self.audit.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockCallerResolver, MockOwnershipVerifier, TracingAuditSink};
    use async_trait::async_trait;
    use beacon_config::LimitsConfig;
    use beacon_core::{FailureKind, JobStatus, ProjectId, UserId};
    use beacon_repository::InMemoryJobRepository;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Quota stub tracking net usage, so compensation is observable.
    struct CountingQuota {
        limit: u64,
        used: AtomicU64,
    }

    impl CountingQuota {
        fn new(limit: u64) -> Self {
            Self {
                limit,
                used: AtomicU64::new(0),
            }
        }

        fn used(&self) -> u64 {
            self.used.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuotaService for CountingQuota {
        async fn reserve_quota(
            &self,
            _tenant_id: TenantId,
            _metric: &str,
            amount: u64,
        ) -> PipelineResult<QuotaDecision> {
            let used = self.used.load(Ordering::SeqCst);
            if used + amount > self.limit {
                return Ok(QuotaDecision::Exceeded {
                    limit: self.limit,
                    used,
                });
            }
            self.used.fetch_add(amount, Ordering::SeqCst);
            Ok(QuotaDecision::Reserved {
                period_key: "2026-08".to_string(),
            })
        }

        async fn rollback_quota(
            &self,
            _tenant_id: TenantId,
            _period_key: &str,
            _metric: &str,
            amount: u64,
        ) {
            self.used.fetch_sub(amount, Ordering::SeqCst);
        }
    }

    struct Harness {
        repository: Arc<InMemoryJobRepository>,
        quota: Arc<CountingQuota>,
        dispatcher: Dispatcher,
        caller: CallerIdentity,
    }

    fn harness(max_in_flight: u64, quota_limit: u64) -> Harness {
        let caller = CallerIdentity {
            tenant_id: TenantId::new(),
            user_id: UserId::new(),
        };

        let mut resolver = MockCallerResolver::new();
        resolver
            .expect_resolve_caller()
            .returning(move |_| Ok(Some(caller)));

        let mut ownership = MockOwnershipVerifier::new();
        ownership
            .expect_owner_of()
            .returning(|_, _| Ok(Ownership::Allowed));

        harness_with(max_in_flight, quota_limit, resolver, ownership, caller)
    }

    fn harness_with(
        max_in_flight: u64,
        quota_limit: u64,
        resolver: MockCallerResolver,
        ownership: MockOwnershipVerifier,
        caller: CallerIdentity,
    ) -> Harness {
        let repository = Arc::new(InMemoryJobRepository::new());
        let quota = Arc::new(CountingQuota::new(quota_limit));
        let limiter = ConcurrencyLimiter::new(
            repository.clone(),
            &LimitsConfig {
                max_in_flight_per_tenant: max_in_flight,
            },
        );
        let dispatcher = Dispatcher::new(
            repository.clone(),
            Arc::new(resolver),
            Arc::new(ownership),
            quota.clone(),
            limiter,
            Arc::new(TracingAuditSink),
        );

        Harness {
            repository,
            quota,
            dispatcher,
            caller,
        }
    }

    fn request(key: &str) -> SubmitRequest {
        SubmitRequest {
            credential: "token-abc".to_string(),
            project_id: ProjectId::from_uuid(uuid::Uuid::from_u128(42)),
            job_type: JobType::Research,
            idempotency_key: key.to_string(),
            payload: json!({"query": "market sizing"}),
        }
    }

    async fn fill_in_flight(h: &Harness, count: usize) {
        for i in 0..count {
            h.repository
                .create(beacon_repository::NewJob {
                    tenant_id: h.caller.tenant_id,
                    owner_id: h.caller.user_id,
                    project_id: ProjectId::new(),
                    job_type: JobType::Analysis,
                    idempotency_key: format!("fill-{i}"),
                    payload: json!({}),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job() {
        let h = harness(5, 10);

        let submission = h.dispatcher.submit(request("k1")).await.unwrap();
        assert!(submission.accepted);
        assert!(!submission.reused);

        let job = h
            .repository
            .find_by_id(submission.job_id, h.caller.tenant_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.owner_id, h.caller.user_id);
        assert_eq!(h.quota.used(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_mutates_nothing() {
        // unconfigured mocks panic if called, so a validation failure must
        // return before identity resolution
        let caller = CallerIdentity {
            tenant_id: TenantId::new(),
            user_id: UserId::new(),
        };
        let h = harness_with(
            5,
            10,
            MockCallerResolver::new(),
            MockOwnershipVerifier::new(),
            caller,
        );

        let mut bad = request("k1");
        bad.idempotency_key = String::new();

        let err = h.dispatcher.submit(bad).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(h.quota.used(), 0);
        assert_eq!(
            h.repository
                .count_in_flight(h.caller.tenant_id)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_unresolved_caller_is_unauthorized() {
        let caller = CallerIdentity {
            tenant_id: TenantId::new(),
            user_id: UserId::new(),
        };
        let mut resolver = MockCallerResolver::new();
        resolver.expect_resolve_caller().returning(|_| Ok(None));

        let h = harness_with(5, 10, resolver, MockOwnershipVerifier::new(), caller);

        let err = h.dispatcher.submit(request("k1")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized(_)));
        assert_eq!(h.quota.used(), 0);
    }

    #[tokio::test]
    async fn test_unowned_project_reports_not_found() {
        let caller = CallerIdentity {
            tenant_id: TenantId::new(),
            user_id: UserId::new(),
        };
        let mut resolver = MockCallerResolver::new();
        resolver
            .expect_resolve_caller()
            .returning(move |_| Ok(Some(caller)));
        let mut ownership = MockOwnershipVerifier::new();
        ownership
            .expect_owner_of()
            .returning(|_, _| Ok(Ownership::NotFound));

        let h = harness_with(5, 10, resolver, ownership, caller);

        let err = h.dispatcher.submit(request("k1")).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
        assert_eq!(h.quota.used(), 0);
    }

    #[tokio::test]
    async fn test_quota_exceeded_creates_nothing() {
        let h = harness(5, 0);

        let err = h.dispatcher.submit(request("k1")).await.unwrap_err();
        match err {
            PipelineError::QuotaExceeded {
                metric,
                limit,
                used,
            } => {
                assert_eq!(metric, "research_jobs");
                assert_eq!(limit, 0);
                assert_eq!(used, 0);
            }
            other => panic!("Expected QuotaExceeded, got {other}"),
        }

        assert_eq!(
            h.repository
                .count_in_flight(h.caller.tenant_id)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_concurrency_denial_rolls_back_quota() {
        let h = harness(3, 10);
        fill_in_flight(&h, 3).await;

        let used_before = h.quota.used();
        let err = h.dispatcher.submit(request("k1")).await.unwrap_err();
        assert!(matches!(err, PipelineError::ConcurrencyDenied { limit: 3 }));

        // net-zero on quota, and no fourth job
        assert_eq!(h.quota.used(), used_before);
        assert_eq!(
            h.repository
                .count_in_flight(h.caller.tenant_id)
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_duplicate_submission_returns_same_job() {
        let h = harness(5, 10);

        let first = h.dispatcher.submit(request("k1")).await.unwrap();
        let second = h.dispatcher.submit(request("k1")).await.unwrap();

        assert_eq!(first.job_id, second.job_id);
        assert!(!first.reused);
        assert!(second.reused);

        // the absorbed duplicate does not consume quota
        assert_eq!(h.quota.used(), 1);
        assert_eq!(
            h.repository
                .count_in_flight(h.caller.tenant_id)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_submissions_share_one_job() {
        let h = harness(10, 10);
        let dispatcher = &h.dispatcher;

        let (a, b) = tokio::join!(
            dispatcher.submit(request("k1")),
            dispatcher.submit(request("k1")),
        );
        let a = a.unwrap();
        let b = b.unwrap();

        assert_eq!(a.job_id, b.job_id);
        assert!(a.reused != b.reused);
        assert_eq!(
            h.repository
                .count_in_flight(h.caller.tenant_id)
                .await
                .unwrap(),
            1
        );
        assert_eq!(h.quota.used(), 1);
    }

    #[tokio::test]
    async fn test_get_status_cross_tenant_is_not_found() {
        let h = harness(5, 10);
        let submission = h.dispatcher.submit(request("k1")).await.unwrap();

        let err = h
            .dispatcher
            .get_status(submission.job_id, TenantId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let h = harness(5, 10);
        let submission = h.dispatcher.submit(request("k1")).await.unwrap();

        let view = h
            .dispatcher
            .cancel(submission.job_id, h.caller.tenant_id, "superseded")
            .await
            .unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error.unwrap().kind, FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_running_job_is_invalid() {
        let h = harness(5, 10);
        let submission = h.dispatcher.submit(request("k1")).await.unwrap();
        h.repository
            .transition(submission.job_id, JobTransition::Claim)
            .await
            .unwrap();

        let err = h
            .dispatcher
            .cancel(submission.job_id, h.caller.tenant_id, "too late")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
    }
}
