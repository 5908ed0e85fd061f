//! Interfaces to the surrounding application.
//!
//! Authentication, ownership, billing, and audit live outside the pipeline;
//! the dispatcher consumes them through these traits so the pipeline itself
//! stays free of web and billing concerns.

use crate::dto::SubmitRequest;
use crate::error::PipelineResult;
use async_trait::async_trait;
use beacon_core::{Interface, JobId, ProjectId, TenantId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Identity of the submitting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Tenant the caller acts for.
    pub tenant_id: TenantId,
    /// The authenticated user.
    pub user_id: UserId,
}

/// Resolves the submitting caller's identity from request material.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallerResolver: Interface + Send + Sync {
    /// Returns the caller identity, or `None` when the request carries no
    /// resolvable identity.
    async fn resolve_caller(&self, request: &SubmitRequest)
        -> PipelineResult<Option<CallerIdentity>>;
}

/// Outcome of an ownership check.
///
/// A project owned by another tenant reports as `NotFound`; existence is
/// never revealed to non-owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The tenant owns the project.
    Allowed,
    /// Unknown project, or owned by a different tenant.
    NotFound,
}

/// Verifies project ownership for a tenant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OwnershipVerifier: Interface + Send + Sync {
    /// Checks whether `tenant_id` owns `project_id`.
    async fn owner_of(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
    ) -> PipelineResult<Ownership>;
}

/// Outcome of a quota reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Usage was reserved; `period_key` identifies the billing period for
    /// a later rollback.
    Reserved {
        /// Billing period the reservation was booked against.
        period_key: String,
    },
    /// The tenant's plan limit is reached; nothing was reserved.
    Exceeded {
        /// Plan limit for the metric.
        limit: u64,
        /// Usage already consumed.
        used: u64,
    },
}

/// Billing/quota decisions for metered job submission.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuotaService: Interface + Send + Sync {
    /// Reserves `amount` units of `metric` for the tenant.
    async fn reserve_quota(
        &self,
        tenant_id: TenantId,
        metric: &str,
        amount: u64,
    ) -> PipelineResult<QuotaDecision>;

    /// Compensates a reservation taken earlier in the same operation.
    async fn rollback_quota(&self, tenant_id: TenantId, period_key: &str, metric: &str, amount: u64);
}

/// Audit record of a submission or operator action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Tenant the action was performed for, when known.
    pub tenant_id: Option<TenantId>,
    /// User who performed the action, when known.
    pub user_id: Option<UserId>,
    /// Action name, e.g. `job.submit`.
    pub action: String,
    /// Affected job, when one exists.
    pub job_id: Option<JobId>,
    /// Whether the action succeeded.
    pub success: bool,
    /// Additional outcome detail.
    pub detail: Option<String>,
    /// Timestamp of the action.
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Creates a new audit event stamped now.
    #[must_use]
    pub fn new(action: impl Into<String>, success: bool) -> Self {
        Self {
            tenant_id: None,
            user_id: None,
            action: action.into(),
            job_id: None,
            success,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the acting tenant and user.
    #[must_use]
    pub fn with_caller(mut self, caller: &CallerIdentity) -> Self {
        self.tenant_id = Some(caller.tenant_id);
        self.user_id = Some(caller.user_id);
        self
    }

    /// Sets the affected job.
    #[must_use]
    pub fn with_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Sets outcome detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Best-effort audit sink.
///
/// Emission is infallible by contract; implementations swallow their own
/// failures so audit can never fail the operation being audited.
#[async_trait]
pub trait AuditSink: Interface + Send + Sync {
    /// Emits an audit event.
    async fn emit(&self, event: AuditEvent);
}

/// Audit sink that records events to the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, event: AuditEvent) {
        info!(
            action = %event.action,
            tenant_id = ?event.tenant_id,
            user_id = ?event.user_id,
            job_id = ?event.job_id,
            success = event.success,
            detail = ?event.detail,
            "audit"
        );
    }
}
