//! Per-tenant concurrency limiting.

use crate::error::PipelineResult;
use beacon_config::LimitsConfig;
use beacon_core::TenantId;
use beacon_repository::JobRepository;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a concurrency admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The tenant is below its ceiling.
    Allowed,
    /// The tenant is at its ceiling; the submission must be denied.
    Denied {
        /// The configured ceiling.
        limit: u64,
    },
}

/// Caps simultaneous in-flight jobs per tenant.
///
/// The count and the subsequent insert are not one atomic unit: concurrent
/// submissions for one tenant can overshoot the ceiling by at most the
/// number of racing callers. The in-memory store backend is strictly
/// atomic; the SQL backend accepts this bounded overshoot.
pub struct ConcurrencyLimiter {
    repository: Arc<dyn JobRepository>,
    max_in_flight: u64,
}

impl ConcurrencyLimiter {
    /// Creates a limiter over the given store.
    #[must_use]
    pub fn new(repository: Arc<dyn JobRepository>, limits: &LimitsConfig) -> Self {
        Self {
            repository,
            max_in_flight: limits.max_in_flight_per_tenant,
        }
    }

    /// Checks whether the tenant may admit one more job.
    pub async fn try_acquire(&self, tenant_id: TenantId) -> PipelineResult<Admission> {
        let in_flight = self.repository.count_in_flight(tenant_id).await?;

        if in_flight >= self.max_in_flight {
            debug!(
                tenant_id = %tenant_id,
                in_flight,
                limit = self.max_in_flight,
                "Tenant at in-flight ceiling"
            );
            return Ok(Admission::Denied {
                limit: self.max_in_flight,
            });
        }

        Ok(Admission::Allowed)
    }

    /// The configured ceiling.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.max_in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{JobType, ProjectId, UserId};
    use beacon_repository::{InMemoryJobRepository, NewJob};
    use serde_json::json;

    fn limiter_with(max: u64) -> (Arc<InMemoryJobRepository>, ConcurrencyLimiter) {
        let repository = Arc::new(InMemoryJobRepository::new());
        let limits = LimitsConfig {
            max_in_flight_per_tenant: max,
        };
        let limiter = ConcurrencyLimiter::new(repository.clone(), &limits);
        (repository, limiter)
    }

    #[tokio::test]
    async fn test_allows_below_ceiling() {
        let (_, limiter) = limiter_with(2);
        assert_eq!(
            limiter.try_acquire(TenantId::new()).await.unwrap(),
            Admission::Allowed
        );
    }

    #[tokio::test]
    async fn test_denies_at_ceiling() {
        let (repository, limiter) = limiter_with(2);
        let tenant = TenantId::new();

        for i in 0..2 {
            repository
                .create(NewJob {
                    tenant_id: tenant,
                    owner_id: UserId::new(),
                    project_id: ProjectId::new(),
                    job_type: JobType::Research,
                    idempotency_key: format!("k{i}"),
                    payload: json!({}),
                })
                .await
                .unwrap();
        }

        assert_eq!(
            limiter.try_acquire(tenant).await.unwrap(),
            Admission::Denied { limit: 2 }
        );

        // other tenants are unaffected
        assert_eq!(
            limiter.try_acquire(TenantId::new()).await.unwrap(),
            Admission::Allowed
        );
    }
}
