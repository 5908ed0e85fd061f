//! MySQL job repository implementation.

use crate::pool::DatabasePoolInterface;
use crate::traits::{JobFilter, JobRepository, NewJob, PipelineStats, Reservation};
use async_trait::async_trait;
use beacon_core::{
    BeaconError, BeaconResult, FailureKind, Job, JobFailure, JobId, JobStatus, JobTransition,
    JobType, Page, PageRequest, ProjectId, RetryState, TenantId, UserId,
};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use shaku::Component;
use sqlx::{FromRow, QueryBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// MySQL job repository implementation.
#[derive(Component, Clone)]
#[shaku(interface = JobRepository)]
pub struct MySqlJobRepository {
    #[shaku(inject)]
    pool: Arc<dyn DatabasePoolInterface>,
}

impl MySqlJobRepository {
    /// Creates a new MySQL job repository.
    #[must_use]
    pub fn new(pool: Arc<dyn DatabasePoolInterface>) -> Self {
        Self { pool }
    }

    async fn fetch_unscoped(&self, id: JobId) -> BeaconResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&select_jobs("WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(self.pool.inner())
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn fetch_live(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
        job_type: JobType,
        idempotency_key: &str,
    ) -> BeaconResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&select_jobs(
            "WHERE tenant_id = ? AND project_id = ? AND job_type = ? \
             AND idempotency_key = ? AND live = 1",
        ))
        .bind(tenant_id.to_string())
        .bind(project_id.to_string())
        .bind(job_type.as_str())
        .bind(idempotency_key)
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Job::try_from).transpose()
    }

    /// Maps a zero-row conditional update to the precise error: the row is
    /// either gone or sits in a status the transition does not accept.
    async fn transition_conflict(
        &self,
        id: JobId,
        transition: &JobTransition,
    ) -> BeaconResult<Job> {
        match self.fetch_unscoped(id).await? {
            None => Err(BeaconError::not_found("Job", id)),
            Some(actual) => Err(BeaconError::invalid_transition(
                actual.status,
                transition.target_status(),
            )),
        }
    }
}

/// Database row representation of a job.
#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    tenant_id: String,
    owner_id: String,
    project_id: String,
    job_type: String,
    status: String,
    idempotency_key: String,
    payload: JsonValue,
    result_summary: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
    attempts: u32,
    next_run_at: Option<DateTime<Utc>>,
    dismissed: bool,
    dismissed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const JOB_COLUMNS: &str = "id, tenant_id, owner_id, project_id, job_type, status, \
     idempotency_key, payload, result_summary, error_kind, error_message, \
     attempts, next_run_at, dismissed, dismissed_at, last_error, \
     created_at, updated_at";

fn select_jobs(clause: &str) -> String {
    format!("SELECT {JOB_COLUMNS} FROM jobs {clause}")
}

fn parse_uuid(s: &str) -> BeaconResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| BeaconError::Internal(format!("Invalid UUID in database: {e}")))
}

impl TryFrom<JobRow> for Job {
    type Error = BeaconError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::parse(&row.status).ok_or_else(|| {
            BeaconError::Internal(format!("Unknown job status in database: {}", row.status))
        })?;
        let job_type = JobType::parse(&row.job_type).ok_or_else(|| {
            BeaconError::Internal(format!("Unknown job type in database: {}", row.job_type))
        })?;

        let error = match (row.error_kind.as_deref(), row.error_message) {
            (Some(kind), Some(message)) => {
                let kind = FailureKind::parse(kind).ok_or_else(|| {
                    BeaconError::Internal(format!("Unknown failure kind in database: {kind}"))
                })?;
                Some(JobFailure::new(kind, message))
            }
            _ => None,
        };

        Ok(Job {
            id: JobId::from_uuid(parse_uuid(&row.id)?),
            tenant_id: TenantId::from_uuid(parse_uuid(&row.tenant_id)?),
            owner_id: UserId::from_uuid(parse_uuid(&row.owner_id)?),
            project_id: ProjectId::from_uuid(parse_uuid(&row.project_id)?),
            job_type,
            status,
            idempotency_key: row.idempotency_key,
            payload: row.payload,
            result_summary: row.result_summary,
            error,
            retry: RetryState {
                attempts: row.attempts,
                next_run_at: row.next_run_at,
                dismissed: row.dismissed,
                dismissed_at: row.dismissed_at,
                last_error: row.last_error,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl JobRepository for MySqlJobRepository {
    async fn create(&self, new_job: NewJob) -> BeaconResult<Job> {
        let job = new_job.into_job();
        debug!("Creating job {} for tenant {}", job.id, job.tenant_id);

        sqlx::query(
            r#"
            INSERT INTO jobs (id, tenant_id, owner_id, project_id, job_type, status,
                              idempotency_key, payload, attempts, dismissed, live,
                              created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 1, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.tenant_id.to_string())
        .bind(job.owner_id.to_string())
        .bind(job.project_id.to_string())
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(&job.idempotency_key)
        .bind(&job.payload)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(self.pool.inner())
        .await?;

        Ok(job)
    }

    async fn reserve(&self, new_job: NewJob) -> BeaconResult<Reservation> {
        // Two rounds cover the race in each direction: a concurrent winner
        // makes our insert conflict, and a winner that reaches a terminal
        // status between our conflict and our fetch frees the slot again.
        for _ in 0..2 {
            match self.create(new_job.clone()).await {
                Ok(job) => return Ok(Reservation::Created(job)),
                Err(BeaconError::Conflict(_)) => {
                    if let Some(existing) = self
                        .fetch_live(
                            new_job.tenant_id,
                            new_job.project_id,
                            new_job.job_type,
                            &new_job.idempotency_key,
                        )
                        .await?
                    {
                        debug!(
                            "Reusing live job {} for idempotency key {}",
                            existing.id, new_job.idempotency_key
                        );
                        return Ok(Reservation::Reused(existing));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(BeaconError::conflict(format!(
            "Could not reserve idempotency slot for key {}",
            new_job.idempotency_key
        )))
    }

    async fn find_by_id(&self, id: JobId, tenant_id: TenantId) -> BeaconResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&select_jobs("WHERE id = ? AND tenant_id = ?"))
            .bind(id.to_string())
            .bind(tenant_id.to_string())
            .fetch_optional(self.pool.inner())
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_pending(&self, limit: usize) -> BeaconResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&select_jobs(
            "WHERE status = 'pending' AND (next_run_at IS NULL OR next_run_at <= ?) \
             ORDER BY created_at ASC, id ASC LIMIT ?",
        ))
        .bind(Utc::now())
        .bind(limit as i64)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn transition(&self, id: JobId, transition: JobTransition) -> BeaconResult<Job> {
        let now = Utc::now();
        let id_str = id.to_string();

        let result = match &transition {
            JobTransition::Claim => {
                sqlx::query(
                    "UPDATE jobs SET status = 'running', updated_at = ? \
                     WHERE id = ? AND status = 'pending'",
                )
                .bind(now)
                .bind(&id_str)
                .execute(self.pool.inner())
                .await?
            }
            JobTransition::Complete { result_summary } => {
                sqlx::query(
                    "UPDATE jobs SET status = 'completed', result_summary = ?, \
                     error_kind = NULL, error_message = NULL, live = NULL, updated_at = ? \
                     WHERE id = ? AND status = 'running'",
                )
                .bind(result_summary)
                .bind(now)
                .bind(&id_str)
                .execute(self.pool.inner())
                .await?
            }
            JobTransition::Fail { error } => {
                sqlx::query(
                    "UPDATE jobs SET status = 'failed', error_kind = ?, error_message = ?, \
                     attempts = attempts + 1, last_error = ?, live = NULL, updated_at = ? \
                     WHERE id = ? AND status = 'running'",
                )
                .bind(error.kind.as_str())
                .bind(&error.message)
                .bind(&error.message)
                .bind(now)
                .bind(&id_str)
                .execute(self.pool.inner())
                .await?
            }
            JobTransition::Retry => {
                sqlx::query(
                    "UPDATE jobs SET status = 'pending', result_summary = NULL, \
                     error_kind = NULL, error_message = NULL, attempts = 0, \
                     next_run_at = ?, dismissed = 0, dismissed_at = NULL, \
                     last_error = NULL, live = 1, updated_at = ? \
                     WHERE id = ? AND status = 'failed'",
                )
                .bind(now)
                .bind(now)
                .bind(&id_str)
                .execute(self.pool.inner())
                .await?
            }
            JobTransition::Cancel { reason } => {
                sqlx::query(
                    "UPDATE jobs SET status = 'failed', error_kind = 'cancelled', \
                     error_message = ?, last_error = ?, live = NULL, updated_at = ? \
                     WHERE id = ? AND status = 'pending'",
                )
                .bind(reason)
                .bind(reason)
                .bind(now)
                .bind(&id_str)
                .execute(self.pool.inner())
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return self.transition_conflict(id, &transition).await;
        }

        debug!("Job {} transitioned via {}", id, transition.name());

        self.fetch_unscoped(id)
            .await?
            .ok_or_else(|| BeaconError::not_found("Job", id))
    }

    async fn count_in_flight(&self, tenant_id: TenantId) -> BeaconResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs \
             WHERE tenant_id = ? AND status IN ('pending', 'running')",
        )
        .bind(tenant_id.to_string())
        .fetch_one(self.pool.inner())
        .await?;

        Ok(count.unsigned_abs())
    }

    async fn list_by_tenant(
        &self,
        tenant_id: TenantId,
        filter: JobFilter,
        page: PageRequest,
    ) -> BeaconResult<Page<Job>> {
        let mut count_query: QueryBuilder<sqlx::MySql> =
            QueryBuilder::new("SELECT COUNT(*) FROM jobs WHERE tenant_id = ");
        count_query.push_bind(tenant_id.to_string());
        push_filter(&mut count_query, &filter);

        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(self.pool.inner())
            .await?;

        let mut query: QueryBuilder<sqlx::MySql> =
            QueryBuilder::new(format!("SELECT {JOB_COLUMNS} FROM jobs WHERE tenant_id = "));
        query.push_bind(tenant_id.to_string());
        push_filter(&mut query, &filter);
        query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        query.push_bind(page.limit() as i64);
        query.push(" OFFSET ");
        query.push_bind(page.offset() as i64);

        let rows: Vec<JobRow> = query
            .build_query_as()
            .fetch_all(self.pool.inner())
            .await?;

        let jobs = rows
            .into_iter()
            .map(Job::try_from)
            .collect::<BeaconResult<Vec<_>>>()?;

        Ok(Page::new(jobs, page, total.unsigned_abs()))
    }

    async fn list_dead_letter(&self, tenant_id: TenantId) -> BeaconResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&select_jobs(
            "WHERE tenant_id = ? AND status = 'failed' AND dismissed = 0 \
             ORDER BY updated_at DESC",
        ))
        .bind(tenant_id.to_string())
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn find_stale_running(&self, stale_after: Duration) -> BeaconResult<Vec<Job>> {
        let threshold = Utc::now()
            - chrono::Duration::from_std(stale_after)
                .map_err(|e| BeaconError::Internal(format!("Invalid staleness threshold: {e}")))?;

        let rows = sqlx::query_as::<_, JobRow>(&select_jobs(
            "WHERE status = 'running' AND updated_at < ? ORDER BY updated_at ASC",
        ))
        .bind(threshold)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn set_dismissed(
        &self,
        id: JobId,
        tenant_id: TenantId,
        dismissed: bool,
    ) -> BeaconResult<Job> {
        let now = Utc::now();
        let dismissed_at = dismissed.then_some(now);

        let result = sqlx::query(
            "UPDATE jobs SET dismissed = ?, dismissed_at = ?, updated_at = ? \
             WHERE id = ? AND tenant_id = ? AND status = 'failed'",
        )
        .bind(dismissed)
        .bind(dismissed_at)
        .bind(now)
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .execute(self.pool.inner())
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(id, tenant_id).await? {
                None => Err(BeaconError::not_found("Job", id)),
                Some(job) => Err(BeaconError::conflict(format!(
                    "Job {} is {}, not failed",
                    id, job.status
                ))),
            };
        }

        self.find_by_id(id, tenant_id)
            .await?
            .ok_or_else(|| BeaconError::not_found("Job", id))
    }

    async fn clear_attempts(&self, id: JobId, tenant_id: TenantId) -> BeaconResult<Job> {
        let result = sqlx::query(
            "UPDATE jobs SET attempts = 0, updated_at = ? \
             WHERE id = ? AND tenant_id = ? AND status = 'failed'",
        )
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(tenant_id.to_string())
        .execute(self.pool.inner())
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(id, tenant_id).await? {
                None => Err(BeaconError::not_found("Job", id)),
                Some(job) => Err(BeaconError::conflict(format!(
                    "Job {} is {}, not failed",
                    id, job.status
                ))),
            };
        }

        self.find_by_id(id, tenant_id)
            .await?
            .ok_or_else(|| BeaconError::not_found("Job", id))
    }

    async fn stats(&self, tenant_id: TenantId) -> BeaconResult<PipelineStats> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM jobs WHERE tenant_id = ? GROUP BY status",
        )
        .bind(tenant_id.to_string())
        .fetch_all(self.pool.inner())
        .await?;

        let dead_letter: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs \
             WHERE tenant_id = ? AND status = 'failed' AND dismissed = 0",
        )
        .bind(tenant_id.to_string())
        .fetch_one(self.pool.inner())
        .await?;

        let mut stats = PipelineStats {
            dead_letter: dead_letter.unsigned_abs(),
            ..PipelineStats::default()
        };
        for (status, count) in counts {
            let count = count.unsigned_abs();
            match JobStatus::parse(&status) {
                Some(JobStatus::Pending) => stats.pending = count,
                Some(JobStatus::Running) => stats.running = count,
                Some(JobStatus::Completed) => stats.completed = count,
                Some(JobStatus::Failed) => stats.failed = count,
                None => {}
            }
        }

        Ok(stats)
    }
}

fn push_filter(query: &mut QueryBuilder<'_, sqlx::MySql>, filter: &JobFilter) {
    if let Some(status) = filter.status {
        query.push(" AND status = ");
        query.push_bind(status.as_str());
    }
    if let Some(job_type) = filter.job_type {
        query.push(" AND job_type = ");
        query.push_bind(job_type.as_str());
    }
    if let Some(project_id) = filter.project_id {
        query.push(" AND project_id = ");
        query.push_bind(project_id.to_string());
    }
}
