// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PostgreSQL state store
//!
//! Selection queries lock candidate rows with `FOR UPDATE SKIP LOCKED` and
//! stamp a claim in the same statement, so overlapping invocations never
//! pick the same job or worker.

use crate::store::{Claim, Commit, StateStore, StoreError, VanishedRemoval};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::instrument;
use vl_core::{
    retry, CompletionReport, FleetStats, Job, JobId, JobStatus, Lease, RetryPolicy, Worker,
    WorkerId,
};

const WORKER_COLUMNS: &str = "worker_id, assigned_job_id, lease_token, lease_job_id, \
                              lease_expires_at, created_at, last_activity";

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

fn query_error(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, retrying per `policy` while the database is unavailable
    #[instrument(skip(url))]
    pub async fn connect(
        url: &str,
        max_connections: u32,
        policy: RetryPolicy,
    ) -> Result<Self, StoreError> {
        let pool = retry(
            policy,
            "database.connect",
            |_: &sqlx::Error| true,
            |_| {
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .connect(url)
            },
        )
        .await
        .map_err(|e| StoreError::Connection(e.into_inner().to_string()))?;

        tracing::info!("PostgreSQL connection pool established");
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let status: String = row.try_get("processing_status").map_err(query_error)?;
    Ok(Job {
        id: JobId::new(row.try_get::<String, _>("job_id").map_err(query_error)?),
        source_reference: row.try_get("source_reference").map_err(query_error)?,
        status: status.parse::<JobStatus>().map_err(StoreError::Corrupt)?,
        created_at: row.try_get("created_at").map_err(query_error)?,
        updated_at: row.try_get("updated_at").map_err(query_error)?,
    })
}

fn worker_from_row(row: &PgRow) -> Result<Worker, StoreError> {
    let lease_token: Option<String> = row.try_get("lease_token").map_err(query_error)?;
    let lease_expires_at: Option<DateTime<Utc>> =
        row.try_get("lease_expires_at").map_err(query_error)?;
    let lease_job_id: Option<String> = row.try_get("lease_job_id").map_err(query_error)?;

    let lease = match (lease_token, lease_expires_at) {
        (Some(token), Some(expires_at)) => Some(Lease {
            token,
            job_id: lease_job_id.map(JobId::new),
            expires_at,
        }),
        _ => None,
    };

    Ok(Worker {
        id: WorkerId::new(row.try_get::<String, _>("worker_id").map_err(query_error)?),
        assigned_job_id: row
            .try_get::<Option<String>, _>("assigned_job_id")
            .map_err(query_error)?
            .map(JobId::new),
        lease,
        created_at: row.try_get("created_at").map_err(query_error)?,
        last_activity: row.try_get("last_activity").map_err(query_error)?,
    })
}

#[async_trait]
impl StateStore for PgStateStore {
    #[instrument(skip(self, claim))]
    async fn claim_ready_job(&self, claim: &Claim) -> Result<Option<JobId>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET claim_token = $1, claim_expires_at = $2
            WHERE job_id = (
                SELECT j.job_id
                FROM jobs j
                WHERE j.processing_status = 'ready'
                  AND (j.claim_expires_at IS NULL OR j.claim_expires_at <= $3)
                  AND NOT EXISTS (
                      SELECT 1 FROM workers w WHERE w.assigned_job_id = j.job_id
                  )
                ORDER BY j.created_at ASC, j.job_id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING job_id
            "#,
        )
        .bind(&claim.token)
        .bind(claim.expires_at)
        .bind(claim.now)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(|r| r.try_get::<String, _>("job_id").map(JobId::new))
            .transpose()
            .map_err(query_error)
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT job_id, source_reference, processing_status, created_at, updated_at
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn release_job_claim(&self, id: &JobId, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET claim_token = NULL, claim_expires_at = NULL
            WHERE job_id = $1 AND claim_token = $2
            "#,
        )
        .bind(id.as_str())
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, claim), fields(job_id = %job_id))]
    async fn claim_free_worker(
        &self,
        claim: &Claim,
        job_id: &JobId,
    ) -> Result<Option<Worker>, StoreError> {
        let sql = format!(
            r#"
            UPDATE workers
            SET lease_token = $1, lease_job_id = $2, lease_expires_at = $3
            WHERE worker_id = (
                SELECT worker_id
                FROM workers
                WHERE assigned_job_id IS NULL
                  AND (lease_expires_at IS NULL OR lease_expires_at <= $4)
                ORDER BY last_activity ASC, worker_id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {WORKER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&claim.token)
            .bind(job_id.as_str())
            .bind(claim.expires_at)
            .bind(claim.now)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.as_ref().map(worker_from_row).transpose()
    }

    #[instrument(skip(self, worker), fields(worker_id = %worker.id))]
    async fn insert_worker(&self, worker: &Worker) -> Result<(), StoreError> {
        let lease = worker.lease.as_ref();
        sqlx::query(
            r#"
            INSERT INTO workers
                (worker_id, assigned_job_id, lease_token, lease_job_id, lease_expires_at,
                 created_at, last_activity)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(worker.id.as_str())
        .bind(worker.assigned_job_id.as_ref().map(JobId::as_str))
        .bind(lease.map(|l| l.token.as_str()))
        .bind(lease.and_then(|l| l.job_id.as_ref()).map(JobId::as_str))
        .bind(lease.map(|l| l.expires_at))
        .bind(worker.created_at)
        .bind(worker.last_activity)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn release_worker_lease(&self, id: &WorkerId, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workers
            SET lease_token = NULL, lease_job_id = NULL, lease_expires_at = NULL
            WHERE worker_id = $1 AND lease_token = $2
            "#,
        )
        .bind(id.as_str())
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_leased_worker(&self, id: &WorkerId, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM workers
            WHERE worker_id = $1 AND lease_token = $2 AND assigned_job_id IS NULL
            "#,
        )
        .bind(id.as_str())
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn demote_worker(
        &self,
        id: &WorkerId,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workers
            SET lease_token = NULL, lease_job_id = NULL, lease_expires_at = NULL,
                last_activity = $3
            WHERE worker_id = $1 AND lease_token = $2
            "#,
        )
        .bind(id.as_str())
        .bind(token)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, claim), fields(job_id = %job_id, worker_id = %worker_id))]
    async fn extend_claim(
        &self,
        job_id: &JobId,
        worker_id: &WorkerId,
        claim: &Claim,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let worker = sqlx::query(
            r#"
            UPDATE workers
            SET lease_expires_at = $3
            WHERE worker_id = $1 AND lease_token = $2 AND assigned_job_id IS NULL
            "#,
        )
        .bind(worker_id.as_str())
        .bind(&claim.token)
        .bind(claim.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        if worker.rows_affected() != 1 {
            tx.rollback().await.map_err(query_error)?;
            return Ok(false);
        }

        let job = sqlx::query(
            r#"
            UPDATE jobs
            SET claim_expires_at = $3
            WHERE job_id = $1 AND claim_token = $2 AND processing_status = 'ready'
            "#,
        )
        .bind(job_id.as_str())
        .bind(&claim.token)
        .bind(claim.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        if job.rows_affected() != 1 {
            tx.rollback().await.map_err(query_error)?;
            return Ok(false);
        }

        tx.commit().await.map_err(query_error)?;
        Ok(true)
    }

    #[instrument(skip(self, commit), fields(job_id = %commit.job_id, worker_id = %commit.worker_id))]
    async fn commit_assignment(&self, commit: &Commit<'_>) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let worker = sqlx::query(
            r#"
            UPDATE workers
            SET assigned_job_id = $1, last_activity = $4,
                lease_token = NULL, lease_job_id = NULL, lease_expires_at = NULL
            WHERE worker_id = $2
              AND lease_token = $3
              AND assigned_job_id IS NULL
              AND NOT EXISTS (SELECT 1 FROM workers o WHERE o.assigned_job_id = $1)
            "#,
        )
        .bind(commit.job_id.as_str())
        .bind(commit.worker_id.as_str())
        .bind(commit.token)
        .bind(commit.now)
        .execute(&mut *tx)
        .await;

        let worker = match worker {
            Ok(result) => result,
            // another worker won the partial unique index
            Err(e) if is_unique_violation(&e) => return Ok(false),
            Err(e) => return Err(query_error(e)),
        };
        if worker.rows_affected() != 1 {
            tx.rollback().await.map_err(query_error)?;
            return Ok(false);
        }

        let job = sqlx::query(
            r#"
            UPDATE jobs
            SET processing_status = 'processing', updated_at = $3,
                claim_token = NULL, claim_expires_at = NULL
            WHERE job_id = $1 AND claim_token = $2 AND processing_status = 'ready'
            "#,
        )
        .bind(commit.job_id.as_str())
        .bind(commit.token)
        .bind(commit.now)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        if job.rows_affected() != 1 {
            tx.rollback().await.map_err(query_error)?;
            return Ok(false);
        }

        tx.commit().await.map_err(query_error)?;
        Ok(true)
    }

    #[instrument(skip(self), fields(job_id = %job_id, worker_id = %worker_id))]
    async fn complete_job(
        &self,
        job_id: &JobId,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Option<CompletionReport>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let exists = sqlx::query("SELECT 1 FROM jobs WHERE job_id = $1 FOR UPDATE")
            .bind(job_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?;
        if exists.is_none() {
            tx.rollback().await.map_err(query_error)?;
            return Ok(None);
        }

        let job = sqlx::query(
            r#"
            UPDATE jobs
            SET processing_status = 'done', updated_at = $2,
                claim_token = NULL, claim_expires_at = NULL
            WHERE job_id = $1 AND processing_status <> 'done'
            "#,
        )
        .bind(job_id.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let worker = sqlx::query(
            r#"
            UPDATE workers
            SET assigned_job_id = NULL, last_activity = $3
            WHERE worker_id = $1 AND assigned_job_id = $2
            "#,
        )
        .bind(worker_id.as_str())
        .bind(job_id.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(Some(CompletionReport {
            job_id: job_id.clone(),
            worker_id: worker_id.clone(),
            job_marked_done: job.rows_affected() == 1,
            worker_freed: worker.rows_affected() == 1,
        }))
    }

    async fn free_workers_of_done_jobs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkerId>, StoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE workers w
            SET assigned_job_id = NULL, last_activity = $1
            FROM jobs j
            WHERE w.assigned_job_id = j.job_id AND j.processing_status = 'done'
            RETURNING w.worker_id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("worker_id").map(WorkerId::new))
            .collect::<Result<_, _>>()
            .map_err(query_error)
    }

    #[instrument(skip(self, claim))]
    async fn lease_idle_workers(
        &self,
        cutoff: DateTime<Utc>,
        claim: &Claim,
    ) -> Result<Vec<Worker>, StoreError> {
        let sql = format!(
            r#"
            UPDATE workers
            SET lease_token = $1, lease_job_id = NULL, lease_expires_at = $2
            WHERE worker_id IN (
                SELECT worker_id
                FROM workers
                WHERE assigned_job_id IS NULL
                  AND (lease_expires_at IS NULL OR lease_expires_at <= $3)
                  AND last_activity < $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {WORKER_COLUMNS}
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&claim.token)
            .bind(claim.expires_at)
            .bind(claim.now)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(worker_from_row).collect()
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers ORDER BY created_at, worker_id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(worker_from_row).collect()
    }

    #[instrument(skip(self), fields(worker_id = %id))]
    async fn remove_vanished_worker(
        &self,
        id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<VanishedRemoval, StoreError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM workers
            WHERE worker_id = $1 AND (lease_expires_at IS NULL OR lease_expires_at <= $2)
            RETURNING assigned_job_id
            "#,
        )
        .bind(id.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_error)?;

        let Some(deleted) = deleted else {
            tx.rollback().await.map_err(query_error)?;
            return Ok(VanishedRemoval::default());
        };
        let assigned: Option<String> = deleted.try_get("assigned_job_id").map_err(query_error)?;

        let mut requeued = None;
        if let Some(job_id) = assigned {
            let result = sqlx::query(
                r#"
                UPDATE jobs
                SET processing_status = 'ready', updated_at = $2
                WHERE job_id = $1 AND processing_status = 'processing'
                "#,
            )
            .bind(&job_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
            if result.rows_affected() == 1 {
                requeued = Some(JobId::new(job_id));
            }
        }

        tx.commit().await.map_err(query_error)?;
        Ok(VanishedRemoval {
            removed: true,
            requeued,
        })
    }

    async fn fleet_stats(&self, now: DateTime<Utc>) -> Result<FleetStats, StoreError> {
        let workers = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS total,
                COUNT(*) FILTER (WHERE assigned_job_id IS NULL)::BIGINT AS free,
                COUNT(*) FILTER (WHERE assigned_job_id IS NOT NULL)::BIGINT AS busy,
                COUNT(*) FILTER (WHERE lease_expires_at > $1)::BIGINT AS leased,
                (AVG(EXTRACT(EPOCH FROM ($1 - last_activity)))
                    FILTER (WHERE assigned_job_id IS NULL) / 60.0)::DOUBLE PRECISION
                    AS avg_idle_minutes
            FROM workers
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        let job_rows = sqlx::query(
            "SELECT processing_status, COUNT(*)::BIGINT AS n FROM jobs GROUP BY processing_status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        let count = |name: &str| -> Result<u64, StoreError> {
            let n: i64 = workers.try_get(name).map_err(query_error)?;
            Ok(n.max(0) as u64)
        };

        let mut stats = FleetStats::empty(now);
        stats.total_workers = count("total")?;
        stats.free_workers = count("free")?;
        stats.busy_workers = count("busy")?;
        stats.leased_workers = count("leased")?;
        stats.avg_idle_minutes = workers.try_get("avg_idle_minutes").map_err(query_error)?;

        let mut jobs: BTreeMap<String, u64> = stats.jobs;
        for row in &job_rows {
            let status: String = row.try_get("processing_status").map_err(query_error)?;
            let n: i64 = row.try_get("n").map_err(query_error)?;
            jobs.insert(status, n.max(0) as u64);
        }
        stats.jobs = jobs;
        Ok(stats)
    }
}
