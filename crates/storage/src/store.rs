// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State store port
//!
//! Every method is one short transaction. Methods that select rows for
//! later use stamp them with a [`Claim`] token instead of writing an
//! assignment; follow-up writes are only applied while the token matches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use vl_core::{CompletionReport, FleetStats, Job, JobId, Worker, WorkerId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("migration failed: {0}")]
    Migration(String),
}

/// A reservation stamped onto rows selected by one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub token: String,
    pub now: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Claim {
    pub fn new(token: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            token: token.into(),
            now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// Parameters of the assignment compare-and-swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit<'a> {
    pub job_id: &'a JobId,
    pub worker_id: &'a WorkerId,
    /// Token of the cycle holding both the job claim and the worker lease
    pub token: &'a str,
    pub now: DateTime<Utc>,
}

/// Outcome of removing a worker the provider no longer reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VanishedRemoval {
    pub removed: bool,
    /// Job moved from `processing` back to `ready`
    pub requeued: Option<JobId>,
}

/// Persistence for jobs and workers
#[async_trait]
pub trait StateStore: Clone + Send + Sync + 'static {
    /// Claim the oldest ready job no worker references and nobody holds
    async fn claim_ready_job(&self, claim: &Claim) -> Result<Option<JobId>, StoreError>;

    async fn job(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Drop a job claim if `token` still holds it
    async fn release_job_claim(&self, id: &JobId, token: &str) -> Result<bool, StoreError>;

    /// Lease the free worker with the oldest activity for `job_id`
    async fn claim_free_worker(
        &self,
        claim: &Claim,
        job_id: &JobId,
    ) -> Result<Option<Worker>, StoreError>;

    /// Insert a new (free) worker row, usually carrying a lease
    async fn insert_worker(&self, worker: &Worker) -> Result<(), StoreError>;

    async fn release_worker_lease(&self, id: &WorkerId, token: &str) -> Result<bool, StoreError>;

    /// Delete a free worker row if `token` still holds its lease
    async fn delete_leased_worker(&self, id: &WorkerId, token: &str) -> Result<bool, StoreError>;

    /// Release a lease and stamp `last_activity`, moving the worker to the
    /// back of the reuse order
    async fn demote_worker(
        &self,
        id: &WorkerId,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Push out the expiry of both the job claim and the worker lease held
    /// by `claim.token`. Returns false (and changes nothing) if either is
    /// no longer held.
    async fn extend_claim(
        &self,
        job_id: &JobId,
        worker_id: &WorkerId,
        claim: &Claim,
    ) -> Result<bool, StoreError>;

    /// Atomically assign the worker to the job and mark the job processing.
    /// Returns false (and changes nothing) if either claim was lost.
    async fn commit_assignment(&self, commit: &Commit<'_>) -> Result<bool, StoreError>;

    /// Mark the job done and free the worker if still assigned to it.
    /// Returns `None` for an unknown job.
    async fn complete_job(
        &self,
        job_id: &JobId,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Option<CompletionReport>, StoreError>;

    /// Clear assignments that point at done jobs
    async fn free_workers_of_done_jobs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkerId>, StoreError>;

    /// Lease every free, unleased worker with `last_activity < cutoff`
    async fn lease_idle_workers(
        &self,
        cutoff: DateTime<Utc>,
        claim: &Claim,
    ) -> Result<Vec<Worker>, StoreError>;

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError>;

    /// Delete an unleased worker row; a `processing` job it held goes back
    /// to `ready`
    async fn remove_vanished_worker(
        &self,
        id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<VanishedRemoval, StoreError>;

    async fn fleet_stats(&self, now: DateTime<Utc>) -> Result<FleetStats, StoreError>;
}
