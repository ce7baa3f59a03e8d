// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory state store
//!
//! Each trait method runs under one mutex acquisition, which gives the same
//! all-or-nothing behaviour as a database transaction. Used by tests and by
//! dry runs.

use crate::store::{Claim, Commit, StateStore, StoreError, VanishedRemoval};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use vl_core::{CompletionReport, FleetStats, Job, JobId, JobStatus, Lease, Worker, WorkerId};

/// A job with its claim columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRow {
    pub job: Job,
    pub claim: Option<(String, DateTime<Utc>)>,
}

impl JobRow {
    fn is_claimed(&self, now: DateTime<Utc>) -> bool {
        self.claim.as_ref().is_some_and(|(_, expires)| *expires > now)
    }
}

#[derive(Default)]
struct Tables {
    jobs: BTreeMap<JobId, JobRow>,
    workers: BTreeMap<WorkerId, Worker>,
    failures: HashSet<&'static str>,
}

impl Tables {
    fn referenced(&self, job_id: &JobId) -> bool {
        self.workers
            .values()
            .any(|w| w.assigned_job_id.as_ref() == Some(job_id))
    }

    fn check(&mut self, op: &'static str) -> Result<(), StoreError> {
        if self.failures.remove(op) {
            return Err(StoreError::Query(format!("injected failure in {}", op)));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStateStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace a job row (unclaimed)
    pub fn put_job(&self, job: Job) {
        self.lock()
            .jobs
            .insert(job.id.clone(), JobRow { job, claim: None });
    }

    /// Insert or replace a worker row as-is
    pub fn put_worker(&self, worker: Worker) {
        self.lock().workers.insert(worker.id.clone(), worker);
    }

    pub fn job_row(&self, id: &str) -> Option<JobRow> {
        self.lock().jobs.get(&JobId::new(id)).cloned()
    }

    pub fn worker(&self, id: &str) -> Option<Worker> {
        self.lock().workers.get(&WorkerId::new(id)).cloned()
    }

    pub fn workers(&self) -> Vec<Worker> {
        self.lock().workers.values().cloned().collect()
    }

    pub fn jobs(&self) -> Vec<JobRow> {
        self.lock().jobs.values().cloned().collect()
    }

    /// Make the next call of the named trait method fail
    pub fn fail_next(&self, op: &'static str) {
        self.lock().failures.insert(op);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn claim_ready_job(&self, claim: &Claim) -> Result<Option<JobId>, StoreError> {
        let mut tables = self.lock();
        tables.check("claim_ready_job")?;

        let candidate = tables
            .jobs
            .values()
            .filter(|row| row.job.status == JobStatus::Ready)
            .filter(|row| !row.is_claimed(claim.now))
            .filter(|row| !tables.referenced(&row.job.id))
            .min_by(|a, b| {
                a.job
                    .created_at
                    .cmp(&b.job.created_at)
                    .then_with(|| a.job.id.cmp(&b.job.id))
            })
            .map(|row| row.job.id.clone());

        if let Some(id) = &candidate {
            if let Some(row) = tables.jobs.get_mut(id) {
                row.claim = Some((claim.token.clone(), claim.expires_at));
            }
        }
        Ok(candidate)
    }

    async fn job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let mut tables = self.lock();
        tables.check("job")?;
        Ok(tables.jobs.get(id).map(|row| row.job.clone()))
    }

    async fn release_job_claim(&self, id: &JobId, token: &str) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        tables.check("release_job_claim")?;
        match tables.jobs.get_mut(id) {
            Some(row) if row.claim.as_ref().is_some_and(|(t, _)| t == token) => {
                row.claim = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_free_worker(
        &self,
        claim: &Claim,
        job_id: &JobId,
    ) -> Result<Option<Worker>, StoreError> {
        let mut tables = self.lock();
        tables.check("claim_free_worker")?;

        let candidate = tables
            .workers
            .values()
            .filter(|w| w.is_free() && !w.is_leased(claim.now))
            .min_by(|a, b| {
                a.last_activity
                    .cmp(&b.last_activity)
                    .then_with(|| a.id.cmp(&b.id))
            })
            .map(|w| w.id.clone());

        Ok(candidate.and_then(|id| {
            let worker = tables.workers.get_mut(&id)?;
            worker.lease = Some(Lease {
                token: claim.token.clone(),
                job_id: Some(job_id.clone()),
                expires_at: claim.expires_at,
            });
            Some(worker.clone())
        }))
    }

    async fn insert_worker(&self, worker: &Worker) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables.check("insert_worker")?;
        if tables.workers.contains_key(&worker.id) {
            return Err(StoreError::Query(format!(
                "duplicate key: worker {} exists",
                worker.id
            )));
        }
        tables.workers.insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn release_worker_lease(&self, id: &WorkerId, token: &str) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        tables.check("release_worker_lease")?;
        match tables.workers.get_mut(id) {
            Some(w) if w.lease.as_ref().is_some_and(|l| l.token == token) => {
                w.lease = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_leased_worker(&self, id: &WorkerId, token: &str) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        tables.check("delete_leased_worker")?;
        let held = tables.workers.get(id).is_some_and(|w| {
            w.is_free() && w.lease.as_ref().is_some_and(|l| l.token == token)
        });
        if held {
            tables.workers.remove(id);
        }
        Ok(held)
    }

    async fn demote_worker(
        &self,
        id: &WorkerId,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        tables.check("demote_worker")?;
        match tables.workers.get_mut(id) {
            Some(w) if w.lease.as_ref().is_some_and(|l| l.token == token) => {
                w.lease = None;
                w.last_activity = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn extend_claim(
        &self,
        job_id: &JobId,
        worker_id: &WorkerId,
        claim: &Claim,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        tables.check("extend_claim")?;

        let worker_held = tables.workers.get(worker_id).is_some_and(|w| {
            w.is_free() && w.lease.as_ref().is_some_and(|l| l.token == claim.token)
        });
        let job_held = tables.jobs.get(job_id).is_some_and(|row| {
            row.job.status == JobStatus::Ready
                && row.claim.as_ref().is_some_and(|(t, _)| *t == claim.token)
        });
        if !worker_held || !job_held {
            return Ok(false);
        }

        if let Some(lease) = tables
            .workers
            .get_mut(worker_id)
            .and_then(|w| w.lease.as_mut())
        {
            lease.expires_at = claim.expires_at;
        }
        if let Some(row) = tables.jobs.get_mut(job_id) {
            row.claim = Some((claim.token.clone(), claim.expires_at));
        }
        Ok(true)
    }

    async fn commit_assignment(&self, commit: &Commit<'_>) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        tables.check("commit_assignment")?;

        let worker_ok = tables.workers.get(commit.worker_id).is_some_and(|w| {
            w.is_free() && w.lease.as_ref().is_some_and(|l| l.token == commit.token)
        });
        let job_ok = tables.jobs.get(commit.job_id).is_some_and(|row| {
            row.job.status == JobStatus::Ready
                && row.claim.as_ref().is_some_and(|(t, _)| t == commit.token)
        });
        if !worker_ok || !job_ok || tables.referenced(commit.job_id) {
            return Ok(false);
        }

        if let Some(w) = tables.workers.get_mut(commit.worker_id) {
            w.assigned_job_id = Some(commit.job_id.clone());
            w.last_activity = commit.now;
            w.lease = None;
        }
        if let Some(row) = tables.jobs.get_mut(commit.job_id) {
            row.job.status = JobStatus::Processing;
            row.job.updated_at = commit.now;
            row.claim = None;
        }
        Ok(true)
    }

    async fn complete_job(
        &self,
        job_id: &JobId,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Option<CompletionReport>, StoreError> {
        let mut tables = self.lock();
        tables.check("complete_job")?;

        let Some(row) = tables.jobs.get_mut(job_id) else {
            return Ok(None);
        };
        let job_marked_done = row.job.status != JobStatus::Done;
        if job_marked_done {
            row.job.status = JobStatus::Done;
            row.job.updated_at = now;
            row.claim = None;
        }

        let worker_freed = match tables.workers.get_mut(worker_id) {
            Some(w) if w.assigned_job_id.as_ref() == Some(job_id) => {
                w.assigned_job_id = None;
                w.last_activity = now;
                true
            }
            _ => false,
        };

        Ok(Some(CompletionReport {
            job_id: job_id.clone(),
            worker_id: worker_id.clone(),
            job_marked_done,
            worker_freed,
        }))
    }

    async fn free_workers_of_done_jobs(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkerId>, StoreError> {
        let mut tables = self.lock();
        tables.check("free_workers_of_done_jobs")?;

        let done: HashSet<JobId> = tables
            .jobs
            .values()
            .filter(|row| row.job.status == JobStatus::Done)
            .map(|row| row.job.id.clone())
            .collect();

        let mut freed = Vec::new();
        for w in tables.workers.values_mut() {
            if w.assigned_job_id.as_ref().is_some_and(|j| done.contains(j)) {
                w.assigned_job_id = None;
                w.last_activity = now;
                freed.push(w.id.clone());
            }
        }
        Ok(freed)
    }

    async fn lease_idle_workers(
        &self,
        cutoff: DateTime<Utc>,
        claim: &Claim,
    ) -> Result<Vec<Worker>, StoreError> {
        let mut tables = self.lock();
        tables.check("lease_idle_workers")?;

        let mut leased = Vec::new();
        for w in tables.workers.values_mut() {
            if w.is_idle(claim.now, cutoff) {
                w.lease = Some(Lease {
                    token: claim.token.clone(),
                    job_id: None,
                    expires_at: claim.expires_at,
                });
                leased.push(w.clone());
            }
        }
        Ok(leased)
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        let mut tables = self.lock();
        tables.check("list_workers")?;
        let mut workers: Vec<Worker> = tables.workers.values().cloned().collect();
        workers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(workers)
    }

    async fn remove_vanished_worker(
        &self,
        id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<VanishedRemoval, StoreError> {
        let mut tables = self.lock();
        tables.check("remove_vanished_worker")?;

        let removable = tables.workers.get(id).is_some_and(|w| !w.is_leased(now));
        if !removable {
            return Ok(VanishedRemoval::default());
        }
        let assigned = tables.workers.remove(id).and_then(|w| w.assigned_job_id);

        let requeued = assigned.and_then(|job_id| {
            let row = tables.jobs.get_mut(&job_id)?;
            if row.job.status != JobStatus::Processing {
                return None;
            }
            row.job.status = JobStatus::Ready;
            row.job.updated_at = now;
            Some(job_id)
        });

        Ok(VanishedRemoval {
            removed: true,
            requeued,
        })
    }

    async fn fleet_stats(&self, now: DateTime<Utc>) -> Result<FleetStats, StoreError> {
        let mut tables = self.lock();
        tables.check("fleet_stats")?;
        Ok(FleetStats::from_rows(
            tables.workers.values(),
            tables.jobs.values().map(|row| row.job.status),
            now,
        ))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
