// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease coordinator: one assignment cycle
//!
//! A cycle claims the oldest ready job, leases (or provisions) a worker,
//! prepares it remotely and only then commits the assignment. Nothing is
//! assigned until the remote steps succeed; on failure the cycle undoes
//! what it created and reports every compensating action.
//!
//! The job claim and worker lease are renewed together before every remote
//! step, so the TTL only has to outlast the longest single step.

use crate::engine::Engine;
use crate::error::{LeaseError, SequenceError};
use std::fmt;
use tracing::{debug, error, info, info_span, warn, Instrument, Level};
use vl_adapters::{CloudApi, RemoteShell, SecretStore};
use vl_core::{
    Assignment, Clock, CommandPlan, Compensation, CompensationAction, CycleFailure, CycleOutcome,
    FailureStage, IdGen, JobId, JobStatus, Lease, Worker, WorkerId,
};
use vl_storage::{Claim, Commit, StateStore};

/// What the current cycle holds, for compensation
struct CycleState {
    token: String,
    job_id: JobId,
    worker_id: Option<WorkerId>,
    worker_was_created: bool,
    /// A created worker's row was inserted
    row_inserted: bool,
    region: Option<String>,
}

struct StepFailure {
    stage: FailureStage,
    error: String,
}

impl StepFailure {
    fn new(stage: FailureStage, error: impl fmt::Display) -> Self {
        Self {
            stage,
            error: error.to_string(),
        }
    }

    /// Remote work may already be running; keep the worker
    fn after_launch(&self) -> bool {
        matches!(self.stage, FailureStage::ClaimLost | FailureStage::Commit)
    }
}

impl<S, A, R, K, C, I> Engine<S, A, R, K, C, I>
where
    S: StateStore,
    A: CloudApi,
    R: RemoteShell,
    K: SecretStore,
    C: Clock,
    I: IdGen,
{
    /// Run one assignment cycle. Runs the sweeper instead when no job is
    /// ready.
    pub async fn run_assignment_cycle(&self) -> CycleOutcome {
        let token = self.id_gen.next();
        let span = info_span!("cycle", %token);
        self.cycle(token).instrument(span).await
    }

    async fn cycle(&self, token: String) -> CycleOutcome {
        self.log_fleet_stats().await;

        let claim = self.fresh_claim(&token);
        let job_id = match self.store.claim_ready_job(&claim).await {
            Ok(Some(job_id)) => job_id,
            Ok(None) => {
                info!("no ready job, sweeping");
                return CycleOutcome::NoWork {
                    cleanup: self.sweep().await,
                };
            }
            Err(e) => {
                error!(error = %e, "failed to claim a job");
                return CycleOutcome::Failed(CycleFailure {
                    stage: FailureStage::ClaimJob,
                    error: e.to_string(),
                    job_id: None,
                    worker_id: None,
                    worker_was_created: false,
                    compensations: Vec::new(),
                });
            }
        };
        info!(%job_id, "job claimed");

        let mut state = CycleState {
            token,
            job_id,
            worker_id: None,
            worker_was_created: false,
            row_inserted: false,
            region: None,
        };

        match self.assign(&mut state).await {
            Ok(assignment) => {
                info!(
                    job_id = %assignment.job_id,
                    worker_id = %assignment.worker_id,
                    worker_was_created = assignment.worker_was_created,
                    "assignment committed"
                );
                CycleOutcome::Assigned(assignment)
            }
            Err(failure) => {
                error!(stage = %failure.stage, error = %failure.error, "cycle failed");
                let compensations = self.compensate(&state, &failure).await;
                CycleOutcome::Failed(CycleFailure {
                    stage: failure.stage,
                    error: failure.error,
                    job_id: Some(state.job_id),
                    worker_id: state.worker_id,
                    worker_was_created: state.worker_was_created,
                    compensations,
                })
            }
        }
    }

    async fn assign(&self, state: &mut CycleState) -> Result<Assignment, StepFailure> {
        let job = match self.store.job(&state.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return Err(StepFailure::new(
                    FailureStage::FetchJob,
                    format!("job {} disappeared", state.job_id),
                ))
            }
            Err(e) => return Err(StepFailure::new(FailureStage::FetchJob, e)),
        };
        if job.status != JobStatus::Ready {
            return Err(StepFailure::new(
                FailureStage::FetchJob,
                format!("job {} is {}", job.id, job.status),
            ));
        }

        let (worker_id, address) = self.locate_worker(state).await?;
        let held = &*state;
        let plan = CommandPlan::render(&self.config.commands, &job, &worker_id)
            .map_err(|e| StepFailure::new(FailureStage::Commands, e))?;

        self.renew(held, &worker_id)
            .await
            .map_err(|e| StepFailure::new(FailureStage::LeaseRenewal, e))?;
        self.executor
            .wait_until_reachable(&address)
            .await
            .map_err(|e| StepFailure::new(FailureStage::Reachability, e))?;

        let credential = self
            .secrets
            .get_secret(&self.config.ssh.key_secret)
            .await
            .map_err(|e| StepFailure::new(FailureStage::Credential, e))?;

        let worker = &worker_id;
        let steps = self
            .executor
            .run_sequence(&address, &credential, &plan, move || self.renew(held, worker))
            .await
            .map_err(|e| match e {
                SequenceError::Lease { .. } => StepFailure::new(FailureStage::LeaseRenewal, e),
                _ => StepFailure::new(FailureStage::Commands, e),
            })?;
        debug!(steps = steps.len(), "command sequence finished");

        let commit = Commit {
            job_id: &held.job_id,
            worker_id: &worker_id,
            token: &held.token,
            now: self.clock.now(),
        };
        match self.store.commit_assignment(&commit).await {
            Ok(true) => Ok(Assignment {
                job_id: held.job_id.clone(),
                worker_id,
                worker_address: address,
                worker_was_created: held.worker_was_created,
                region: held.region.clone(),
            }),
            Ok(false) => Err(StepFailure::new(
                FailureStage::ClaimLost,
                "job claim or worker lease no longer held at commit",
            )),
            Err(e) => Err(StepFailure::new(FailureStage::Commit, e)),
        }
    }

    /// Select a worker and resolve its address. A reused worker whose
    /// instance is gone loses its row and selection starts over.
    async fn locate_worker(
        &self,
        state: &mut CycleState,
    ) -> Result<(WorkerId, String), StepFailure> {
        loop {
            let worker_id = self.select_worker(state).await?;
            self.renew(state, &worker_id)
                .await
                .map_err(|e| StepFailure::new(FailureStage::LeaseRenewal, e))?;

            if state.worker_was_created {
                let address = self
                    .provisioner
                    .resolve_address(worker_id.as_str())
                    .await
                    .map_err(|e| StepFailure::new(FailureStage::ResolveAddress, e))?;
                return Ok((worker_id, address));
            }

            match self.provisioner.existing_address(worker_id.as_str()).await {
                Ok(address) => return Ok((worker_id, address)),
                Err(e) if e.is_instance_missing() => {
                    warn!(%worker_id, error = %e, "reused worker has no instance, dropping it");
                    self.drop_vanished_worker(state, &worker_id).await?;
                }
                Err(e) => return Err(StepFailure::new(FailureStage::ResolveAddress, e)),
            }
        }
    }

    async fn drop_vanished_worker(
        &self,
        state: &mut CycleState,
        worker_id: &WorkerId,
    ) -> Result<(), StepFailure> {
        match self.store.delete_leased_worker(worker_id, &state.token).await {
            Ok(true) => {
                state.worker_id = None;
                Ok(())
            }
            Ok(false) => Err(StepFailure::new(
                FailureStage::ResolveAddress,
                format!("worker {} has no instance and its lease was lost", worker_id),
            )),
            Err(e) => Err(StepFailure::new(FailureStage::ResolveAddress, e)),
        }
    }

    /// Lease a free worker, or provision one and insert its row
    async fn select_worker(&self, state: &mut CycleState) -> Result<WorkerId, StepFailure> {
        let claim = self.fresh_claim(&state.token);
        match self.store.claim_free_worker(&claim, &state.job_id).await {
            Ok(Some(worker)) => {
                info!(worker_id = %worker.id, "reusing free worker");
                state.worker_id = Some(worker.id.clone());
                return Ok(worker.id);
            }
            Ok(None) => info!("no free worker, provisioning"),
            Err(e) => return Err(StepFailure::new(FailureStage::SelectWorker, e)),
        }

        let launched = self
            .provisioner
            .create_instance()
            .await
            .map_err(|e| StepFailure::new(FailureStage::Provision, e))?;
        let worker_id = WorkerId::new(&launched.instance_id);
        state.worker_id = Some(worker_id.clone());
        state.worker_was_created = true;
        state.region = Some(launched.region);

        // Lease clock restarts here; provisioning may have used much of the claim
        let lease = self.fresh_claim(&state.token);
        let mut worker = Worker::new(launched.instance_id, lease.now);
        worker.lease = Some(Lease {
            token: lease.token,
            job_id: Some(state.job_id.clone()),
            expires_at: lease.expires_at,
        });
        self.store
            .insert_worker(&worker)
            .await
            .map_err(|e| StepFailure::new(FailureStage::SelectWorker, e))?;
        state.row_inserted = true;

        Ok(worker_id)
    }

    fn fresh_claim(&self, token: &str) -> Claim {
        Claim::new(token, self.clock.now(), self.config.lease.ttl)
    }

    /// Push out the job claim and worker lease before the next remote step
    async fn renew(&self, state: &CycleState, worker_id: &WorkerId) -> Result<(), LeaseError> {
        let claim = self.fresh_claim(&state.token);
        if self
            .store
            .extend_claim(&state.job_id, worker_id, &claim)
            .await?
        {
            debug!(expires_at = %claim.expires_at, "claim renewed");
            Ok(())
        } else {
            warn!(%worker_id, "claim lost between steps");
            Err(LeaseError::Lost)
        }
    }

    async fn compensate(&self, state: &CycleState, failure: &StepFailure) -> Vec<Compensation> {
        let mut actions = Vec::new();

        if let Some(worker_id) = &state.worker_id {
            if state.worker_was_created && !failure.after_launch() {
                let mut terminate = true;
                if state.row_inserted {
                    let (deleted, lease_lost) = self.delete_worker_row(worker_id, &state.token).await;
                    // Someone else holds the row now; the instance is theirs
                    terminate = !lease_lost;
                    actions.push(deleted);
                }
                if terminate {
                    actions.push(self.terminate_instance(worker_id).await);
                }
            } else if failure.stage == FailureStage::Reachability {
                // A reused worker that did not answer goes to the back of the line
                actions.push(self.demote_worker(worker_id, &state.token).await);
            } else {
                actions.push(self.release_worker_lease(worker_id, &state.token).await);
            }
        }
        actions.push(self.release_job_claim(&state.job_id, &state.token).await);

        for action in &actions {
            if action.succeeded {
                info!(action = ?action.action, target = %action.target, "compensation applied");
            } else {
                warn!(
                    action = ?action.action,
                    target = %action.target,
                    error = action.error.as_deref().unwrap_or_default(),
                    "compensation failed"
                );
            }
        }
        actions
    }

    /// Returns the compensation and whether the lease had been lost
    async fn delete_worker_row(&self, worker_id: &WorkerId, token: &str) -> (Compensation, bool) {
        let action = CompensationAction::DeleteWorkerRow;
        match self.store.delete_leased_worker(worker_id, token).await {
            Ok(true) => (Compensation::succeeded(action, worker_id), false),
            Ok(false) => (
                Compensation::failed(action, worker_id, "worker lease no longer held"),
                true,
            ),
            Err(e) => (Compensation::failed(action, worker_id, e), false),
        }
    }

    async fn terminate_instance(&self, worker_id: &WorkerId) -> Compensation {
        let action = CompensationAction::TerminateInstance;
        if self.provisioner.terminate(worker_id.as_str()).await {
            Compensation::succeeded(action, worker_id)
        } else {
            Compensation::failed(action, worker_id, "provider rejected termination")
        }
    }

    async fn release_worker_lease(&self, worker_id: &WorkerId, token: &str) -> Compensation {
        let action = CompensationAction::ReleaseWorkerLease;
        match self.store.release_worker_lease(worker_id, token).await {
            Ok(_) => Compensation::succeeded(action, worker_id),
            Err(e) => Compensation::failed(action, worker_id, e),
        }
    }

    async fn demote_worker(&self, worker_id: &WorkerId, token: &str) -> Compensation {
        let action = CompensationAction::DemoteWorker;
        match self
            .store
            .demote_worker(worker_id, token, self.clock.now())
            .await
        {
            Ok(_) => Compensation::succeeded(action, worker_id),
            Err(e) => Compensation::failed(action, worker_id, e),
        }
    }

    async fn release_job_claim(&self, job_id: &JobId, token: &str) -> Compensation {
        let action = CompensationAction::ReleaseJobClaim;
        match self.store.release_job_claim(job_id, token).await {
            Ok(_) => Compensation::succeeded(action, job_id),
            Err(e) => Compensation::failed(action, job_id, e),
        }
    }

    async fn log_fleet_stats(&self) {
        if !tracing::enabled!(Level::DEBUG) {
            return;
        }
        match self.fleet_stats().await {
            Ok(stats) => debug!(
                total = stats.total_workers,
                free = stats.free_workers,
                busy = stats.busy_workers,
                leased = stats.leased_workers,
                ready_jobs = stats.jobs.get("ready").copied().unwrap_or(0),
                processing_jobs = stats.jobs.get("processing").copied().unwrap_or(0),
                "fleet state"
            ),
            Err(e) => debug!(error = %e, "fleet state unavailable"),
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
