// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reclamation sweeper
//!
//! Three independent, best-effort phases. A failing phase is recorded in
//! the report and the next phase still runs.

use crate::engine::Engine;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, info_span, warn, Instrument};
use vl_adapters::{CloudApi, RemoteShell, SecretStore};
use vl_core::{idle_cutoff, Clock, IdGen, PhaseError, SweepPhase, SweepReport, WorkerId};
use vl_storage::{Claim, StateStore};

impl<S, A, R, K, C, I> Engine<S, A, R, K, C, I>
where
    S: StateStore,
    A: CloudApi,
    R: RemoteShell,
    K: SecretStore,
    C: Clock,
    I: IdGen,
{
    /// Free workers of finished jobs, retire idle workers and drop rows
    /// for instances the provider no longer has
    pub async fn sweep(&self) -> SweepReport {
        async {
            let mut report = SweepReport::default();
            self.free_completed(&mut report).await;
            self.terminate_idle(&mut report).await;
            if self.config.sweeper.reconcile_vanished {
                self.reconcile_vanished(&mut report).await;
            }

            info!(
                freed = report.freed.len(),
                terminated = report.terminated.len(),
                termination_failed = report.termination_failed.len(),
                vanished = report.vanished.len(),
                requeued = report.requeued.len(),
                errors = report.errors.len(),
                "sweep finished"
            );
            report
        }
        .instrument(info_span!("sweep"))
        .await
    }

    async fn free_completed(&self, report: &mut SweepReport) {
        match self.store.free_workers_of_done_jobs(self.clock.now()).await {
            Ok(freed) => {
                for worker_id in &freed {
                    info!(%worker_id, "freed worker of finished job");
                }
                report.freed = freed;
            }
            Err(e) => record(report, SweepPhase::FreeCompleted, None, e),
        }
    }

    async fn terminate_idle(&self, report: &mut SweepReport) {
        let now = self.clock.now();
        let claim = Claim::new(self.id_gen.next(), now, self.config.lease.ttl);
        let cutoff = idle_cutoff(now, self.config.sweeper.idle_threshold);

        let idle = match self.store.lease_idle_workers(cutoff, &claim).await {
            Ok(idle) => idle,
            Err(e) => return record(report, SweepPhase::TerminateIdle, None, e),
        };

        for worker in idle {
            info!(
                worker_id = %worker.id,
                last_activity = %worker.last_activity,
                "terminating idle worker"
            );
            if !self.provisioner.terminate(worker.id.as_str()).await {
                if let Err(e) = self.store.release_worker_lease(&worker.id, &claim.token).await {
                    record(report, SweepPhase::TerminateIdle, Some(&worker.id), e);
                }
                report.termination_failed.push(worker.id);
                continue;
            }

            match self.store.delete_leased_worker(&worker.id, &claim.token).await {
                Ok(true) => report.terminated.push(worker.id),
                Ok(false) => record(
                    report,
                    SweepPhase::TerminateIdle,
                    Some(&worker.id),
                    "terminated, but the row changed before it could be deleted",
                ),
                Err(e) => record(report, SweepPhase::TerminateIdle, Some(&worker.id), e),
            }
        }
    }

    async fn reconcile_vanished(&self, report: &mut SweepReport) {
        let instances = match self.provisioner.list_instances().await {
            Ok(instances) => instances,
            Err(e) => {
                return record(
                    report,
                    SweepPhase::ReconcileVanished,
                    None,
                    format!("provider listing failed, skipped: {}", e),
                )
            }
        };
        let known: HashMap<&str, bool> = instances
            .iter()
            .map(|i| (i.id.as_str(), i.is_terminated()))
            .collect();

        let workers = match self.store.list_workers().await {
            Ok(workers) => workers,
            Err(e) => return record(report, SweepPhase::ReconcileVanished, None, e),
        };

        let now = self.clock.now();
        for worker in workers {
            let alive = known.get(worker.id.as_str()) == Some(&false);
            if alive || worker.is_leased(now) {
                continue;
            }

            match self.store.remove_vanished_worker(&worker.id, now).await {
                Ok(removal) if removal.removed => {
                    warn!(worker_id = %worker.id, "removed worker whose instance is gone");
                    if let Some(job_id) = removal.requeued {
                        info!(%job_id, "job returned to ready");
                        report.requeued.push(job_id);
                    }
                    report.vanished.push(worker.id);
                }
                Ok(_) => {}
                Err(e) => record(report, SweepPhase::ReconcileVanished, Some(&worker.id), e),
            }
        }
    }
}

fn record(
    report: &mut SweepReport,
    phase: SweepPhase,
    worker_id: Option<&WorkerId>,
    error: impl fmt::Display,
) {
    let error = error.to_string();
    warn!(?phase, worker_id = worker_id.map(|w| w.as_str()), %error, "sweep step failed");
    report.errors.push(PhaseError {
        phase,
        worker_id: worker_id.cloned(),
        error,
    });
}

#[cfg(test)]
#[path = "sweeper_tests.rs"]
mod tests;
