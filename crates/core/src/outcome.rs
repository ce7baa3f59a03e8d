// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Machine-readable results of every entry point
//!
//! Each invocation ends in a [`HandlerResponse`]: a status code (200 or 500)
//! and a JSON body serialized from one of the report types below.

use crate::job::{JobId, JobStatus};
use crate::worker::{Worker, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A compensating action taken after a failed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationAction {
    ReleaseJobClaim,
    ReleaseWorkerLease,
    /// Release the lease and push the worker to the back of the reuse order
    DemoteWorker,
    DeleteWorkerRow,
    TerminateInstance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compensation {
    pub action: CompensationAction,
    /// Job or worker id the action applied to
    pub target: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Compensation {
    pub fn succeeded(action: CompensationAction, target: impl fmt::Display) -> Self {
        Self {
            action,
            target: target.to_string(),
            succeeded: true,
            error: None,
        }
    }

    pub fn failed(
        action: CompensationAction,
        target: impl fmt::Display,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            action,
            target: target.to_string(),
            succeeded: false,
            error: Some(error.to_string()),
        }
    }
}

/// Where in the cycle a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    ClaimJob,
    FetchJob,
    SelectWorker,
    Provision,
    ResolveAddress,
    Reachability,
    Credential,
    Commands,
    /// Claim or lease lost before a remote step
    LeaseRenewal,
    ClaimLost,
    Commit,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::ClaimJob => "claim_job",
            FailureStage::FetchJob => "fetch_job",
            FailureStage::SelectWorker => "select_worker",
            FailureStage::Provision => "provision",
            FailureStage::ResolveAddress => "resolve_address",
            FailureStage::Reachability => "reachability",
            FailureStage::Credential => "credential",
            FailureStage::Commands => "commands",
            FailureStage::LeaseRenewal => "lease_renewal",
            FailureStage::ClaimLost => "claim_lost",
            FailureStage::Commit => "commit",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed job-to-worker assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub job_id: JobId,
    pub worker_id: WorkerId,
    pub worker_address: String,
    pub worker_was_created: bool,
    /// Region of a newly provisioned worker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleFailure {
    pub stage: FailureStage,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    pub worker_was_created: bool,
    pub compensations: Vec<Compensation>,
}

/// Result of one assignment cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Assigned(Assignment),
    /// No ready job; the sweeper ran instead
    NoWork { cleanup: SweepReport },
    Failed(CycleFailure),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, CycleOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPhase {
    FreeCompleted,
    TerminateIdle,
    ReconcileVanished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseError {
    pub phase: SweepPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    pub error: String,
}

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Workers released from jobs already done
    pub freed: Vec<WorkerId>,
    /// Idle workers terminated and deleted
    pub terminated: Vec<WorkerId>,
    /// Idle workers whose termination failed; rows kept
    pub termination_failed: Vec<WorkerId>,
    /// Rows removed because the provider no longer knows the instance
    pub vanished: Vec<WorkerId>,
    /// Jobs returned to `ready` after their worker vanished
    pub requeued: Vec<JobId>,
    pub errors: Vec<PhaseError>,
}

impl SweepReport {
    /// A phase failed. Failed terminations are not errors; their rows stay
    /// and the next sweep retries them.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Result of a completion callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub job_id: JobId,
    pub worker_id: WorkerId,
    /// False when the job was already done
    pub job_marked_done: bool,
    /// False when the worker was not assigned to this job
    pub worker_freed: bool,
}

/// Snapshot of workers and jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetStats {
    pub total_workers: u64,
    pub free_workers: u64,
    pub busy_workers: u64,
    pub leased_workers: u64,
    /// Mean minutes since last activity across free workers
    pub avg_idle_minutes: Option<f64>,
    /// Job counts keyed by status text; every status is present
    pub jobs: BTreeMap<String, u64>,
    pub timestamp: DateTime<Utc>,
}

impl FleetStats {
    /// Compute from full rows (used where the store cannot aggregate)
    pub fn from_rows<'a>(
        workers: impl IntoIterator<Item = &'a Worker>,
        job_statuses: impl IntoIterator<Item = JobStatus>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = Self::empty(now);
        let mut idle_minutes = Vec::new();

        for worker in workers {
            stats.total_workers += 1;
            if worker.is_free() {
                stats.free_workers += 1;
                idle_minutes.push((now - worker.last_activity).num_milliseconds() as f64 / 60_000.0);
            } else {
                stats.busy_workers += 1;
            }
            if worker.is_leased(now) {
                stats.leased_workers += 1;
            }
        }
        for status in job_statuses {
            *stats.jobs.entry(status.to_string()).or_default() += 1;
        }
        if !idle_minutes.is_empty() {
            stats.avg_idle_minutes =
                Some(idle_minutes.iter().sum::<f64>() / idle_minutes.len() as f64);
        }
        stats
    }

    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            total_workers: 0,
            free_workers: 0,
            busy_workers: 0,
            leased_workers: 0,
            avg_idle_minutes: None,
            jobs: JobStatus::ALL
                .iter()
                .map(|s| (s.to_string(), 0))
                .collect(),
            timestamp: now,
        }
    }
}

/// Envelope returned by every entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON text
    pub body: String,
}

impl HandlerResponse {
    pub const OK: u16 = 200;
    pub const ERROR: u16 = 500;

    pub fn ok<T: Serialize>(body: &T) -> Self {
        Self::json(Self::OK, body)
    }

    pub fn failure<T: Serialize>(body: &T) -> Self {
        Self::json(Self::ERROR, body)
    }

    /// 500 with `{"error": message}`
    pub fn error(message: impl fmt::Display) -> Self {
        Self::json(
            Self::ERROR,
            &serde_json::json!({ "error": message.to_string() }),
        )
    }

    pub fn from_cycle(outcome: &CycleOutcome) -> Self {
        if outcome.is_success() {
            Self::ok(outcome)
        } else {
            Self::failure(outcome)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == Self::OK
    }

    fn json<T: Serialize>(status_code: u16, body: &T) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => Self { status_code, body },
            Err(e) => Self {
                status_code: Self::ERROR,
                body: serde_json::json!({ "error": format!("failed to encode result: {}", e) })
                    .to_string(),
            },
        }
    }
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
