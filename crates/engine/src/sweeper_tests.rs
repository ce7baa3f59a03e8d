// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::testing::{test_config, Harness};
use std::time::Duration;
use vl_adapters::{CloudCall, CloudError};
use vl_core::{Clock, JobId, JobStatus, Lease, SweepPhase, Worker, WorkerId};
use yare::parameterized;

fn ids(workers: &[WorkerId]) -> Vec<&str> {
    workers.iter().map(|w| w.as_str()).collect()
}

#[tokio::test]
async fn frees_finished_and_terminates_idle() {
    let h = Harness::new();
    h.job("m-done", JobStatus::Done, Duration::from_secs(3600));
    h.busy_worker("w-done", "m-done");
    h.free_worker("w-idle", Duration::from_secs(600));

    let report = h.engine.sweep().await;

    assert_eq!(ids(&report.freed), vec!["w-done"]);
    assert_eq!(ids(&report.terminated), vec!["w-idle"]);
    assert!(!report.has_errors(), "{:?}", report);

    let freed = h.store.worker("w-done").unwrap();
    assert!(freed.is_free());
    assert_eq!(freed.last_activity, h.clock.now());
    assert!(h.store.worker("w-idle").is_none());
    assert_eq!(h.cloud.terminated(), vec!["w-idle"]);
}

#[parameterized(
    just_under = { 299_999_999, false },
    exactly_at = { 300_000_000, false },
    one_past = { 300_000_001, true },
    well_past = { 600_000_000, true },
)]
#[test_macro(tokio::test)]
async fn idle_threshold_is_strict(idle_micros: u64, terminated: bool) {
    let h = Harness::new();
    h.free_worker("w-1", Duration::from_micros(idle_micros));

    let report = h.engine.sweep().await;

    assert_eq!(report.terminated.len() == 1, terminated);
    assert_eq!(h.store.worker("w-1").is_none(), terminated);
}

#[tokio::test]
async fn failed_termination_keeps_row_unleased() {
    let h = Harness::new();
    h.free_worker("w-stuck", Duration::from_secs(600));
    h.cloud.fail_terminate("w-stuck");

    let report = h.engine.sweep().await;

    assert_eq!(ids(&report.termination_failed), vec!["w-stuck"]);
    assert!(report.terminated.is_empty());
    assert!(report.errors.is_empty());
    let worker = h.store.worker("w-stuck").unwrap();
    assert_eq!(worker.lease, None);

    // Retried on the next sweep
    let again = h.engine.sweep().await;
    assert_eq!(ids(&again.termination_failed), vec!["w-stuck"]);
}

#[tokio::test]
async fn leased_workers_are_left_alone() {
    let h = Harness::new();
    let mut worker = h.free_worker("w-leased", Duration::from_secs(600));
    worker.lease = Some(Lease {
        token: "other-cycle".to_string(),
        job_id: Some(JobId::new("m-1")),
        expires_at: h.clock.now() + chrono::Duration::minutes(5),
    });
    h.store.put_worker(worker);
    h.cloud.remove_instance("w-leased");

    let report = h.engine.sweep().await;

    assert!(report.terminated.is_empty());
    assert!(report.vanished.is_empty());
    assert!(h.store.worker("w-leased").is_some());
}

#[tokio::test]
async fn vanished_worker_returns_job_to_ready() {
    let h = Harness::new();
    h.job("m-1", JobStatus::Processing, Duration::from_secs(600));
    h.busy_worker("w-gone", "m-1");
    h.cloud.remove_instance("w-gone");

    let report = h.engine.sweep().await;

    assert_eq!(ids(&report.vanished), vec!["w-gone"]);
    assert_eq!(report.requeued, vec![JobId::new("m-1")]);
    assert!(h.store.worker("w-gone").is_none());
    assert_eq!(h.store.job_row("m-1").unwrap().job.status, JobStatus::Ready);
}

#[tokio::test]
async fn terminated_instance_counts_as_vanished() {
    let h = Harness::new();
    h.free_worker("w-1", Duration::from_secs(30));
    h.cloud.add_instance("w-1", None, "terminated");

    let report = h.engine.sweep().await;

    assert_eq!(ids(&report.vanished), vec!["w-1"]);
    assert!(report.requeued.is_empty());
}

#[tokio::test]
async fn listing_failure_skips_reconcile_only() {
    let h = Harness::new();
    h.job("m-done", JobStatus::Done, Duration::from_secs(3600));
    h.busy_worker("w-done", "m-done");
    h.store.put_worker(Worker::new("w-orphan", h.clock.now()));
    h.cloud.fail_next_list(CloudError::Transport("timeout".into()));

    let report = h.engine.sweep().await;

    assert_eq!(ids(&report.freed), vec!["w-done"]);
    assert!(report.vanished.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].phase, SweepPhase::ReconcileVanished);
    assert!(h.store.worker("w-orphan").is_some());
}

#[tokio::test]
async fn store_failure_in_one_phase_does_not_stop_the_next() {
    let h = Harness::new();
    h.free_worker("w-idle", Duration::from_secs(600));
    h.store.fail_next("free_workers_of_done_jobs");

    let report = h.engine.sweep().await;

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].phase, SweepPhase::FreeCompleted);
    assert_eq!(ids(&report.terminated), vec!["w-idle"]);
}

#[tokio::test]
async fn reconcile_can_be_disabled() {
    let mut config = test_config();
    config.sweeper.reconcile_vanished = false;
    let h = Harness::with_config(config);
    h.free_worker("w-1", Duration::from_secs(30));
    h.cloud.remove_instance("w-1");

    let report = h.engine.sweep().await;

    assert!(report.vanished.is_empty());
    assert!(!h.cloud.calls().contains(&CloudCall::List));
    assert!(h.store.worker("w-1").is_some());
}
