// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::error::CompletionError;
use crate::testing::Harness;
use std::time::Duration;
use vl_core::{Clock, JobId, JobStatus};
use yare::parameterized;

#[tokio::test]
async fn marks_job_done_and_frees_worker() {
    let h = Harness::new();
    h.job("m-1", JobStatus::Processing, Duration::from_secs(600));
    h.busy_worker("i-1", "m-1");
    h.clock.advance(Duration::from_secs(90));

    let report = h.engine.on_processing_complete("m-1", "i-1").await.unwrap();

    assert!(report.job_marked_done);
    assert!(report.worker_freed);
    let row = h.store.job_row("m-1").unwrap();
    assert_eq!(row.job.status, JobStatus::Done);
    assert_eq!(row.job.updated_at, h.clock.now());
    let worker = h.store.worker("i-1").unwrap();
    assert!(worker.is_free());
    assert_eq!(worker.last_activity, h.clock.now());
}

#[tokio::test]
async fn repeated_call_changes_nothing() {
    let h = Harness::new();
    h.job("m-1", JobStatus::Processing, Duration::from_secs(600));
    h.busy_worker("i-1", "m-1");
    h.engine.on_processing_complete("m-1", "i-1").await.unwrap();
    let jobs = h.store.jobs();
    let workers = h.store.workers();

    h.clock.advance(Duration::from_secs(30));
    let report = h.engine.on_processing_complete("m-1", "i-1").await.unwrap();

    assert!(!report.job_marked_done);
    assert!(!report.worker_freed);
    assert_eq!(h.store.jobs(), jobs);
    assert_eq!(h.store.workers(), workers);
}

#[tokio::test]
async fn worker_on_another_job_is_not_freed() {
    let h = Harness::new();
    h.job("m-1", JobStatus::Processing, Duration::from_secs(600));
    h.job("m-2", JobStatus::Processing, Duration::from_secs(300));
    h.busy_worker("i-1", "m-2");

    let report = h.engine.on_processing_complete("m-1", "i-1").await.unwrap();

    assert!(report.job_marked_done);
    assert!(!report.worker_freed);
    let worker = h.store.worker("i-1").unwrap();
    assert_eq!(worker.assigned_job_id, Some(JobId::new("m-2")));
}

#[tokio::test]
async fn unknown_job_fails() {
    let h = Harness::new();

    let err = h
        .engine
        .on_processing_complete("m-404", "i-1")
        .await
        .unwrap_err();

    assert_eq!(err, CompletionError::UnknownJob(JobId::new("m-404")));
}

#[parameterized(
    empty_job = { "", "i-1", "job_id" },
    blank_job = { "  ", "i-1", "job_id" },
    empty_worker = { "m-1", "", "worker_id" },
)]
#[test_macro(tokio::test)]
async fn rejects_missing_ids_before_touching_store(job_id: &str, worker_id: &str, field: &str) {
    let h = Harness::new();
    h.job("m-1", JobStatus::Processing, Duration::from_secs(600));
    h.store.fail_next("complete_job");

    let err = h
        .engine
        .on_processing_complete(job_id, worker_id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), format!("missing or empty {}", field));

    // The injected store failure is still armed
    let next = h.engine.on_processing_complete("m-1", "i-1").await;
    assert!(matches!(next, Err(CompletionError::Store(_))), "{:?}", next);
}
