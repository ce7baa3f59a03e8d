// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(900);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
}

fn minutes(n: i64) -> chrono::Duration {
    chrono::Duration::minutes(n)
}

fn ready(store: &MemoryStateStore, id: &str, created: DateTime<Utc>) {
    store.put_job(Job::new(id, format!("https://x.test/{id}.m3u8"), JobStatus::Ready, created));
}

fn claim(token: &str, now: DateTime<Utc>) -> Claim {
    Claim::new(token, now, TTL)
}

#[tokio::test]
async fn claims_oldest_ready_job_first() {
    let store = MemoryStateStore::new();
    ready(&store, "m-new", t0());
    ready(&store, "m-old", t0() - minutes(10));
    store.put_job(Job::new("m-wait", "s", JobStatus::NotReady, t0() - minutes(20)));

    let first = store.claim_ready_job(&claim("a", t0())).await.unwrap();
    let second = store.claim_ready_job(&claim("b", t0())).await.unwrap();
    let third = store.claim_ready_job(&claim("c", t0())).await.unwrap();

    assert_eq!(first, Some(JobId::new("m-old")));
    assert_eq!(second, Some(JobId::new("m-new")));
    assert_eq!(third, None);
}

#[tokio::test]
async fn expired_job_claim_is_reclaimable() {
    let store = MemoryStateStore::new();
    ready(&store, "m-1", t0());

    assert!(store.claim_ready_job(&claim("a", t0())).await.unwrap().is_some());
    let later = t0() + minutes(15);
    assert_eq!(
        store.claim_ready_job(&claim("b", later)).await.unwrap(),
        Some(JobId::new("m-1"))
    );
    // the first holder can no longer release it
    assert!(!store.release_job_claim(&JobId::new("m-1"), "a").await.unwrap());
    assert!(store.release_job_claim(&JobId::new("m-1"), "b").await.unwrap());
}

#[tokio::test]
async fn referenced_job_is_never_claimed() {
    let store = MemoryStateStore::new();
    ready(&store, "m-1", t0());
    let mut worker = Worker::new("i-1", t0());
    worker.assigned_job_id = Some(JobId::new("m-1"));
    store.put_worker(worker);

    assert_eq!(store.claim_ready_job(&claim("a", t0())).await.unwrap(), None);
}

#[tokio::test]
async fn free_worker_claim_prefers_oldest_activity_and_skips_leased() {
    let store = MemoryStateStore::new();
    let mut recent = Worker::new("i-recent", t0());
    recent.last_activity = t0() - minutes(1);
    let mut stale = Worker::new("i-stale", t0());
    stale.last_activity = t0() - minutes(3);
    let mut busy = Worker::new("i-busy", t0());
    busy.last_activity = t0() - minutes(30);
    busy.assigned_job_id = Some(JobId::new("m-x"));
    store.put_worker(recent);
    store.put_worker(stale);
    store.put_worker(busy);

    let job = JobId::new("m-1");
    let first = store.claim_free_worker(&claim("a", t0()), &job).await.unwrap().unwrap();
    assert_eq!(first.id, WorkerId::new("i-stale"));
    let lease = first.lease.unwrap();
    assert_eq!(lease.token, "a");
    assert_eq!(lease.job_id, Some(job.clone()));
    // the lease is not an assignment
    assert!(store.worker("i-stale").unwrap().is_free());

    let second = store.claim_free_worker(&claim("b", t0()), &job).await.unwrap().unwrap();
    assert_eq!(second.id, WorkerId::new("i-recent"));
    assert!(store.claim_free_worker(&claim("c", t0()), &job).await.unwrap().is_none());
}

async fn claimed_pair(store: &MemoryStateStore) -> (JobId, WorkerId) {
    ready(store, "m-1", t0());
    store.put_worker(Worker::new("i-1", t0() - minutes(1)));
    let job = store.claim_ready_job(&claim("tok", t0())).await.unwrap().unwrap();
    let worker = store
        .claim_free_worker(&claim("tok", t0()), &job)
        .await
        .unwrap()
        .unwrap();
    (job, worker.id)
}

#[tokio::test]
async fn commit_assigns_and_clears_claims() {
    let store = MemoryStateStore::new();
    let (job, worker) = claimed_pair(&store).await;
    let now = t0() + minutes(2);

    let committed = store
        .commit_assignment(&Commit {
            job_id: &job,
            worker_id: &worker,
            token: "tok",
            now,
        })
        .await
        .unwrap();
    assert!(committed);

    let w = store.worker("i-1").unwrap();
    assert_eq!(w.assigned_job_id, Some(job.clone()));
    assert_eq!(w.last_activity, now);
    assert_eq!(w.lease, None);
    let row = store.job_row("m-1").unwrap();
    assert_eq!(row.job.status, JobStatus::Processing);
    assert_eq!(row.claim, None);
}

#[tokio::test]
async fn commit_with_stale_token_changes_nothing() {
    let store = MemoryStateStore::new();
    let (job, worker) = claimed_pair(&store).await;

    let committed = store
        .commit_assignment(&Commit {
            job_id: &job,
            worker_id: &worker,
            token: "other",
            now: t0(),
        })
        .await
        .unwrap();
    assert!(!committed);
    assert!(store.worker("i-1").unwrap().is_free());
    assert_eq!(store.job_row("m-1").unwrap().job.status, JobStatus::Ready);
}

#[tokio::test]
async fn commit_refuses_job_referenced_elsewhere() {
    let store = MemoryStateStore::new();
    let (job, worker) = claimed_pair(&store).await;
    let mut other = Worker::new("i-2", t0());
    other.assigned_job_id = Some(job.clone());
    store.put_worker(other);

    let committed = store
        .commit_assignment(&Commit {
            job_id: &job,
            worker_id: &worker,
            token: "tok",
            now: t0(),
        })
        .await
        .unwrap();
    assert!(!committed);
}

#[tokio::test]
async fn extending_claim_keeps_job_out_of_reach() {
    let store = MemoryStateStore::new();
    let (job, worker) = claimed_pair(&store).await;

    let renewed = claim("tok", t0() + minutes(10));
    assert!(store.extend_claim(&job, &worker, &renewed).await.unwrap());

    let row = store.job_row("m-1").unwrap();
    assert_eq!(row.claim, Some(("tok".to_string(), renewed.expires_at)));
    assert_eq!(
        store.worker("i-1").unwrap().lease.unwrap().expires_at,
        renewed.expires_at
    );
    // Past the original expiry but inside the renewed one
    let later = claim("intruder", t0() + minutes(20));
    assert_eq!(store.claim_ready_job(&later).await.unwrap(), None);
}

#[tokio::test]
async fn extending_lost_claim_changes_nothing() {
    let store = MemoryStateStore::new();
    let (job, worker) = claimed_pair(&store).await;

    // The job claim lapses and another invocation takes it
    let intruder = claim("intruder", t0() + minutes(16));
    assert_eq!(store.claim_ready_job(&intruder).await.unwrap(), Some(job.clone()));

    let renewed = claim("tok", t0() + minutes(16));
    assert!(!store.extend_claim(&job, &worker, &renewed).await.unwrap());
    assert_eq!(
        store.job_row("m-1").unwrap().claim,
        Some(("intruder".to_string(), intruder.expires_at))
    );
    // The worker lease was not pushed out either
    assert_eq!(
        store.worker("i-1").unwrap().lease.unwrap().expires_at,
        t0() + minutes(15)
    );
}

#[tokio::test]
async fn demoted_worker_goes_to_back_of_reuse_order() {
    let store = MemoryStateStore::new();
    let (_, worker) = claimed_pair(&store).await;
    store.put_worker(Worker::new("i-2", t0() - minutes(1) + chrono::Duration::seconds(1)));

    assert!(!store.demote_worker(&worker, "nope", t0()).await.unwrap());
    assert!(store.demote_worker(&worker, "tok", t0()).await.unwrap());

    let demoted = store.worker("i-1").unwrap();
    assert_eq!(demoted.lease, None);
    assert_eq!(demoted.last_activity, t0());

    let next = store
        .claim_free_worker(&claim("next", t0()), &JobId::new("m-2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.id.as_str(), "i-2");
}

#[tokio::test]
async fn delete_requires_matching_lease() {
    let store = MemoryStateStore::new();
    let mut worker = Worker::new("i-1", t0());
    worker.lease = Some(Lease {
        token: "tok".to_string(),
        job_id: None,
        expires_at: t0() + minutes(15),
    });
    store.insert_worker(&worker).await.unwrap();
    assert!(store.insert_worker(&worker).await.is_err());

    let id = WorkerId::new("i-1");
    assert!(!store.delete_leased_worker(&id, "nope").await.unwrap());
    assert!(store.delete_leased_worker(&id, "tok").await.unwrap());
    assert!(store.worker("i-1").is_none());
}

#[tokio::test]
async fn completion_is_idempotent() {
    let store = MemoryStateStore::new();
    let (job, worker) = claimed_pair(&store).await;
    store
        .commit_assignment(&Commit {
            job_id: &job,
            worker_id: &worker,
            token: "tok",
            now: t0(),
        })
        .await
        .unwrap();

    let first = store.complete_job(&job, &worker, t0() + minutes(30)).await.unwrap().unwrap();
    assert!(first.job_marked_done);
    assert!(first.worker_freed);
    let snapshot = (store.jobs(), store.workers());

    let second = store.complete_job(&job, &worker, t0() + minutes(40)).await.unwrap().unwrap();
    assert!(!second.job_marked_done);
    assert!(!second.worker_freed);
    assert_eq!((store.jobs(), store.workers()), snapshot);
}

#[tokio::test]
async fn completion_of_unknown_job_is_none() {
    let store = MemoryStateStore::new();
    let result = store
        .complete_job(&JobId::new("ghost"), &WorkerId::new("i-1"), t0())
        .await
        .unwrap();
    assert_eq!(result, None);
}

#[tokio::test]
async fn completion_leaves_worker_assigned_elsewhere() {
    let store = MemoryStateStore::new();
    ready(&store, "m-1", t0());
    let mut worker = Worker::new("i-1", t0());
    worker.assigned_job_id = Some(JobId::new("m-2"));
    store.put_worker(worker);

    let report = store
        .complete_job(&JobId::new("m-1"), &WorkerId::new("i-1"), t0())
        .await
        .unwrap()
        .unwrap();
    assert!(report.job_marked_done);
    assert!(!report.worker_freed);
    assert_eq!(
        store.worker("i-1").unwrap().assigned_job_id,
        Some(JobId::new("m-2"))
    );
}

#[tokio::test]
async fn frees_only_workers_of_done_jobs() {
    let store = MemoryStateStore::new();
    store.put_job(Job::new("m-done", "s", JobStatus::Done, t0()));
    store.put_job(Job::new("m-run", "s", JobStatus::Processing, t0()));
    let mut a = Worker::new("i-a", t0() - minutes(60));
    a.assigned_job_id = Some(JobId::new("m-done"));
    let mut b = Worker::new("i-b", t0() - minutes(60));
    b.assigned_job_id = Some(JobId::new("m-run"));
    store.put_worker(a);
    store.put_worker(b);

    let freed = store.free_workers_of_done_jobs(t0()).await.unwrap();
    assert_eq!(freed, [WorkerId::new("i-a")]);
    assert_eq!(store.worker("i-a").unwrap().last_activity, t0());
    assert!(!store.worker("i-b").unwrap().is_free());
}

#[tokio::test]
async fn idle_lease_uses_strict_cutoff() {
    let store = MemoryStateStore::new();
    let cutoff = t0() - minutes(5);
    let mut at = Worker::new("i-at", t0() - minutes(60));
    at.last_activity = cutoff;
    let mut past = Worker::new("i-past", t0() - minutes(60));
    past.last_activity = cutoff - chrono::Duration::microseconds(1);
    store.put_worker(at);
    store.put_worker(past);

    let leased = store.lease_idle_workers(cutoff, &claim("sweep", t0())).await.unwrap();
    let ids: Vec<_> = leased.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, ["i-past"]);

    // already leased rows are skipped by a concurrent sweep
    let again = store.lease_idle_workers(cutoff, &claim("sweep-2", t0())).await.unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn vanished_worker_requeues_processing_job() {
    let store = MemoryStateStore::new();
    store.put_job(Job::new("m-1", "s", JobStatus::Processing, t0()));
    let mut w = Worker::new("i-1", t0());
    w.assigned_job_id = Some(JobId::new("m-1"));
    store.put_worker(w);

    let removal = store.remove_vanished_worker(&WorkerId::new("i-1"), t0()).await.unwrap();
    assert_eq!(
        removal,
        VanishedRemoval {
            removed: true,
            requeued: Some(JobId::new("m-1")),
        }
    );
    assert_eq!(store.job_row("m-1").unwrap().job.status, JobStatus::Ready);
    assert!(store.worker("i-1").is_none());
}

#[tokio::test]
async fn vanished_removal_skips_leased_rows() {
    let store = MemoryStateStore::new();
    let mut w = Worker::new("i-1", t0());
    w.lease = Some(Lease {
        token: "cycle".to_string(),
        job_id: Some(JobId::new("m-1")),
        expires_at: t0() + minutes(10),
    });
    store.put_worker(w);

    let removal = store.remove_vanished_worker(&WorkerId::new("i-1"), t0()).await.unwrap();
    assert!(!removal.removed);
    assert!(store.worker("i-1").is_some());
}

#[tokio::test]
async fn injected_failures_fire_once() {
    let store = MemoryStateStore::new();
    store.fail_next("job");
    assert!(store.job(&JobId::new("m-1")).await.is_err());
    assert!(store.job(&JobId::new("m-1")).await.is_ok());
}

#[tokio::test]
async fn concurrent_claims_never_share_a_job() {
    let store = MemoryStateStore::new();
    for i in 0..5 {
        ready(&store, &format!("m-{i}"), t0() + minutes(i));
    }

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim_ready_job(&claim(&format!("t-{i}"), t0())).await.unwrap()
        }));
    }
    let mut claimed = Vec::new();
    for handle in handles {
        if let Some(id) = handle.await.unwrap() {
            claimed.push(id);
        }
    }
    claimed.sort();
    let before = claimed.len();
    claimed.dedup();
    assert_eq!(before, 5);
    assert_eq!(claimed.len(), 5);
}

#[tokio::test]
async fn fleet_stats_counts_rows() {
    let store = MemoryStateStore::new();
    ready(&store, "m-1", t0());
    store.put_job(Job::new("m-2", "s", JobStatus::Done, t0()));
    let mut idle = Worker::new("i-1", t0() - minutes(4));
    idle.last_activity = t0() - minutes(4);
    store.put_worker(idle);

    let stats = store.fleet_stats(t0()).await.unwrap();
    assert_eq!(stats.total_workers, 1);
    assert_eq!(stats.free_workers, 1);
    assert_eq!(stats.avg_idle_minutes, Some(4.0));
    assert_eq!(stats.jobs["ready"], 1);
    assert_eq!(stats.jobs["done"], 1);
}
