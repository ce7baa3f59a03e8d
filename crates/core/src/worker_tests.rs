// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use proptest::prelude::*;

const FIVE_MINUTES: Duration = Duration::from_secs(300);

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
}

#[test]
fn new_worker_is_free_and_unleased() {
    let worker = Worker::new("i-1", base());
    assert!(worker.is_free());
    assert!(!worker.is_leased(base()));
}

#[test]
fn exactly_at_threshold_is_not_idle() {
    let now = base();
    let mut worker = Worker::new("i-1", now);
    worker.last_activity = now - chrono::Duration::minutes(5);
    assert!(!worker.is_idle(now, idle_cutoff(now, FIVE_MINUTES)));
}

#[test]
fn one_microsecond_past_threshold_is_idle() {
    let now = base();
    let mut worker = Worker::new("i-1", now);
    worker.last_activity = now - chrono::Duration::minutes(5) - chrono::Duration::microseconds(1);
    assert!(worker.is_idle(now, idle_cutoff(now, FIVE_MINUTES)));
}

#[test]
fn assigned_worker_is_never_idle() {
    let now = base();
    let mut worker = Worker::new("i-1", now - chrono::Duration::hours(2));
    worker.assigned_job_id = Some(JobId::new("m-1"));
    assert!(!worker.is_idle(now, idle_cutoff(now, FIVE_MINUTES)));
}

#[test]
fn live_lease_protects_idle_worker() {
    let now = base();
    let mut worker = Worker::new("i-1", now - chrono::Duration::hours(2));
    worker.lease = Some(Lease {
        token: "t".into(),
        job_id: None,
        expires_at: now + chrono::Duration::seconds(1),
    });
    assert!(!worker.is_idle(now, idle_cutoff(now, FIVE_MINUTES)));

    // expired leases do not
    worker.lease = Some(Lease {
        token: "t".into(),
        job_id: None,
        expires_at: now,
    });
    assert!(worker.is_idle(now, idle_cutoff(now, FIVE_MINUTES)));
}

proptest! {
    #[test]
    fn idle_iff_strictly_older_than_cutoff(offset_us in -1_000_000i64..1_000_000i64) {
        let now = base();
        let mut worker = Worker::new("i-1", now);
        worker.last_activity = idle_cutoff(now, FIVE_MINUTES) + chrono::Duration::microseconds(offset_us);
        prop_assert_eq!(worker.is_idle(now, idle_cutoff(now, FIVE_MINUTES)), offset_us < 0);
    }
}
