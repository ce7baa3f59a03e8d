// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workers: leasable GPU instances and their short-lived claims
//!
//! A worker is *free* while `assigned_job_id` is empty. Independently of the
//! assignment, a worker may carry a [`Lease`]: a time-bounded reservation taken
//! by one cycle (or by the sweeper) so no other invocation selects it. A lease
//! never counts as an assignment.

use crate::job::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique identifier for a worker (the provider's instance id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A time-bounded reservation on a worker row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub token: String,
    /// Job the holder intends to run; `None` for sweeper retirement leases
    pub job_id: Option<JobId>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// A worker row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub assigned_job_id: Option<JobId>,
    pub lease: Option<Lease>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Worker {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: WorkerId::new(id),
            assigned_job_id: None,
            lease: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_free(&self) -> bool {
        self.assigned_job_id.is_none()
    }

    pub fn is_leased(&self, now: DateTime<Utc>) -> bool {
        self.lease.as_ref().is_some_and(|l| l.is_live(now))
    }

    /// Free, unleased and last active strictly before `cutoff`
    pub fn is_idle(&self, now: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
        self.is_free() && !self.is_leased(now) && self.last_activity < cutoff
    }
}

/// Workers whose `last_activity` is strictly before this instant are idle
pub fn idle_cutoff(now: DateTime<Utc>, threshold: Duration) -> DateTime<Utc> {
    let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
    now.checked_sub_signed(threshold)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
