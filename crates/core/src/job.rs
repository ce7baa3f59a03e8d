// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jobs: units of pending work, each processed by at most one worker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing status of a job
///
/// `NotReady` and `Ready` are written by the upstream producer. `Processing`
/// is written when an assignment commits and `Done` by the completion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    NotReady,
    Ready,
    Processing,
    Done,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::NotReady,
        JobStatus::Ready,
        JobStatus::Processing,
        JobStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotReady => "not_ready",
            JobStatus::Ready => "ready",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_ready" => Ok(JobStatus::NotReady),
            "ready" => Ok(JobStatus::Ready),
            "processing" => Ok(JobStatus::Processing),
            "done" => Ok(JobStatus::Done),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// A job row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Location of the input data (e.g. a stream link)
    pub source_reference: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        source_reference: impl Into<String>,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(id),
            source_reference: source_reference.into(),
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
