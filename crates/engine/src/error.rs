// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use thiserror::Error;
use vl_adapters::{CloudError, RemoteError};
use vl_core::JobId;
use vl_storage::StoreError;

/// Errors from launching or locating an instance
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("no candidate regions configured")]
    NoRegions,
    /// Every region reported insufficient capacity on every attempt
    #[error("no capacity in any region (tried {}): {last}", .tried.join(", "))]
    CapacityExhausted { tried: Vec<String>, last: CloudError },
    #[error("launch failed in {region}: {error}")]
    Launch { region: String, error: CloudError },
    #[error("instance {0} not found")]
    InstanceNotFound(String),
    #[error("instance {0} has no address yet")]
    NoAddress(String),
    #[error("instance {id} is {status}")]
    InstanceGone { id: String, status: String },
    #[error("failed to list instances: {0}")]
    List(CloudError),
}

impl ProvisionError {
    /// Conditions worth another address lookup
    pub fn is_transient(&self) -> bool {
        match self {
            ProvisionError::InstanceNotFound(_) | ProvisionError::NoAddress(_) => true,
            ProvisionError::List(CloudError::Transport(_)) => true,
            ProvisionError::List(CloudError::Http { status, .. }) => *status >= 500,
            _ => false,
        }
    }

    /// The provider no longer runs the instance
    pub fn is_instance_missing(&self) -> bool {
        matches!(
            self,
            ProvisionError::InstanceNotFound(_) | ProvisionError::InstanceGone { .. }
        )
    }
}

/// The cycle no longer holds its job claim and worker lease
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    #[error("job claim or worker lease no longer held")]
    Lost,
    #[error("failed to renew claim: {0}")]
    Store(#[from] StoreError),
}

/// Why a remote command sequence stopped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("failed to open session: {0}")]
    Connect(RemoteError),
    #[error("{label} exited with {}: {stderr}", describe_exit(.exit_code))]
    CommandFailed {
        label: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{label} failed: {error}")]
    Remote { label: String, error: RemoteError },
    /// Checked before each command; nothing further runs once lost
    #[error("before {label}: {error}")]
    Lease { label: String, error: LeaseError },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error("missing or empty {0}")]
    MissingField(&'static str),
    #[error("job not found: {0}")]
    UnknownJob(JobId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by the invocation entry points
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
