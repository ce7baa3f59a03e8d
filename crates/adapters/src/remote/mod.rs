// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote shell adapters
//!
//! A session is opened once per command sequence and addressed by the id
//! returned from [`RemoteShell::open`]. Implementations must release every
//! resource tied to a session in [`RemoteShell::close`].

mod openssh;

pub use openssh::{OpenSshOptions, OpenSshShell};

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeShell, ShellCall};

use crate::secrets::Secret;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{host} not reachable: {reason}")]
    Unreachable { host: String, reason: String },
    #[error("failed to open session to {host}: {reason}")]
    ConnectFailed { host: String, reason: String },
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("remote shell error: {0}")]
    Io(String),
}

/// Where and as whom to open a session
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key: Secret,
}

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the command was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Adapter for executing commands on a worker
#[async_trait]
pub trait RemoteShell: Clone + Send + Sync + 'static {
    /// One lightweight reachability check; needs no credentials
    async fn probe(&self, host: &str, port: u16) -> Result<(), RemoteError>;

    /// Open a session, returning its id
    async fn open(&self, target: &RemoteTarget) -> Result<String, RemoteError>;

    /// Run a command to completion, capturing output
    async fn exec(
        &self,
        session: &str,
        script: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, RemoteError>;

    /// Start a command that outlives the session; its exit is not observed
    async fn spawn_detached(&self, session: &str, script: &str) -> Result<(), RemoteError>;

    /// Close the session; closing an unknown session is not an error
    async fn close(&self, session: &str) -> Result<(), RemoteError>;
}
