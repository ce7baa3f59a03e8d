// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote executor
//!
//! Waits for a worker's shell to answer, then runs a [`CommandPlan`] over a
//! single session: setup commands in order (first failure stops the run),
//! then the launch command detached. The session is always closed.

use crate::error::{LeaseError, SequenceError};
use serde::Serialize;
use std::future::Future;
use tracing::{debug, info, warn};
use vl_adapters::{RemoteError, RemoteShell, RemoteTarget, Secret};
use vl_core::config::SshConfig;
use vl_core::{retry, CommandKind, CommandPlan, RemoteCommand, RetryError};

/// Lines of stderr kept from a failed command
const STDERR_TAIL_LINES: usize = 20;

/// What happened to one command of a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub label: String,
    /// `None` for the detached launch, whose exit is never observed
    pub exit_code: Option<i32>,
    pub detached: bool,
}

pub struct RemoteExecutor<R> {
    shell: R,
    config: SshConfig,
}

impl<R: RemoteShell> RemoteExecutor<R> {
    pub fn new(shell: R, config: SshConfig) -> Self {
        Self { shell, config }
    }

    /// Probe `address` every poll interval until it answers or the wait
    /// budget is spent. Returns the number of probes made.
    pub async fn wait_until_reachable(&self, address: &str) -> Result<u32, RemoteError> {
        let port = self.config.port;

        let attempts = retry(
            self.config.readiness_policy(),
            "shell.reachable",
            |_: &RemoteError| true,
            |attempt| async move { self.shell.probe(address, port).await.map(|()| attempt) },
        )
        .await
        .map_err(RetryError::into_inner)?;

        info!(%address, attempts, "shell reachable");
        Ok(attempts)
    }

    /// Run the plan over one session authenticated with `credential`.
    /// `still_held` is awaited before every command; an error stops the
    /// sequence before that command starts.
    pub async fn run_sequence<G, F>(
        &self,
        address: &str,
        credential: &Secret,
        plan: &CommandPlan,
        still_held: G,
    ) -> Result<Vec<StepResult>, SequenceError>
    where
        G: Fn() -> F,
        F: Future<Output = Result<(), LeaseError>>,
    {
        let target = RemoteTarget {
            host: address.to_string(),
            port: self.config.port,
            user: self.config.user.clone(),
            key: credential.clone(),
        };
        let session = self
            .shell
            .open(&target)
            .await
            .map_err(SequenceError::Connect)?;

        let result = self.run_steps(&session, plan, still_held).await;

        if let Err(e) = self.shell.close(&session).await {
            warn!(%address, error = %e, "failed to close session");
        }
        result
    }

    async fn run_steps<G, F>(
        &self,
        session: &str,
        plan: &CommandPlan,
        still_held: G,
    ) -> Result<Vec<StepResult>, SequenceError>
    where
        G: Fn() -> F,
        F: Future<Output = Result<(), LeaseError>>,
    {
        let mut steps = Vec::with_capacity(plan.setup.len() + 1);

        for command in plan.iter() {
            still_held().await.map_err(|error| SequenceError::Lease {
                label: command.label.clone(),
                error,
            })?;
            let step = match command.kind {
                CommandKind::Setup => self.run_setup(session, command).await?,
                CommandKind::Launch => self.start_launch(session, command).await?,
            };
            steps.push(step);
        }
        Ok(steps)
    }

    async fn run_setup(
        &self,
        session: &str,
        command: &RemoteCommand,
    ) -> Result<StepResult, SequenceError> {
        info!(label = %command.label, "running setup command");
        let output = self
            .shell
            .exec(session, &command.script, self.config.command_timeout)
            .await
            .map_err(|error| SequenceError::Remote {
                label: command.label.clone(),
                error,
            })?;
        debug!(label = %command.label, stdout = %output.stdout, "setup command output");

        if !output.success() {
            return Err(SequenceError::CommandFailed {
                label: command.label.clone(),
                exit_code: output.exit_code,
                stderr: tail(&output.stderr, STDERR_TAIL_LINES),
            });
        }
        Ok(StepResult {
            label: command.label.clone(),
            exit_code: output.exit_code,
            detached: false,
        })
    }

    async fn start_launch(
        &self,
        session: &str,
        command: &RemoteCommand,
    ) -> Result<StepResult, SequenceError> {
        self.shell
            .spawn_detached(session, &command.script)
            .await
            .map_err(|error| SequenceError::Remote {
                label: command.label.clone(),
                error,
            })?;
        info!(label = %command.label, "launch command started");

        Ok(StepResult {
            label: command.label.clone(),
            exit_code: None,
            detached: true,
        })
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
