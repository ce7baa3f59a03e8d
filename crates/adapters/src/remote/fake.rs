// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake remote shell for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CommandOutput, RemoteError, RemoteShell, RemoteTarget};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ExecHook = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Recorded shell call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCall {
    Probe { host: String },
    Open { host: String, user: String },
    Exec { session: String, script: String },
    SpawnDetached { session: String, script: String },
    Close { session: String },
}

struct FakeShellState {
    /// Failed probes before the host answers; `None` never answers
    reachable_after: Option<u32>,
    probes: u32,
    open_error: Option<RemoteError>,
    /// Scripts containing the pattern return this output
    outputs: Vec<(String, CommandOutput)>,
    errors: Vec<(String, RemoteError)>,
    /// Awaited before a matching script runs
    hooks: Vec<(String, ExecHook)>,
    open: HashSet<String>,
    next_id: u64,
    calls: Vec<ShellCall>,
}

impl Default for FakeShellState {
    fn default() -> Self {
        Self {
            reachable_after: Some(0),
            probes: 0,
            open_error: None,
            outputs: Vec::new(),
            errors: Vec::new(),
            hooks: Vec::new(),
            open: HashSet::new(),
            next_id: 0,
            calls: Vec::new(),
        }
    }
}

/// In-memory shell: reachable at once and every command exits 0 unless scripted
#[derive(Clone, Default)]
pub struct FakeShell {
    inner: Arc<Mutex<FakeShellState>>,
}

impl FakeShell {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeShellState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<ShellCall> {
        self.state().calls.clone()
    }

    pub fn never_reachable(&self) {
        self.state().reachable_after = None;
    }

    pub fn reachable_after(&self, failed_probes: u32) {
        self.state().reachable_after = Some(failed_probes);
    }

    pub fn fail_open(&self, error: RemoteError) {
        self.state().open_error = Some(error);
    }

    /// Commands containing `pattern` exit with `exit_code`
    pub fn fail_command(&self, pattern: &str, exit_code: i32) {
        self.state().outputs.push((
            pattern.to_string(),
            CommandOutput {
                exit_code: Some(exit_code),
                stdout: String::new(),
                stderr: format!("{} failed", pattern),
            },
        ));
    }

    /// Commands containing `pattern` fail at the transport level
    pub fn error_command(&self, pattern: &str, error: RemoteError) {
        self.state().errors.push((pattern.to_string(), error));
    }

    /// Run `hook` whenever a command containing `pattern` executes, before
    /// its output is produced
    pub fn on_exec<F, Fut>(&self, pattern: &str, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: ExecHook =
            Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(hook()) });
        self.state().hooks.push((pattern.to_string(), hook));
    }

    pub fn probe_count(&self) -> u32 {
        self.state().probes
    }

    /// Scripts run to completion, in order
    pub fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ShellCall::Exec { script, .. } => Some(script),
                _ => None,
            })
            .collect()
    }

    pub fn detached(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ShellCall::SpawnDetached { script, .. } => Some(script),
                _ => None,
            })
            .collect()
    }

    /// Sessions opened but not yet closed
    pub fn open_sessions(&self) -> usize {
        self.state().open.len()
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn probe(&self, host: &str, _port: u16) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.calls.push(ShellCall::Probe {
            host: host.to_string(),
        });
        state.probes += 1;
        match state.reachable_after {
            Some(n) if state.probes > n => Ok(()),
            _ => Err(RemoteError::Unreachable {
                host: host.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }

    async fn open(&self, target: &RemoteTarget) -> Result<String, RemoteError> {
        let mut state = self.state();
        state.calls.push(ShellCall::Open {
            host: target.host.clone(),
            user: target.user.clone(),
        });
        if let Some(error) = state.open_error.clone() {
            return Err(error);
        }
        state.next_id += 1;
        let id = format!("fake-session-{}", state.next_id);
        state.open.insert(id.clone());
        Ok(id)
    }

    async fn exec(
        &self,
        session: &str,
        script: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, RemoteError> {
        let hook = self
            .state()
            .hooks
            .iter()
            .find(|(p, _)| script.contains(p.as_str()))
            .map(|(_, hook)| Arc::clone(hook));
        if let Some(hook) = hook {
            hook().await;
        }

        let mut state = self.state();
        state.calls.push(ShellCall::Exec {
            session: session.to_string(),
            script: script.to_string(),
        });
        if !state.open.contains(session) {
            return Err(RemoteError::SessionNotFound(session.to_string()));
        }
        if let Some((_, error)) = state.errors.iter().find(|(p, _)| script.contains(p.as_str())) {
            return Err(error.clone());
        }
        Ok(state
            .outputs
            .iter()
            .find(|(p, _)| script.contains(p.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or(CommandOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }))
    }

    async fn spawn_detached(&self, session: &str, script: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.calls.push(ShellCall::SpawnDetached {
            session: session.to_string(),
            script: script.to_string(),
        });
        if !state.open.contains(session) {
            return Err(RemoteError::SessionNotFound(session.to_string()));
        }
        if let Some((_, error)) = state.errors.iter().find(|(p, _)| script.contains(p.as_str())) {
            return Err(error.clone());
        }
        Ok(())
    }

    async fn close(&self, session: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.calls.push(ShellCall::Close {
            session: session.to_string(),
        });
        state.open.remove(session);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
