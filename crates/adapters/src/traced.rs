// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::provider::{CloudApi, CloudError, InstanceInfo, LaunchRequest};
use crate::remote::{CommandOutput, RemoteError, RemoteShell, RemoteTarget};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::Instrument;

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Wrapper that adds tracing to any CloudApi
#[derive(Clone)]
pub struct TracedCloud<A> {
    inner: A,
}

impl<A> TracedCloud<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<A: CloudApi> CloudApi for TracedCloud<A> {
    async fn launch(&self, request: &LaunchRequest) -> Result<String, CloudError> {
        let span = tracing::info_span!(
            "cloud.launch",
            region = %request.region_name,
            instance_type = %request.instance_type_name
        );
        async {
            tracing::info!("launching");
            let start = Instant::now();
            let result = self.inner.launch(request).await;
            match &result {
                Ok(instance_id) => {
                    tracing::info!(instance_id, elapsed_ms = elapsed_ms(start), "launched")
                }
                Err(e) if e.is_capacity() => {
                    tracing::warn!(elapsed_ms = elapsed_ms(start), error = %e, "no capacity")
                }
                Err(e) => tracing::error!(elapsed_ms = elapsed_ms(start), error = %e, "launch failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn list_instances(&self) -> Result<Vec<InstanceInfo>, CloudError> {
        let start = Instant::now();
        let result = self.inner.list_instances().await;
        match &result {
            Ok(instances) => tracing::debug!(
                count = instances.len(),
                elapsed_ms = elapsed_ms(start),
                "listed instances"
            ),
            Err(e) => tracing::warn!(error = %e, "list instances failed"),
        }
        result
    }

    async fn terminate(&self, instance_ids: &[String]) -> Result<(), CloudError> {
        let span = tracing::info_span!("cloud.terminate", instance_ids = ?instance_ids);
        async {
            let start = Instant::now();
            let result = self.inner.terminate(instance_ids).await;
            match &result {
                Ok(()) => tracing::info!(elapsed_ms = elapsed_ms(start), "termination requested"),
                Err(e) => tracing::error!(elapsed_ms = elapsed_ms(start), error = %e, "terminate failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any RemoteShell
#[derive(Clone)]
pub struct TracedShell<S> {
    inner: S,
}

impl<S> TracedShell<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: RemoteShell> RemoteShell for TracedShell<S> {
    async fn probe(&self, host: &str, port: u16) -> Result<(), RemoteError> {
        let result = self.inner.probe(host, port).await;
        tracing::trace!(host, port, reachable = result.is_ok(), "probed");
        result
    }

    async fn open(&self, target: &RemoteTarget) -> Result<String, RemoteError> {
        let span = tracing::info_span!("shell.open", host = %target.host, user = %target.user);
        async {
            let start = Instant::now();
            let result = self.inner.open(target).await;
            match &result {
                Ok(session) => {
                    tracing::info!(session, elapsed_ms = elapsed_ms(start), "session opened")
                }
                Err(e) => tracing::error!(elapsed_ms = elapsed_ms(start), error = %e, "open failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn exec(
        &self,
        session: &str,
        script: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, RemoteError> {
        let span = tracing::info_span!("shell.exec", session);
        async {
            tracing::debug!(script, "running");
            let start = Instant::now();
            let result = self.inner.exec(session, script, timeout).await;
            match &result {
                Ok(output) if output.success() => {
                    tracing::info!(elapsed_ms = elapsed_ms(start), "command succeeded")
                }
                Ok(output) => tracing::warn!(
                    exit_code = ?output.exit_code,
                    elapsed_ms = elapsed_ms(start),
                    stderr = output.stderr.trim(),
                    "command failed"
                ),
                Err(e) => tracing::error!(elapsed_ms = elapsed_ms(start), error = %e, "exec failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn spawn_detached(&self, session: &str, script: &str) -> Result<(), RemoteError> {
        let span = tracing::info_span!("shell.spawn_detached", session);
        async {
            tracing::debug!(script, "dispatching");
            let result = self.inner.spawn_detached(session, script).await;
            match &result {
                Ok(()) => tracing::info!("dispatched"),
                Err(e) => tracing::error!(error = %e, "dispatch failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn close(&self, session: &str) -> Result<(), RemoteError> {
        let result = self.inner.close(session).await;
        // closing an already-dead session is expected after failures
        match &result {
            Ok(()) => tracing::debug!(session, "session closed"),
            Err(e) => tracing::warn!(session, error = %e, "close failed"),
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
