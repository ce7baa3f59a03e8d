// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion callback from a worker that finished its job

use crate::engine::Engine;
use crate::error::CompletionError;
use tracing::info;
use vl_adapters::{CloudApi, RemoteShell, SecretStore};
use vl_core::{Clock, CompletionReport, IdGen, JobId, WorkerId};
use vl_storage::StateStore;

impl<S, A, R, K, C, I> Engine<S, A, R, K, C, I>
where
    S: StateStore,
    A: CloudApi,
    R: RemoteShell,
    K: SecretStore,
    C: Clock,
    I: IdGen,
{
    /// Mark the job done and free the worker if it still holds the job.
    /// Repeating the call changes nothing.
    pub async fn on_processing_complete(
        &self,
        job_id: &str,
        worker_id: &str,
    ) -> Result<CompletionReport, CompletionError> {
        let job_id = JobId::new(required("job_id", job_id)?);
        let worker_id = WorkerId::new(required("worker_id", worker_id)?);

        let report = self
            .store
            .complete_job(&job_id, &worker_id, self.clock.now())
            .await?
            .ok_or_else(|| CompletionError::UnknownJob(job_id.clone()))?;

        info!(
            %job_id,
            %worker_id,
            job_marked_done = report.job_marked_done,
            worker_freed = report.worker_freed,
            "processing complete"
        );
        Ok(report)
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, CompletionError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CompletionError::MissingField(field));
    }
    Ok(value)
}

#[cfg(test)]
#[path = "completion_tests.rs"]
mod tests;
