// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot invocations: cycle, sweep, stats, complete, invoke

use crate::adapters::make_engine;
use crate::output::{respond, OutputFormat};
use clap::Args;
use std::process::ExitCode;
use vl_core::{Config, HandlerResponse};
use vl_engine::Invocation;

#[derive(Args)]
pub struct CompleteArgs {
    /// Job that finished processing
    #[arg(long)]
    pub job_id: String,
    /// Worker that processed it
    #[arg(long)]
    pub worker_id: String,
}

#[derive(Args)]
pub struct InvokeArgs {
    /// Event JSON, as delivered by a scheduler or webhook
    #[arg(long, default_value = "")]
    pub event: String,
}

impl CompleteArgs {
    /// Validated before any connection is made
    pub fn invocation(&self) -> Result<Invocation, vl_engine::EngineError> {
        Invocation::from_event(&serde_json::json!({
            "job_id": self.job_id,
            "worker_id": self.worker_id,
        }))
    }
}

/// Parse an event and dispatch it; malformed events fail before the
/// database is touched.
pub async fn handle_event(
    config: &Config,
    event: &str,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    match Invocation::from_json(event) {
        Ok(invocation) => dispatch(config, invocation, format).await,
        Err(e) => Ok(respond(&HandlerResponse::error(e), format)),
    }
}

pub async fn dispatch(
    config: &Config,
    invocation: Invocation,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let engine = make_engine(config).await?;
    let response = engine.handle(invocation).await;
    Ok(respond(&response, format))
}
