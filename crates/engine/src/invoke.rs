// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event dispatch
//!
//! | event                            | invocation |
//! |----------------------------------|------------|
//! | `{}` or `{"action": "cycle"}`    | [`Invocation::Cycle`] |
//! | `{"cleanup_only": true}`         | [`Invocation::Sweep`] |
//! | `{"stats": true}`                | [`Invocation::Stats`] |
//! | `{"job_id": …, "worker_id": …}`  | [`Invocation::Complete`] |
//!
//! Completion parameters are validated while parsing, so a malformed
//! callback is rejected before any store is touched.

use crate::engine::Engine;
use crate::error::{CompletionError, EngineError};
use serde_json::{Map, Value};
use tracing::error;
use vl_adapters::{CloudApi, RemoteShell, SecretStore};
use vl_core::{Clock, HandlerResponse, IdGen};
use vl_storage::StateStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Cycle,
    Sweep,
    Stats,
    Complete { job_id: String, worker_id: String },
}

impl Invocation {
    /// Parse event JSON text; blank text is an empty event
    pub fn from_json(text: &str) -> Result<Self, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Invocation::Cycle);
        }
        let event: Value =
            serde_json::from_str(text).map_err(|e| EngineError::InvalidEvent(e.to_string()))?;
        Self::from_event(&event)
    }

    pub fn from_event(event: &Value) -> Result<Self, EngineError> {
        let fields = match event {
            Value::Null => return Ok(Invocation::Cycle),
            Value::Object(fields) => fields,
            _ => {
                return Err(EngineError::InvalidEvent(
                    "event must be a JSON object".to_string(),
                ))
            }
        };

        if fields.contains_key("job_id") || fields.contains_key("worker_id") {
            return Ok(Invocation::Complete {
                job_id: id_field(fields, "job_id")?,
                worker_id: id_field(fields, "worker_id")?,
            });
        }
        if flag(fields, "cleanup_only") {
            return Ok(Invocation::Sweep);
        }
        if flag(fields, "stats") {
            return Ok(Invocation::Stats);
        }

        match fields.get("action") {
            None | Some(Value::Null) => Ok(Invocation::Cycle),
            Some(Value::String(action)) => match action.as_str() {
                "cycle" => Ok(Invocation::Cycle),
                "sweep" | "cleanup" => Ok(Invocation::Sweep),
                "stats" => Ok(Invocation::Stats),
                "complete" => Err(CompletionError::MissingField("job_id").into()),
                other => Err(EngineError::UnknownAction(other.to_string())),
            },
            Some(_) => Err(EngineError::InvalidEvent(
                "action must be a string".to_string(),
            )),
        }
    }
}

fn id_field(fields: &Map<String, Value>, name: &'static str) -> Result<String, EngineError> {
    match fields.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(CompletionError::MissingField(name).into()),
    }
}

fn flag(fields: &Map<String, Value>, name: &str) -> bool {
    fields.get(name).and_then(Value::as_bool).unwrap_or(false)
}

impl<S, A, R, K, C, I> Engine<S, A, R, K, C, I>
where
    S: StateStore,
    A: CloudApi,
    R: RemoteShell,
    K: SecretStore,
    C: Clock,
    I: IdGen,
{
    /// Run an invocation and wrap its result for the caller
    pub async fn handle(&self, invocation: Invocation) -> HandlerResponse {
        match invocation {
            Invocation::Cycle => HandlerResponse::from_cycle(&self.run_assignment_cycle().await),
            Invocation::Sweep => {
                let report = self.sweep().await;
                let failed = report.has_errors();
                let body = serde_json::json!({ "cleanup": report });
                if failed {
                    HandlerResponse::failure(&body)
                } else {
                    HandlerResponse::ok(&body)
                }
            }
            Invocation::Stats => match self.fleet_stats().await {
                Ok(stats) => HandlerResponse::ok(&stats),
                Err(e) => {
                    error!(error = %e, "failed to read fleet stats");
                    HandlerResponse::error(e)
                }
            },
            Invocation::Complete { job_id, worker_id } => {
                match self.on_processing_complete(&job_id, &worker_id).await {
                    Ok(report) => HandlerResponse::ok(&report),
                    Err(e) => {
                        error!(%job_id, %worker_id, error = %e, "completion failed");
                        HandlerResponse::error(e)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "invoke_tests.rs"]
mod tests;
