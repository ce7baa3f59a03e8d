// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use clap::ValueEnum;
use std::process::ExitCode;
use vl_core::HandlerResponse;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed result body
    #[default]
    Text,
    /// The `{statusCode, body}` envelope on one line
    Json,
}

/// Print a handler response and map its status onto the process exit code
pub fn respond(response: &HandlerResponse, format: OutputFormat) -> ExitCode {
    println!("{}", render(response, format));
    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

pub fn render(response: &HandlerResponse, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => serde_json::from_str::<serde_json::Value>(&response.body)
            .and_then(|body| serde_json::to_string_pretty(&body))
            .unwrap_or_else(|_| response.body.clone()),
        OutputFormat::Json => {
            serde_json::to_string(response).unwrap_or_else(|_| response.body.clone())
        }
    }
}
