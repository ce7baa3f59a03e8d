// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! vl - GPU worker lease controller

mod adapters;
mod commands;
mod error;
mod logging;
mod output;

use clap::{Parser, Subcommand};
use commands::invoke::{CompleteArgs, InvokeArgs};
use commands::serve::ServeArgs;
use error::VlError;
use logging::LogFormat;
use output::{respond, OutputFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use vl_core::HandlerResponse;
use vl_engine::Invocation;

#[derive(Parser)]
#[command(
    name = "vl",
    version,
    about = "vmlease - assign queued jobs to leased GPU workers"
)]
struct Cli {
    /// Config file (TOML); built-in defaults when omitted
    #[arg(long, global = true, env = "VL_CONFIG")]
    config: Option<PathBuf>,

    /// Also append logs to this file
    #[arg(long, global = true, env = "VL_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Result output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one assignment cycle
    Cycle,
    /// Run the reclamation sweeper once
    Sweep,
    /// Print fleet statistics
    Stats,
    /// Record that a worker finished its job
    Complete(CompleteArgs),
    /// Dispatch a raw invocation event
    Invoke(InvokeArgs),
    /// Run assignment cycles on an interval until signalled
    Serve(ServeArgs),
    /// Apply database migrations
    Migrate,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match logging::setup(cli.log_file.as_deref(), cli.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: failed to set up logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<VlError>() {
                Some(err) => eprint!("{}", err),
                None => eprintln!("error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let format = cli.format;
    let config = commands::config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Config => {
            commands::config::show(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Migrate => {
            commands::config::migrate(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serve(args) => {
            commands::serve::serve(&config, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cycle => commands::invoke::dispatch(&config, Invocation::Cycle, format).await,
        Commands::Sweep => commands::invoke::dispatch(&config, Invocation::Sweep, format).await,
        Commands::Stats => commands::invoke::dispatch(&config, Invocation::Stats, format).await,
        Commands::Complete(args) => match args.invocation() {
            Ok(invocation) => commands::invoke::dispatch(&config, invocation, format).await,
            Err(e) => Ok(respond(&HandlerResponse::error(e), format)),
        },
        Commands::Invoke(args) => commands::invoke::handle_event(&config, &args.event, format).await,
    }
}
