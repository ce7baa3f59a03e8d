// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled mode: run an assignment cycle on a fixed interval

use crate::adapters::make_engine;
use clap::Args;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use vl_core::{Config, CycleOutcome};

#[derive(Args)]
pub struct ServeArgs {
    /// Time between assignment cycles
    #[arg(long, default_value = "1m", value_parser = humantime::parse_duration)]
    pub interval: Duration,
}

/// Loop until SIGINT or SIGTERM. A cycle in flight finishes before the
/// signal is acted on.
pub async fn serve(config: &Config, args: ServeArgs) -> anyhow::Result<()> {
    let engine = make_engine(config).await?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut ticker = tokio::time::interval(args.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval = %humantime::format_duration(args.interval),
        "serving assignment cycles"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = engine.run_assignment_cycle().await;
                if let CycleOutcome::NoWork { cleanup } = &outcome {
                    if cleanup.has_errors() {
                        warn!(
                            errors = cleanup.errors.len(),
                            termination_failed = cleanup.termination_failed.len(),
                            "cleanup reported errors"
                        );
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    Ok(())
}
