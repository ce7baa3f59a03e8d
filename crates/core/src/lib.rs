// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! vl-core: domain types for the vmlease controller
//!
//! This crate provides:
//! - Job and worker rows, claims and leases
//! - Clock and token generation seams for deterministic tests
//! - The shared retry utility
//! - Configuration, command templates, and result types

pub mod clock;
pub mod commands;
pub mod config;
pub mod id;
pub mod job;
pub mod outcome;
pub mod retry;
pub mod worker;

pub use clock::{Clock, FakeClock, SystemClock};
pub use commands::{CommandKind, CommandPlan, RemoteCommand, TemplateError};
pub use config::{Config, ConfigError, SecretBackend};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use job::{Job, JobId, JobStatus};
pub use outcome::{
    Assignment, Compensation, CompensationAction, CompletionReport, CycleFailure, CycleOutcome,
    FailureStage, FleetStats, HandlerResponse, PhaseError, SweepPhase, SweepReport,
};
pub use retry::{retry, RetryError, RetryPolicy};
pub use worker::{idle_cutoff, Lease, Worker, WorkerId};
