// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vmlease engine: provisioning, remote preparation, assignment cycles,
//! sweeping and completion callbacks

mod completion;
mod coordinator;
mod engine;
mod error;
mod executor;
mod invoke;
mod provision;
mod sweeper;

#[cfg(test)]
mod testing;

pub use engine::{Engine, EngineDeps};
pub use error::{CompletionError, EngineError, LeaseError, ProvisionError, SequenceError};
pub use executor::{RemoteExecutor, StepResult};
pub use invoke::Invocation;
pub use provision::{LaunchedInstance, Provisioner};
