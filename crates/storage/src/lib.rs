// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! vl-storage: persistence for jobs and workers
//!
//! [`StateStore`] is the port the engine talks to. [`PgStateStore`] is the
//! production implementation; [`MemoryStateStore`] backs tests.

mod memory;
mod postgres;
mod store;

pub use memory::{JobRow, MemoryStateStore};
pub use postgres::PgStateStore;
pub use store::{Claim, Commit, StateStore, StoreError, VanishedRemoval};
