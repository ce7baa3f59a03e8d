// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: cloud API, remote shell, secret store

pub mod provider;
pub mod remote;
pub mod secrets;
pub mod traced;

pub use provider::{CloudApi, CloudError, InstanceInfo, LambdaCloud, LaunchRequest};
pub use remote::{
    CommandOutput, OpenSshOptions, OpenSshShell, RemoteError, RemoteShell, RemoteTarget,
};
pub use secrets::{
    ConfiguredSecretStore, DirSecretStore, EnvSecretStore, Secret, SecretError, SecretStore,
};
pub use traced::{TracedCloud, TracedShell};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use provider::{CloudCall, FakeCloud};
#[cfg(any(test, feature = "test-support"))]
pub use remote::{FakeShell, ShellCall};
#[cfg(any(test, feature = "test-support"))]
pub use secrets::FakeSecretStore;
