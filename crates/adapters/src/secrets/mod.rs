// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret store adapters
//!
//! Credentials (database URL, provider API key, remote-shell key) are looked
//! up by name when needed and carried in [`Secret`], which never prints its
//! contents.

mod dir;
mod env;

pub use dir::DirSecretStore;
pub use env::EnvSecretStore;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSecretStore;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use vl_core::config::{SecretBackend, SecretsConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),
    #[error("invalid secret name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("failed to read secret {name}: {message}")]
    Io { name: String, message: String },
}

/// Secret material; `Debug` is redacted and there is no `Display`
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Adapter for looking up secrets by name
#[async_trait]
pub trait SecretStore: Clone + Send + Sync + 'static {
    async fn get_secret(&self, name: &str) -> Result<Secret, SecretError>;
}

/// Secret store selected by `[secrets]` configuration
#[derive(Debug, Clone)]
pub enum ConfiguredSecretStore {
    Env(EnvSecretStore),
    Dir(DirSecretStore),
}

impl ConfiguredSecretStore {
    pub fn from_config(config: &SecretsConfig) -> Self {
        match config.backend {
            SecretBackend::Env => Self::Env(EnvSecretStore::new()),
            SecretBackend::Dir => Self::Dir(DirSecretStore::new(&config.dir)),
        }
    }
}

#[async_trait]
impl SecretStore for ConfiguredSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Secret, SecretError> {
        match self {
            Self::Env(store) => store.get_secret(name).await,
            Self::Dir(store) => store.get_secret(name).await,
        }
    }
}

fn validate_name(name: &str) -> Result<(), SecretError> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
        "must be a plain name"
    } else {
        return Ok(());
    };
    Err(SecretError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
