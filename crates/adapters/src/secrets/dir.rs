// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{validate_name, Secret, SecretError, SecretStore};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Reads each secret from a file named after it (e.g. mounted secrets)
///
/// A single trailing newline is stripped; other whitespace is kept so key
/// material survives unchanged.
#[derive(Debug, Clone)]
pub struct DirSecretStore {
    dir: PathBuf,
}

impl DirSecretStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl SecretStore for DirSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Secret, SecretError> {
        validate_name(name)?;
        let path = self.dir.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(mut value) => {
                if value.ends_with('\n') {
                    value.pop();
                    if value.ends_with('\r') {
                        value.pop();
                    }
                }
                Ok(Secret::new(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SecretError::NotFound(name.to_string()))
            }
            Err(e) => Err(SecretError::Io {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
