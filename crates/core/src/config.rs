// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller configuration
//!
//! Loaded once at process start from TOML and passed by reference into every
//! component. The file only names secrets; their values are fetched from the
//! secret store when needed.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub address: AddressConfig,
    pub ssh: SshConfig,
    pub sweeper: SweeperConfig,
    pub lease: LeaseConfig,
    pub commands: CommandsConfig,
    pub secrets: SecretsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Secret holding the connection URL (credentials included)
    pub url_secret: String,
    pub max_connections: u32,
    /// Retry policy for the initial connection
    pub connect_retry: RetryPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_secret: "DATABASE_URL".to_string(),
            max_connections: 5,
            connect_retry: RetryPolicy::new(3, Duration::from_secs(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Secret holding the provider API key
    pub api_key_secret: String,
    pub instance_type: String,
    /// Name of the SSH public key registered with the provider (not a secret)
    pub ssh_key_name: String,
    /// Candidate regions, tried in order
    pub regions: Vec<String>,
    /// Retries per region when the provider reports insufficient capacity
    pub capacity_retry: RetryPolicy,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Optional cloud-init payload passed at launch
    pub user_data: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cloud.lambda.ai/api/v1".to_string(),
            api_key_secret: "LAMBDA_CLOUD_API_KEY".to_string(),
            instance_type: "gpu_1x_h100_sxm5".to_string(),
            ssh_key_name: "vl-workers".to_string(),
            regions: vec![
                "us-south-2".to_string(),
                "us-east-1".to_string(),
                "us-east-2".to_string(),
            ],
            capacity_retry: RetryPolicy::new(3, Duration::from_secs(15)),
            request_timeout: Duration::from_secs(30),
            user_data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AddressConfig {
    /// Retry policy while the new instance has no address yet
    pub retry: RetryPolicy,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::new(30, Duration::from_secs(10)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshConfig {
    pub user: String,
    pub port: u16,
    /// Secret holding the private key material
    pub key_secret: String,
    /// Total time to wait for the shell to become reachable
    #[serde(with = "humantime_serde")]
    pub wait_budget: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Connect timeout for a single attempt
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Upper bound for each setup command
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl SshConfig {
    pub fn readiness_policy(&self) -> RetryPolicy {
        RetryPolicy::within(self.wait_budget, self.poll_interval)
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "ubuntu".to_string(),
            port: 22,
            key_secret: "VL_SSH_PRIVATE_KEY".to_string(),
            wait_budget: Duration::from_secs(300),
            poll_interval: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweeperConfig {
    /// Free workers idle strictly longer than this are terminated
    #[serde(with = "humantime_serde")]
    pub idle_threshold: Duration,
    /// Drop rows for instances the provider no longer reports
    pub reconcile_vanished: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(300),
            reconcile_vanished: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LeaseConfig {
    /// Lifetime of job claims and worker leases. Renewed before every
    /// remote step, so it must outlast the longest single step.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(45 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsConfig {
    /// Setup commands; a non-zero exit aborts the sequence
    pub setup: Vec<String>,
    /// Long-running processing command, started detached
    pub launch: String,
    /// Remote file receiving the launch command's output
    pub launch_log: String,
    /// Extra template variables
    pub vars: BTreeMap<String, String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(
            "repo_url".to_string(),
            "https://github.com/example/video-pipeline.git".to_string(),
        );
        vars.insert("git_ref".to_string(), "v1.1.0".to_string());

        Self {
            setup: vec![
                "mkdir -p ~/vl && nvidia-smi -L".to_string(),
                "test -d ~/pipeline/.git || git clone --quiet {{ repo_url | shquote }} ~/pipeline"
                    .to_string(),
                "cd ~/pipeline && git fetch --tags --quiet && git checkout --quiet {{ git_ref | shquote }}"
                    .to_string(),
                "cd ~/pipeline && pip install --quiet -r requirements.txt".to_string(),
            ],
            launch: "cd ~/pipeline && python3 server_main.py --match_id {{ job_id | shquote }} --m3u8_link {{ source_reference | shquote }} --folds all"
                .to_string(),
            launch_log: "~/vl/launch-{{ job_id | shquote }}.log".to_string(),
            vars,
        }
    }
}

/// Where secrets are resolved from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackend {
    /// Environment variable named after the secret
    #[default]
    Env,
    /// One file per secret inside `secrets.dir`
    Dir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    pub backend: SecretBackend,
    pub dir: PathBuf,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: SecretBackend::Env,
            dir: PathBuf::from("/run/secrets"),
        }
    }
}

impl Config {
    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.regions.is_empty() {
            return Err(ConfigError::Invalid(
                "provider.regions must list at least one region".to_string(),
            ));
        }
        if self.provider.regions.iter().any(|r| r.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "provider.regions contains an empty name".to_string(),
            ));
        }
        if self.commands.launch.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "commands.launch must not be empty".to_string(),
            ));
        }
        if self.provider.capacity_retry.max_attempts == 0 || self.address.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry policies need at least one attempt".to_string(),
            ));
        }
        if self.sweeper.idle_threshold.is_zero() {
            return Err(ConfigError::Invalid(
                "sweeper.idle_threshold must be positive".to_string(),
            ));
        }
        let longest = self.max_step_duration();
        if self.lease.ttl <= longest {
            return Err(ConfigError::Invalid(format!(
                "lease.ttl ({}s) must exceed the longest cycle step ({}s)",
                self.lease.ttl.as_secs(),
                longest.as_secs(),
            )));
        }
        Ok(())
    }

    /// Worst-case time a cycle can spend between two claim renewals
    pub fn max_step_duration(&self) -> Duration {
        let request = self.provider.request_timeout;
        let lookups = |policy: RetryPolicy| {
            policy
                .budget()
                .saturating_add(request.saturating_mul(policy.max_attempts))
        };
        let regions = u32::try_from(self.provider.regions.len()).unwrap_or(u32::MAX);

        // A vanished reused worker costs one lookup before provisioning
        let provision = request.saturating_add(
            lookups(self.provider.capacity_retry).saturating_mul(regions),
        );
        let address = lookups(self.address.retry);

        // Probes, then opening the command session
        let readiness = self.ssh.readiness_policy();
        let reachability = readiness.budget().saturating_add(
            self.ssh
                .connect_timeout
                .saturating_mul(readiness.max_attempts.saturating_add(1)),
        );
        let command = self
            .ssh
            .command_timeout
            .saturating_add(self.ssh.connect_timeout);

        provision.max(address).max(reachability).max(command)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
