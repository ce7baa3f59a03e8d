// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud VM provisioning adapters

mod lambda;

pub use lambda::LambdaCloud;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{CloudCall, FakeCloud};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the provisioning API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    /// The region has no capacity for the requested instance type
    #[error("insufficient capacity in {region}: {message}")]
    InsufficientCapacity { region: String, message: String },
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl CloudError {
    pub fn is_capacity(&self) -> bool {
        matches!(self, CloudError::InsufficientCapacity { .. })
    }
}

/// Launch parameters for one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub region_name: String,
    pub instance_type_name: String,
    pub ssh_key_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// An instance as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub id: String,
    /// Public address; absent while the instance is booting
    #[serde(default)]
    pub ip: Option<String>,
    pub status: String,
}

impl InstanceInfo {
    pub fn is_terminated(&self) -> bool {
        matches!(self.status.as_str(), "terminated" | "terminating")
    }
}

/// Adapter for the cloud VM API
#[async_trait]
pub trait CloudApi: Clone + Send + Sync + 'static {
    /// Launch one instance, returning its id
    async fn launch(&self, request: &LaunchRequest) -> Result<String, CloudError>;

    /// List all instances visible to the account
    async fn list_instances(&self) -> Result<Vec<InstanceInfo>, CloudError>;

    /// Request termination of the given instances
    async fn terminate(&self, instance_ids: &[String]) -> Result<(), CloudError>;
}
