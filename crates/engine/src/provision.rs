// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provisioning client
//!
//! Launches instances with region fallback, waits for their address and
//! requests termination. Only a capacity shortage moves on to the next
//! region; any other launch error ends the attempt.

use crate::error::ProvisionError;
use tracing::{info, warn};
use vl_adapters::{CloudApi, CloudError, InstanceInfo, LaunchRequest};
use vl_core::config::{AddressConfig, ProviderConfig};
use vl_core::{retry, RetryError, RetryPolicy};

/// A freshly launched instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedInstance {
    pub instance_id: String,
    pub region: String,
}

pub struct Provisioner<A> {
    cloud: A,
    config: ProviderConfig,
    address_retry: RetryPolicy,
}

impl<A: CloudApi> Provisioner<A> {
    pub fn new(cloud: A, config: ProviderConfig, address: &AddressConfig) -> Self {
        Self {
            cloud,
            config,
            address_retry: address.retry,
        }
    }

    /// Launch one instance, trying each configured region in order
    pub async fn create_instance(&self) -> Result<LaunchedInstance, ProvisionError> {
        let mut last_shortage = None;

        for region in &self.config.regions {
            let request = self.launch_request(region);
            let result = retry(
                self.config.capacity_retry,
                "provider.launch",
                CloudError::is_capacity,
                |_| self.cloud.launch(&request),
            )
            .await;

            let error = match result {
                Ok(instance_id) => {
                    info!(%region, %instance_id, "instance launched");
                    return Ok(LaunchedInstance {
                        instance_id,
                        region: region.clone(),
                    });
                }
                Err(error) => error,
            };
            if !error.is_exhausted() {
                return Err(ProvisionError::Launch {
                    region: region.clone(),
                    error: error.into_inner(),
                });
            }
            warn!(%region, attempts = error.attempts(), "region out of capacity, trying next");
            last_shortage = Some(error.into_inner());
        }

        match last_shortage {
            Some(last) => Err(ProvisionError::CapacityExhausted {
                tried: self.config.regions.clone(),
                last,
            }),
            None => Err(ProvisionError::NoRegions),
        }
    }

    /// Wait for the provider to report a public address for the instance
    pub async fn resolve_address(&self, instance_id: &str) -> Result<String, ProvisionError> {
        self.resolve(instance_id, ProvisionError::is_transient).await
    }

    /// Address of an instance launched by an earlier cycle. A missing or
    /// terminated instance fails on the first lookup.
    pub async fn existing_address(&self, instance_id: &str) -> Result<String, ProvisionError> {
        self.resolve(instance_id, |e: &ProvisionError| {
            e.is_transient() && !e.is_instance_missing()
        })
        .await
    }

    async fn resolve<P>(&self, instance_id: &str, is_retryable: P) -> Result<String, ProvisionError>
    where
        P: Fn(&ProvisionError) -> bool,
    {
        let address = retry(
            self.address_retry,
            "provider.resolve_address",
            is_retryable,
            |_| self.lookup_address(instance_id),
        )
        .await
        .map_err(RetryError::into_inner)?;

        info!(%instance_id, %address, "address resolved");
        Ok(address)
    }

    /// Request termination. Never fails; returns whether the provider
    /// accepted the request.
    pub async fn terminate(&self, instance_id: &str) -> bool {
        match self.cloud.terminate(&[instance_id.to_string()]).await {
            Ok(()) => {
                info!(%instance_id, "termination requested");
                true
            }
            // Already gone
            Err(CloudError::Http { status: 404, .. }) => {
                info!(%instance_id, "instance already gone");
                true
            }
            Err(e) => {
                warn!(%instance_id, error = %e, "termination request failed");
                false
            }
        }
    }

    pub async fn list_instances(&self) -> Result<Vec<InstanceInfo>, CloudError> {
        self.cloud.list_instances().await
    }

    async fn lookup_address(&self, instance_id: &str) -> Result<String, ProvisionError> {
        let instances = self
            .cloud
            .list_instances()
            .await
            .map_err(ProvisionError::List)?;

        let info = instances
            .into_iter()
            .find(|i| i.id == instance_id)
            .ok_or_else(|| ProvisionError::InstanceNotFound(instance_id.to_string()))?;

        if info.is_terminated() {
            return Err(ProvisionError::InstanceGone {
                id: info.id,
                status: info.status,
            });
        }
        info.ip
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| ProvisionError::NoAddress(instance_id.to_string()))
    }

    fn launch_request(&self, region: &str) -> LaunchRequest {
        LaunchRequest {
            region_name: region.to_string(),
            instance_type_name: self.config.instance_type.clone(),
            ssh_key_names: vec![self.config.ssh_key_name.clone()],
            user_data: self.config.user_data.clone(),
        }
    }
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
