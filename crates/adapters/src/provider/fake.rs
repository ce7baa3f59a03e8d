// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake cloud API for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CloudApi, CloudError, InstanceInfo, LaunchRequest};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Recorded cloud call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCall {
    Launch { region: String },
    List,
    Terminate { instance_ids: Vec<String> },
}

#[derive(Default)]
struct FakeCloudState {
    instances: BTreeMap<String, InstanceInfo>,
    launch_results: HashMap<String, VecDeque<Result<String, CloudError>>>,
    /// List calls remaining before a launched instance gets its address
    address_delay: u32,
    pending_address: HashMap<String, u32>,
    list_failures: VecDeque<CloudError>,
    fail_terminate: HashSet<String>,
    next_id: u64,
    calls: Vec<CloudCall>,
}

/// In-memory cloud: launches succeed with `fake-N` ids unless scripted
#[derive(Clone, Default)]
pub struct FakeCloud {
    inner: Arc<Mutex<FakeCloudState>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeCloudState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<CloudCall> {
        self.state().calls.clone()
    }

    /// Regions launch was attempted in, in order
    pub fn launch_regions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                CloudCall::Launch { region } => Some(region),
                _ => None,
            })
            .collect()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                CloudCall::Terminate { instance_ids } => Some(instance_ids),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Queue the next launch result for a region
    pub fn push_launch(&self, region: &str, result: Result<String, CloudError>) {
        self.state()
            .launch_results
            .entry(region.to_string())
            .or_default()
            .push_back(result);
    }

    /// Queue `n` capacity failures for a region
    pub fn push_capacity_errors(&self, region: &str, n: usize) {
        for _ in 0..n {
            self.push_launch(
                region,
                Err(CloudError::InsufficientCapacity {
                    region: region.to_string(),
                    message: "no capacity".to_string(),
                }),
            );
        }
    }

    /// Newly launched instances report no address for this many list calls
    pub fn set_address_delay(&self, list_calls: u32) {
        self.state().address_delay = list_calls;
    }

    /// Insert an existing instance
    pub fn add_instance(&self, id: &str, ip: Option<&str>, status: &str) {
        self.state().instances.insert(
            id.to_string(),
            InstanceInfo {
                id: id.to_string(),
                ip: ip.map(str::to_string),
                status: status.to_string(),
            },
        );
    }

    pub fn instance(&self, id: &str) -> Option<InstanceInfo> {
        self.state().instances.get(id).cloned()
    }

    pub fn remove_instance(&self, id: &str) {
        self.state().instances.remove(id);
    }

    /// Fail the next list call
    pub fn fail_next_list(&self, error: CloudError) {
        self.state().list_failures.push_back(error);
    }

    /// Make terminate fail for this instance
    pub fn fail_terminate(&self, id: &str) {
        self.state().fail_terminate.insert(id.to_string());
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn launch(&self, request: &LaunchRequest) -> Result<String, CloudError> {
        let mut state = self.state();
        state.calls.push(CloudCall::Launch {
            region: request.region_name.clone(),
        });

        let scripted = state
            .launch_results
            .get_mut(&request.region_name)
            .and_then(|q| q.pop_front());
        let id = match scripted {
            Some(Err(e)) => return Err(e),
            Some(Ok(id)) => id,
            None => {
                state.next_id += 1;
                format!("fake-{}", state.next_id)
            }
        };

        let ip = format!("10.0.0.{}", state.instances.len() + 1);
        let delay = state.address_delay;
        if delay > 0 {
            state.pending_address.insert(id.clone(), delay);
        }
        state.instances.insert(
            id.clone(),
            InstanceInfo {
                id: id.clone(),
                ip: Some(ip),
                status: "booting".to_string(),
            },
        );
        Ok(id)
    }

    async fn list_instances(&self) -> Result<Vec<InstanceInfo>, CloudError> {
        let mut state = self.state();
        state.calls.push(CloudCall::List);
        if let Some(error) = state.list_failures.pop_front() {
            return Err(error);
        }

        let mut listed = Vec::new();
        let ids: Vec<String> = state.instances.keys().cloned().collect();
        for id in ids {
            let hidden = match state.pending_address.get_mut(&id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            };
            if let Some(info) = state.instances.get(&id) {
                let mut info = info.clone();
                if hidden {
                    info.ip = None;
                }
                listed.push(info);
            }
        }
        Ok(listed)
    }

    async fn terminate(&self, instance_ids: &[String]) -> Result<(), CloudError> {
        let mut state = self.state();
        state.calls.push(CloudCall::Terminate {
            instance_ids: instance_ids.to_vec(),
        });
        if let Some(id) = instance_ids.iter().find(|id| state.fail_terminate.contains(*id)) {
            return Err(CloudError::Http {
                status: 500,
                message: format!("cannot terminate {}", id),
            });
        }
        for id in instance_ids {
            if let Some(info) = state.instances.get_mut(id) {
                info.status = "terminated".to_string();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
