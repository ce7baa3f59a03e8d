// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine wiring shared by every entry point

use crate::executor::RemoteExecutor;
use crate::provision::Provisioner;
use vl_adapters::{CloudApi, RemoteShell, SecretStore};
use vl_core::{Clock, Config, FleetStats, IdGen};
use vl_storage::{StateStore, StoreError};

/// Engine adapter dependencies
pub struct EngineDeps<S, A, R, K> {
    pub store: S,
    pub cloud: A,
    pub shell: R,
    pub secrets: K,
}

/// Runs assignment cycles, sweeps and completion callbacks against one
/// state store and one set of adapters
pub struct Engine<S, A, R, K, C: Clock, I: IdGen> {
    pub(crate) store: S,
    pub(crate) provisioner: Provisioner<A>,
    pub(crate) executor: RemoteExecutor<R>,
    pub(crate) secrets: K,
    pub(crate) config: Config,
    pub(crate) clock: C,
    pub(crate) id_gen: I,
}

impl<S, A, R, K, C, I> Engine<S, A, R, K, C, I>
where
    S: StateStore,
    A: CloudApi,
    R: RemoteShell,
    K: SecretStore,
    C: Clock,
    I: IdGen,
{
    pub fn new(deps: EngineDeps<S, A, R, K>, config: Config, clock: C, id_gen: I) -> Self {
        Self {
            store: deps.store,
            provisioner: Provisioner::new(deps.cloud, config.provider.clone(), &config.address),
            executor: RemoteExecutor::new(deps.shell, config.ssh.clone()),
            secrets: deps.secrets,
            config,
            clock,
            id_gen,
        }
    }

    /// Snapshot of worker and job counts
    pub async fn fleet_stats(&self) -> Result<FleetStats, StoreError> {
        self.store.fleet_stats(self.clock.now()).await
    }
}
