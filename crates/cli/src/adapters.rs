// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine factory for CLI commands

use crate::error::VlError;
use vl_adapters::{
    ConfiguredSecretStore, LambdaCloud, OpenSshOptions, OpenSshShell, Secret, SecretStore,
    TracedCloud, TracedShell,
};
use vl_core::{Config, SystemClock, UuidIdGen};
use vl_engine::{Engine, EngineDeps};
use vl_storage::PgStateStore;

/// Engine wired to PostgreSQL, the provider API and the system ssh client
pub type ProdEngine = Engine<
    PgStateStore,
    TracedCloud<LambdaCloud>,
    TracedShell<OpenSshShell>,
    ConfiguredSecretStore,
    SystemClock,
    UuidIdGen,
>;

/// Create a production engine with real adapters
pub async fn make_engine(config: &Config) -> Result<ProdEngine, VlError> {
    let secrets = ConfiguredSecretStore::from_config(&config.secrets);
    let store = connect_store(config, &secrets).await?;

    let api_key = fetch_secret(&secrets, &config.provider.api_key_secret).await?;
    let cloud = LambdaCloud::new(
        config.provider.base_url.clone(),
        api_key,
        config.provider.request_timeout,
    )
    .map_err(|e| {
        VlError::new("failed to create provider client")
            .with_context(e.to_string())
            .with_source(e)
    })?;

    let shell = OpenSshShell::new(OpenSshOptions {
        connect_timeout: config.ssh.connect_timeout,
        ..OpenSshOptions::default()
    });

    Ok(Engine::new(
        EngineDeps {
            store,
            cloud: TracedCloud::new(cloud),
            shell: TracedShell::new(shell),
            secrets,
        },
        config.clone(),
        SystemClock,
        UuidIdGen,
    ))
}

/// Connect to the state database using the URL held in the secret store
pub async fn connect_store(
    config: &Config,
    secrets: &ConfiguredSecretStore,
) -> Result<PgStateStore, VlError> {
    let url = fetch_secret(secrets, &config.database.url_secret).await?;
    PgStateStore::connect(
        url.expose(),
        config.database.max_connections,
        config.database.connect_retry,
    )
    .await
    .map_err(VlError::database)
}

async fn fetch_secret(secrets: &ConfiguredSecretStore, name: &str) -> Result<Secret, VlError> {
    secrets
        .get_secret(name)
        .await
        .map_err(|e| VlError::secret(name, e))
}
