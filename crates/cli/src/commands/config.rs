// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration loading and schema commands

use crate::adapters::connect_store;
use crate::error::VlError;
use std::path::Path;
use vl_adapters::ConfiguredSecretStore;
use vl_core::Config;

/// Load the file at `path`, or the built-in defaults when none is given
pub fn load(path: Option<&Path>) -> Result<Config, VlError> {
    match path {
        Some(path) => Config::load(path).map_err(|e| VlError::config(path, e)),
        None => {
            let config = Config::default();
            config.validate().map_err(VlError::invalid_defaults)?;
            Ok(config)
        }
    }
}

/// Print the effective configuration as TOML
pub fn show(config: &Config) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Apply pending schema migrations
pub async fn migrate(config: &Config) -> anyhow::Result<()> {
    let secrets = ConfiguredSecretStore::from_config(&config.secrets);
    let store = connect_store(config, &secrets).await?;
    store.migrate().await.map_err(VlError::database)?;
    println!("Migrations applied");
    Ok(())
}
