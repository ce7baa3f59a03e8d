// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test utilities for CLI integration tests.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// `vl` with every variable that could reach a real backend removed
pub fn vl() -> Command {
    let mut cmd = Command::cargo_bin("vl").expect("vl binary");
    for var in [
        "VL_CONFIG",
        "VL_LOG_FILE",
        "DATABASE_URL",
        "LAMBDA_CLOUD_API_KEY",
        "VL_SSH_PRIVATE_KEY",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Write `content` to a config file inside a fresh temp directory
pub fn config_file(content: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let path = temp.path().join("vl.toml");
    fs::write(&path, content).expect("Failed to write config");
    (temp, path)
}
