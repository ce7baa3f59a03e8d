// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI integration tests for invocations that fail before any backend is
//! reached

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(deprecated)]

mod common;

use common::vl;
use predicates::prelude::*;

#[test]
fn test_malformed_event_returns_500_without_database() {
    let output = vl()
        .args(["--format", "json", "invoke", "--event", "{not json"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let envelope: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(envelope["statusCode"], 500);
    let body: serde_json::Value =
        serde_json::from_str(envelope["body"].as_str().unwrap()).unwrap();
    assert!(body["error"].as_str().unwrap().contains("invalid event"));
}

#[test]
fn test_unknown_action_is_rejected() {
    vl().args(["invoke", "--event", r#"{"action": "reboot"}"#])
        .assert()
        .failure()
        .stdout(predicate::str::contains("unknown action: reboot"));
}

#[test]
fn test_completion_event_missing_worker() {
    vl().args(["invoke", "--event", r#"{"job_id": "m-1"}"#])
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing or empty worker_id"));
}

#[test]
fn test_complete_rejects_blank_job_id() {
    vl().args(["complete", "--job-id", "  ", "--worker-id", "i-1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("missing or empty job_id"));
}

#[test]
fn test_stats_without_database_secret_fails() {
    vl().arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("secret DATABASE_URL is unavailable"))
        .stderr(predicate::str::contains("export DATABASE_URL=..."));
}

#[test]
fn test_dir_backend_reports_missing_file() {
    let secrets = tempfile::TempDir::new().unwrap();
    let (_temp, path) = common::config_file(&format!(
        "[secrets]\nbackend = \"dir\"\ndir = {:?}\n",
        secrets.path().display().to_string()
    ));

    vl().arg("--config")
        .arg(&path)
        .arg("sweep")
        .assert()
        .failure()
        .stderr(predicate::str::contains("secret DATABASE_URL is unavailable"));
}
