// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_file_yields_defaults() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.sweeper.idle_threshold, Duration::from_secs(300));
    assert_eq!(config.provider.regions.len(), 3);
    assert_eq!(config.ssh.user, "ubuntu");
}

#[test]
fn durations_use_humantime() {
    let config = Config::from_toml_str(
        r#"
        [ssh]
        wait_budget = "2m"
        poll_interval = "20s"

        [sweeper]
        idle_threshold = "10m"

        [provider.capacity_retry]
        max_attempts = 2
        delay = "5s"
        "#,
    )
    .unwrap();

    assert_eq!(config.ssh.wait_budget, Duration::from_secs(120));
    assert_eq!(config.sweeper.idle_threshold, Duration::from_secs(600));
    assert_eq!(
        config.provider.capacity_retry,
        RetryPolicy::new(2, Duration::from_secs(5))
    );
    assert_eq!(config.ssh.readiness_policy().max_attempts, 6);
}

#[test]
fn secrets_backend_parses() {
    let config = Config::from_toml_str(
        r#"
        [secrets]
        backend = "dir"
        dir = "/etc/vl/secrets"
        "#,
    )
    .unwrap();
    assert_eq!(config.secrets.backend, SecretBackend::Dir);
    assert_eq!(config.secrets.dir, PathBuf::from("/etc/vl/secrets"));
}

#[test]
fn unknown_keys_are_rejected() {
    let err = Config::from_toml_str("[sweeper]\nidle = \"5m\"").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn empty_regions_are_rejected() {
    let err = Config::from_toml_str("[provider]\nregions = []").unwrap_err();
    assert!(err.to_string().contains("provider.regions"));
}

#[test]
fn empty_launch_is_rejected() {
    let err = Config::from_toml_str("[commands]\nlaunch = \"  \"").unwrap_err();
    assert!(err.to_string().contains("commands.launch"));
}

#[test]
fn zero_idle_threshold_is_rejected() {
    let err = Config::from_toml_str("[sweeper]\nidle_threshold = \"0s\"").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn default_step_bound_is_one_command() {
    let config = Config::default();
    // command_timeout plus the session connect
    assert_eq!(config.max_step_duration(), Duration::from_secs(1810));
    assert!(config.lease.ttl > config.max_step_duration());
}

#[test]
fn address_wait_can_dominate_step_bound() {
    let config = Config::from_toml_str(
        r#"
        [ssh]
        command_timeout = "10m"

        [lease]
        ttl = "30m"
        "#,
    )
    .unwrap();
    // 29 pauses of 10s plus 30 lookups of 30s
    assert_eq!(config.max_step_duration(), Duration::from_secs(1190));
}

#[test]
fn ttl_shorter_than_a_command_is_rejected() {
    let err = Config::from_toml_str("[lease]\nttl = \"30m\"").unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("lease.ttl"), "{}", err);
}

#[test]
fn zero_ttl_is_rejected() {
    let err = Config::from_toml_str("[lease]\nttl = \"0s\"").unwrap_err();
    assert!(err.to_string().contains("lease.ttl"), "{}", err);
}

#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn load_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vl.toml");
    std::fs::write(&path, "[lease]\nttl = \"50m\"\n").unwrap();
    let config = Config::load(&path).unwrap();
    assert_eq!(config.lease.ttl, Duration::from_secs(3000));
}

#[test]
fn config_round_trips_through_toml() {
    let text = toml::to_string(&Config::default()).unwrap();
    assert_eq!(Config::from_toml_str(&text).unwrap(), Config::default());
}
