// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::provider::FakeCloud;
use crate::remote::FakeShell;
use crate::secrets::Secret;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// A writer that captures log output for testing
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run a future with captured tracing output
fn with_tracing<F, Fut>(f: F) -> (String, Fut::Output)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future,
{
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });

    (logs.contents(), result)
}

fn request(region: &str) -> LaunchRequest {
    LaunchRequest {
        region_name: region.to_string(),
        instance_type_name: "gpu_1x_h100_sxm5".to_string(),
        ssh_key_names: vec![],
        user_data: None,
    }
}

#[test]
fn launch_logs_region_and_instance() {
    let (logs, result) = with_tracing(|| async {
        let traced = TracedCloud::new(FakeCloud::new());
        traced.launch(&request("us-east-1")).await
    });

    assert_eq!(result.unwrap(), "fake-1");
    assert!(logs.contains("cloud.launch"), "Logs:\n{}", logs);
    assert!(logs.contains("us-east-1"), "Logs:\n{}", logs);
    assert!(logs.contains("launched"), "Logs:\n{}", logs);
    assert!(logs.contains("elapsed_ms"), "Logs:\n{}", logs);
}

#[test]
fn capacity_shortage_logs_warning() {
    let (logs, result) = with_tracing(|| async {
        let cloud = FakeCloud::new();
        cloud.push_capacity_errors("us-south-2", 1);
        TracedCloud::new(cloud).launch(&request("us-south-2")).await
    });

    assert!(result.is_err());
    assert!(logs.contains("WARN"), "Logs:\n{}", logs);
    assert!(logs.contains("no capacity"), "Logs:\n{}", logs);
}

#[test]
fn failed_command_logs_exit_code() {
    let (logs, result) = with_tracing(|| async {
        let shell = FakeShell::new();
        shell.fail_command("pip", 2);
        let traced = TracedShell::new(shell);
        let session = traced
            .open(&RemoteTarget {
                host: "10.0.0.1".to_string(),
                port: 22,
                user: "ubuntu".to_string(),
                key: Secret::new("PRIVATE-KEY-MATERIAL"),
            })
            .await
            .unwrap();
        let output = traced
            .exec(&session, "pip install", Duration::from_secs(1))
            .await;
        traced.close(&session).await.unwrap();
        output
    });

    assert_eq!(result.unwrap().exit_code, Some(2));
    assert!(logs.contains("shell.open"), "Logs:\n{}", logs);
    assert!(logs.contains("command failed"), "Logs:\n{}", logs);
    assert!(logs.contains("exit_code=Some(2)"), "Logs:\n{}", logs);
    assert!(!logs.contains("PRIVATE-KEY-MATERIAL"), "key leaked:\n{}", logs);
}

#[test]
fn terminate_failure_logs_error() {
    let (logs, result) = with_tracing(|| async {
        let cloud = FakeCloud::new();
        cloud.add_instance("i-1", None, "active");
        cloud.fail_terminate("i-1");
        TracedCloud::new(cloud).terminate(&["i-1".to_string()]).await
    });

    assert!(result.is_err());
    assert!(logs.contains("cloud.terminate"), "Logs:\n{}", logs);
    assert!(logs.contains("terminate failed"), "Logs:\n{}", logs);
}
