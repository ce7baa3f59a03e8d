// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenSSH remote shell adapter
//!
//! Shells out to the system `ssh` client. Each session is a ControlMaster
//! connection whose socket and private key file live in a temp directory
//! that is removed when the session closes.

use super::{CommandOutput, RemoteError, RemoteShell, RemoteTarget};
use async_trait::async_trait;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct OpenSshOptions {
    pub program: PathBuf,
    pub connect_timeout: Duration,
}

impl Default for OpenSshOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ssh"),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

struct OpenSession {
    destination: String,
    port: u16,
    socket: PathBuf,
    key_path: PathBuf,
    _dir: TempDir,
}

#[derive(Clone, Default)]
pub struct OpenSshShell {
    options: OpenSshOptions,
    sessions: Arc<Mutex<HashMap<String, Arc<OpenSession>>>>,
    next_id: Arc<AtomicU64>,
}

impl OpenSshShell {
    pub fn new(options: OpenSshOptions) -> Self {
        Self {
            options,
            sessions: Arc::default(),
            next_id: Arc::default(),
        }
    }

    fn session(&self, id: &str) -> Result<Arc<OpenSession>, RemoteError> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::SessionNotFound(id.to_string()))
    }

    fn command(&self, session: &OpenSession) -> Command {
        let mut cmd = Command::new(&self.options.program);
        cmd.args(base_args(
            self.options.connect_timeout,
            &session.key_path,
            session.port,
        ))
        .arg("-S")
        .arg(&session.socket)
        .stdin(Stdio::null())
        .kill_on_drop(true);
        cmd
    }
}

/// Options shared by every `ssh` invocation
fn base_args(connect_timeout: Duration, key_path: &Path, port: u16) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-o",
        "BatchMode=yes",
        "-o",
        "StrictHostKeyChecking=no",
        "-o",
        "UserKnownHostsFile=/dev/null",
        "-o",
        "LogLevel=ERROR",
        "-o",
        "ServerAliveInterval=30",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push("-o".into());
    args.push(format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)).into());
    args.push("-i".into());
    args.push(key_path.as_os_str().to_owned());
    args.push("-p".into());
    args.push(port.to_string().into());
    args
}

/// Write key material readable only by the current user
fn write_private_key(path: &Path, key: &str) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(key.as_bytes())?;
    if !key.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn io_error(e: impl std::fmt::Display) -> RemoteError {
    RemoteError::Io(e.to_string())
}

#[async_trait]
impl RemoteShell for OpenSshShell {
    async fn probe(&self, host: &str, port: u16) -> Result<(), RemoteError> {
        let unreachable = |reason: String| RemoteError::Unreachable {
            host: host.to_string(),
            reason,
        };
        let timeout = self.options.connect_timeout;

        let mut stream =
            match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(unreachable(e.to_string())),
                Err(_) => return Err(unreachable(format!("connect timed out after {:?}", timeout))),
            };

        let mut banner = [0u8; 64];
        let read = match tokio::time::timeout(timeout, stream.read(&mut banner)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(unreachable(e.to_string())),
            Err(_) => return Err(unreachable("no banner".to_string())),
        };
        if banner[..read].starts_with(b"SSH-") {
            Ok(())
        } else {
            Err(unreachable("peer is not an ssh server".to_string()))
        }
    }

    async fn open(&self, target: &RemoteTarget) -> Result<String, RemoteError> {
        let connect_failed = |reason: String| RemoteError::ConnectFailed {
            host: target.host.clone(),
            reason,
        };

        let dir = tempfile::Builder::new()
            .prefix("vl-ssh-")
            .tempdir()
            .map_err(io_error)?;
        let key_path = dir.path().join("id");
        write_private_key(&key_path, target.key.expose()).map_err(io_error)?;
        let socket = dir.path().join("ctl");
        let log_path = dir.path().join("master.log");
        let log = std::fs::File::create(&log_path).map_err(io_error)?;

        let destination = format!("{}@{}", target.user, target.host);
        // -f forks after authentication; stderr goes to a file so no pipe is
        // held open by the backgrounded master.
        let mut cmd = Command::new(&self.options.program);
        cmd.args(base_args(self.options.connect_timeout, &key_path, target.port))
            .args(["-M", "-f", "-N", "-S"])
            .arg(&socket)
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .kill_on_drop(true);

        let budget = self.options.connect_timeout + Duration::from_secs(5);
        let status = match tokio::time::timeout(budget, cmd.status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(connect_failed(e.to_string())),
            Err(_) => return Err(connect_failed(format!("timed out after {:?}", budget))),
        };
        if !status.success() {
            let detail = std::fs::read_to_string(&log_path).unwrap_or_default();
            return Err(connect_failed(format!("{}: {}", status, detail.trim())));
        }

        let id = format!("ssh-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).insert(
            id.clone(),
            Arc::new(OpenSession {
                destination,
                port: target.port,
                socket,
                key_path,
                _dir: dir,
            }),
        );
        Ok(id)
    }

    async fn exec(
        &self,
        session: &str,
        script: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, RemoteError> {
        let session = self.session(session)?;
        let mut cmd = self.command(&session);
        cmd.arg(&session.destination).arg("--").arg(script);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(io_error)?,
            Err(_) => return Err(RemoteError::Timeout(timeout)),
        };
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn spawn_detached(&self, session: &str, script: &str) -> Result<(), RemoteError> {
        let output = self
            .exec(session, script, self.options.connect_timeout * 3)
            .await?;
        if !output.success() {
            tracing::warn!(
                exit_code = ?output.exit_code,
                stderr = output.stderr.trim(),
                "detached command dispatch reported failure"
            );
        }
        Ok(())
    }

    async fn close(&self, session: &str) -> Result<(), RemoteError> {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session);
        let Some(session) = removed else {
            return Ok(());
        };

        let mut cmd = self.command(&session);
        cmd.args(["-O", "exit"])
            .arg(&session.destination)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        match tokio::time::timeout(self.options.connect_timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => tracing::debug!(%status, "control master exit returned non-zero"),
            Ok(Err(e)) => tracing::debug!(error = %e, "control master exit failed"),
            Err(_) => tracing::debug!("control master exit timed out"),
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "openssh_tests.rs"]
mod tests;
