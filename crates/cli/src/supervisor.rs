// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child dev-server supervision.
//!
//! The dev command runs through a shell in its own process group with stdin
//! inherited and stdout/stderr piped. Dedicated readers post completed
//! lines to the hub's ingest path; exits and spawn failures become error
//! events rather than hub failures. Shutdown signals the whole group so no
//! grandchildren survive.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::hub::{ChildStream, HubState};

/// Grace period between SIGTERM and SIGKILL on shutdown.
const KILL_GRACE: Duration = Duration::from_millis(1500);
const KILL_POLL: Duration = Duration::from_millis(50);

/// A spawned dev-server child and its liveness flag.
pub struct Supervisor {
    pgid: Option<i32>,
    running: Arc<AtomicBool>,
}

impl Supervisor {
    /// Launch `cmd` through a shell. A spawn failure is recorded as an
    /// error event on the hub; the supervisor itself never fails.
    ///
    /// The child gets the hub's stdin unless `stdin` says otherwise (the
    /// agent bridge owns stdin in `--mcp` mode).
    pub fn spawn(cmd: &str, hub: Arc<HubState>, stdin: Stdio) -> Self {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("failed to spawn dev server: {e}");
                hub.ingest_child_failure(&format!("failed to spawn dev server: {e}"));
                return Self { pgid: None, running: Arc::new(AtomicBool::new(false)) };
            }
        };

        let pgid = child.id().map(|id| id as i32);
        info!(pid = ?child.id(), %cmd, "dev server spawned");
        hub.set_dev_server_running(true);
        let running = Arc::new(AtomicBool::new(true));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, Arc::clone(&hub), ChildStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, Arc::clone(&hub), ChildStream::Stderr));
        }

        {
            let running = Arc::clone(&running);
            tokio::spawn(async move {
                let status = child.wait().await;
                running.store(false, Ordering::Release);
                match status {
                    Ok(status) if hub.shutdown.is_cancelled() => {
                        debug!(?status, "dev server exited during shutdown");
                        hub.set_dev_server_running(false);
                    }
                    Ok(status) if status.success() => {
                        info!("dev server exited cleanly");
                        hub.set_dev_server_running(false);
                    }
                    Ok(status) => {
                        let code = exit_code(&status);
                        warn!(code, "dev server exited");
                        hub.ingest_child_exit(code);
                    }
                    Err(e) => {
                        warn!("dev server wait failed: {e}");
                        hub.ingest_child_failure(&format!("dev server wait failed: {e}"));
                    }
                }
            });
        }

        Self { pgid, running }
    }

    /// Whether the child process is still alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Request graceful termination; force-kill the whole process group if
    /// the child outlives the grace period.
    pub async fn shutdown(&self) {
        let Some(pgid) = self.pgid else { return };
        if !self.is_running() {
            return;
        }

        let pid = Pid::from_raw(pgid);
        if let Err(e) = killpg(pid, Signal::SIGTERM) {
            debug!("SIGTERM to child group failed: {e}");
        }

        let deadline = tokio::time::Instant::now() + KILL_GRACE;
        while self.is_running() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(KILL_POLL).await;
        }

        if self.is_running() {
            warn!("dev server did not exit in time, killing process group");
            if let Err(e) = killpg(pid, Signal::SIGKILL) {
                debug!("SIGKILL to child group failed: {e}");
            }
        }
    }
}

/// Read a child pipe line by line, posting each to the ingest path. A
/// trailing partial line at EOF is flushed as its own line.
async fn pump_lines<R>(reader: R, hub: Arc<HubState>, stream: ChildStream)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => hub.ingest_child_line(&line, stream),
            Ok(None) => break,
            Err(e) => {
                debug!("child pipe read failed: {e}");
                break;
            }
        }
    }
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
