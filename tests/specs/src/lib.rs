// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `daibug` binary as a subprocess and exercises it over
//! HTTP, WebSocket, and the `--mcp` stdio tool bridge.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Resolve the path to the compiled `daibug` binary.
pub fn daibug_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("daibug")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Builder for a [`DaibugProcess`].
pub struct DaibugBuilder {
    mcp: bool,
    extra_args: Vec<String>,
}

impl Default for DaibugBuilder {
    fn default() -> Self {
        Self { mcp: false, extra_args: Vec::new() }
    }
}

impl DaibugBuilder {
    /// Enable the stdio tool bridge (`--mcp`).
    pub fn mcp(mut self) -> Self {
        self.mcp = true;
        self
    }

    /// Append extra CLI flags.
    pub fn args(mut self, args: &[&str]) -> Self {
        self.extra_args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    /// Spawn daibug supervising `cmd`.
    pub fn spawn(self, cmd: &str) -> anyhow::Result<DaibugProcess> {
        let binary = daibug_binary();
        anyhow::ensure!(binary.exists(), "daibug binary not found at {}", binary.display());

        let http_port = free_port()?;
        let ws_port = free_port()?;

        let mut args: Vec<String> = vec![
            "--cmd".into(),
            cmd.to_owned(),
            "--http-port".into(),
            http_port.to_string(),
            "--ws-port".into(),
            ws_port.to_string(),
            "--no-config".into(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ];
        if self.mcp {
            args.push("--mcp".into());
        }
        args.extend(self.extra_args);

        let mut command = Command::new(&binary);
        command
            .args(&args)
            .stdin(if self.mcp { Stdio::piped() } else { Stdio::null() })
            .stdout(if self.mcp { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdin = child.stdin.take();
        let stdout_lines = child.stdout.take().map(|out| BufReader::new(out).lines());

        Ok(DaibugProcess { child, http_port, ws_port, stdin, stdout_lines, next_id: 0 })
    }
}

/// A running `daibug` process that is killed on drop.
pub struct DaibugProcess {
    child: Child,
    http_port: u16,
    ws_port: u16,
    stdin: Option<ChildStdin>,
    stdout_lines: Option<Lines<BufReader<ChildStdout>>>,
    next_id: u64,
}

impl DaibugProcess {
    /// Create a builder for custom configuration.
    pub fn build() -> DaibugBuilder {
        DaibugBuilder::default()
    }

    /// Spawn daibug with the default HTTP+WS configuration.
    pub fn start(cmd: &str) -> anyhow::Result<Self> {
        Self::build().spawn(cmd)
    }

    /// Base URL for HTTP requests.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.http_port)
    }

    /// WebSocket URL (the requested port; see [`Self::resolved_ws_url`]).
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/", self.ws_port)
    }

    /// WebSocket URL from the hub's own `/ports` report, in case the
    /// requested port was taken and the hub fell back.
    pub async fn resolved_ws_url(&self) -> anyhow::Result<String> {
        let v: Value =
            reqwest::get(format!("{}/ports", self.base_url())).await?.json().await?;
        let port = v["wsPort"].as_u64().unwrap_or(self.ws_port as u64);
        Ok(format!("ws://127.0.0.1:{port}/"))
    }

    /// Poll `/status` until the hub responds.
    pub async fn wait_ready(&self, timeout: Duration) -> anyhow::Result<()> {
        let client = reqwest::Client::new();
        let url = format!("{}/status", self.base_url());
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("daibug did not become ready within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Invoke a tool over the stdio bridge and return its parsed output.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let request = json!({
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments },
        });

        let stdin = self.stdin.as_mut().ok_or_else(|| anyhow::anyhow!("not in --mcp mode"))?;
        let mut line = request.to_string();
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;

        let lines = self
            .stdout_lines
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("not in --mcp mode"))?;
        loop {
            let Some(line) = lines.next_line().await? else {
                anyhow::bail!("agent bridge closed before responding");
            };
            let Ok(response) = serde_json::from_str::<Value>(&line) else { continue };
            if response["id"] != json!(id) {
                continue;
            }
            let text = response["result"]["content"][0]["text"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("missing text content in {response}"))?;
            return Ok(serde_json::from_str(text)?);
        }
    }

    /// List tools over the stdio bridge.
    pub async fn list_tools(&mut self) -> anyhow::Result<Vec<Value>> {
        self.next_id += 1;
        let id = self.next_id;
        let request = json!({ "id": id, "method": "tools/list" });

        let stdin = self.stdin.as_mut().ok_or_else(|| anyhow::anyhow!("not in --mcp mode"))?;
        let mut line = request.to_string();
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;

        let lines = self
            .stdout_lines
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("not in --mcp mode"))?;
        loop {
            let Some(line) = lines.next_line().await? else {
                anyhow::bail!("agent bridge closed before responding");
            };
            let Ok(response) = serde_json::from_str::<Value>(&line) else { continue };
            if response["id"] != json!(id) {
                continue;
            }
            return Ok(response["result"]["tools"].as_array().cloned().unwrap_or_default());
        }
    }

    /// Close the agent bridge's stdin; in `--mcp` mode the hub shuts down
    /// cleanly on EOF.
    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => anyhow::bail!("daibug did not exit within {timeout:?}"),
        }
    }
}
