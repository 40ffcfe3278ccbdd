// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-delimited stdio bridge for the agent transport (`--mcp`).
//!
//! One JSON request per line on stdin, one JSON response per line on
//! stdout: `{id, method, params}` in, `{id, result}` or `{id, error}` out.
//! Methods are `tools/list` and `tools/call`.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::tools::ToolRegistry;

/// Serve tool discovery and invocation over stdin/stdout until EOF or
/// shutdown.
pub async fn serve_stdio(registry: Arc<ToolRegistry>, shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => handle_request(&registry, request).await,
            Err(e) => {
                debug!("malformed agent request: {e}");
                json!({ "id": Value::Null, "error": { "message": "invalid JSON request" } })
            }
        };

        let mut text = response.to_string();
        text.push('\n');
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

async fn handle_request(registry: &ToolRegistry, request: Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();

    match method {
        "tools/list" => json!({ "id": id, "result": { "tools": registry.list() } }),
        "tools/call" => {
            let params = request.get("params").cloned().unwrap_or(Value::Null);
            let Some(name) = params.get("name").and_then(Value::as_str) else {
                return json!({ "id": id, "error": { "message": "params.name is required" } });
            };
            let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            let text = registry.call(name, args).await;
            json!({ "id": id, "result": { "content": [{ "type": "text", "text": text }] } })
        }
        other => json!({ "id": id, "error": { "message": format!("unknown method: {other}") } }),
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
