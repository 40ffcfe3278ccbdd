// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command/response tools: broadcast a command to browser clients and await
//! the correlated response event.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::ErrorCode;
use crate::event::{now_ms, Event, Source};
use crate::hub::HubState;

use super::{
    error_text, ok_text, opt_str, register_tool, req_str, timeout_arg, InputSchema,
    RegisteredTool, DEFAULT_COMMAND_TIMEOUT,
};

/// Default timeout for in-page evaluation (fast or not at all).
const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_millis(300);

/// Exact message surfaced for sandbox rejections.
const SANDBOX_MESSAGE: &str =
    "Sandbox violation: network requests to non-localhost URLs are not allowed";

pub(super) fn register(tools: &mut Vec<RegisteredTool>) {
    register_tool(
        tools,
        "snapshot_dom",
        "Capture a DOM snapshot from the connected page.",
        InputSchema::new()
            .field("selector", "string", "Restrict the snapshot to this CSS selector")
            .field("timeout", "number", "Wait budget in ms (default 3000, max 10000)"),
        snapshot_dom,
    );

    register_tool(
        tools,
        "get_component_state",
        "Capture the React component tree from the connected page.",
        InputSchema::new().field("timeout", "number", "Wait budget in ms (default 3000, max 10000)"),
        get_component_state,
    );

    register_tool(
        tools,
        "capture_storage",
        "Capture localStorage and sessionStorage from the connected page.",
        InputSchema::new().field("timeout", "number", "Wait budget in ms (default 3000, max 10000)"),
        capture_storage,
    );

    register_tool(
        tools,
        "evaluate_in_browser",
        "Evaluate a JavaScript expression in the page. Network calls must stay on localhost.",
        InputSchema::new()
            .required("expression", "string", "Expression to evaluate")
            .field("timeout", "number", "Wait budget in ms (default 300, max 10000)"),
        evaluate_in_browser,
    );
}

async fn snapshot_dom(hub: Arc<HubState>, args: Value) -> String {
    let selector = match opt_str(&args, "selector") {
        Ok(selector) => selector,
        Err(message) => return error_text(message),
    };
    let timeout = match timeout_arg(&args, DEFAULT_COMMAND_TIMEOUT) {
        Ok(timeout) => timeout,
        Err(message) => return error_text(message),
    };

    let mut frame = json!({ "type": "command", "command": "snapshot_dom" });
    if let Some(ref selector) = selector {
        frame["selector"] = json!(selector);
    }

    await_command_response(&hub, frame, timeout, |event| {
        event.source == Source::BrowserDom && payload_type(event) == Some("dom_snapshot")
    })
    .await
}

async fn get_component_state(hub: Arc<HubState>, args: Value) -> String {
    let timeout = match timeout_arg(&args, DEFAULT_COMMAND_TIMEOUT) {
        Ok(timeout) => timeout,
        Err(message) => return error_text(message),
    };
    let frame = json!({ "type": "command", "command": "capture_react" });
    await_command_response(&hub, frame, timeout, |event| {
        event.source == Source::BrowserDom
            && matches!(payload_type(event), Some("react_tree") | Some("react-tree"))
    })
    .await
}

async fn capture_storage(hub: Arc<HubState>, args: Value) -> String {
    let timeout = match timeout_arg(&args, DEFAULT_COMMAND_TIMEOUT) {
        Ok(timeout) => timeout,
        Err(message) => return error_text(message),
    };
    let frame = json!({ "type": "command", "command": "capture_storage" });
    await_command_response(&hub, frame, timeout, |event| {
        event.source == Source::BrowserStorage && payload_type(event) == Some("storage_snapshot")
    })
    .await
}

async fn evaluate_in_browser(hub: Arc<HubState>, args: Value) -> String {
    let expression = match req_str(&args, "expression") {
        Ok(expression) => expression,
        Err(message) => return error_text(message),
    };
    let timeout = match timeout_arg(&args, DEFAULT_EVAL_TIMEOUT) {
        Ok(timeout) => timeout,
        Err(message) => return error_text(message),
    };

    // Sandbox scan happens before anything is broadcast.
    if violates_sandbox(&expression) {
        return error_text(SANDBOX_MESSAGE);
    }

    let evaluation_id = format!("eval_{}", now_ms());
    let frame = json!({
        "type": "command",
        "command": "evaluate",
        "evaluationId": evaluation_id,
        "expression": expression,
    });

    let rx = hub.subscribe_events();
    hub.broadcast_command(frame);
    let result = hub
        .wait_for_event(rx, timeout, |event| {
            event.payload.get("evaluationId").and_then(Value::as_str) == Some(&evaluation_id)
        })
        .await;

    match result {
        Ok(event) => match event.payload.get("error") {
            Some(Value::String(message)) => error_text(message),
            Some(other) if !other.is_null() => error_text(other),
            _ => ok_text(json!({ "result": event.payload.get("result").cloned() })),
        },
        Err(code) => command_error(code),
    }
}

/// Broadcast `frame` and await the first event `matches` accepts, returning
/// that event's payload as the tool output.
async fn await_command_response<F>(
    hub: &Arc<HubState>,
    frame: Value,
    timeout: Duration,
    matches: F,
) -> String
where
    F: Fn(&Event) -> bool,
{
    let rx = hub.subscribe_events();
    hub.broadcast_command(frame);
    match hub.wait_for_event(rx, timeout, matches).await {
        Ok(event) => ok_text(Value::Object(event.payload)),
        Err(code) => command_error(code),
    }
}

fn command_error(code: ErrorCode) -> String {
    match code {
        ErrorCode::CommandTimeout => error_text("timed out waiting for a browser response"),
        other => error_text(other),
    }
}

fn payload_type(event: &Event) -> Option<&str> {
    event.payload.get("type").and_then(Value::as_str)
}

/// Scan an expression for network calls that leave loopback.
pub fn violates_sandbox(expression: &str) -> bool {
    let patterns = [
        r#"fetch\s*\(\s*['"]([^'"]+)['"]"#,
        r#"\.open\s*\(\s*['"][^'"]*['"]\s*,\s*['"]([^'"]+)['"]"#,
    ];
    for pattern in patterns {
        let Ok(regex) = Regex::new(pattern) else { continue };
        for captures in regex.captures_iter(expression) {
            if let Some(url) = captures.get(1) {
                if !is_loopback_url(url.as_str()) {
                    return true;
                }
            }
        }
    }
    false
}

/// Relative URLs stay on the page's own (loopback) origin; absolute ones
/// must name localhost or 127.0.0.1.
fn is_loopback_url(url: &str) -> bool {
    let host_part = if let Some(rest) = url.strip_prefix("http://") {
        rest
    } else if let Some(rest) = url.strip_prefix("https://") {
        rest
    } else if let Some(rest) = url.strip_prefix("//") {
        rest
    } else {
        return true;
    };
    let host = host_part
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("");
    host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1"
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
