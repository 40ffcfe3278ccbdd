// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use serde_json::json;

use crate::config::Config;
use crate::hub::HubState;

fn registry() -> Arc<ToolRegistry> {
    let hub = HubState::new(Config::default(), "npm run dev");
    Arc::new(ToolRegistry::new(hub))
}

#[tokio::test]
async fn tools_list_returns_specs() {
    let registry = registry();
    let response = handle_request(&registry, json!({"id": 1, "method": "tools/list"})).await;
    assert_eq!(response["id"], 1);
    let tools = response["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "get_events"));
    assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
}

#[tokio::test]
async fn tools_call_wraps_tool_output_as_text_content() {
    let registry = registry();
    let response = handle_request(
        &registry,
        json!({"id": "a1", "method": "tools/call", "params": {"name": "clear_events"}}),
    )
    .await;
    assert_eq!(response["id"], "a1");
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    let inner: Value = serde_json::from_str(text).unwrap();
    assert_eq!(inner["cleared"], true);
}

#[tokio::test]
async fn tool_failures_stay_in_band() {
    let registry = registry();
    let response = handle_request(
        &registry,
        json!({"id": 2, "method": "tools/call", "params": {"name": "no_such_tool"}}),
    )
    .await;
    // Unknown tools are a tool-level error payload, not a protocol error.
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("unknown tool"));
}

#[tokio::test]
async fn missing_name_is_a_protocol_error() {
    let registry = registry();
    let response =
        handle_request(&registry, json!({"id": 3, "method": "tools/call", "params": {}})).await;
    assert!(response["error"]["message"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn unknown_method_is_a_protocol_error() {
    let registry = registry();
    let response = handle_request(&registry, json!({"id": 4, "method": "prompts/list"})).await;
    assert!(response["error"]["message"].as_str().unwrap().contains("unknown method"));
    assert_eq!(response["id"], 4);
}
