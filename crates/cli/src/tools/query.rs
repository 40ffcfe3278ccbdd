// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query and control tools over local hub state.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::event::{now_ms, Source};
use crate::hub::HubState;

use super::{
    error_text, limit_arg, network_cursor, ok_text, opt_bool, opt_str, opt_u64, register_tool,
    InputSchema, RegisteredTool,
};

pub(super) fn register(tools: &mut Vec<RegisteredTool>) {
    register_tool(
        tools,
        "get_events",
        "Return the most recent captured events, optionally filtered by source, level, \
         timestamp, or tab.",
        InputSchema::new()
            .field("source", "string", "Only events with this source tag")
            .field("level", "string", "Only events with this level")
            .field("since", "number", "Only events with ts >= this value (ms since epoch)")
            .field("tab_id", "string", "Only events from this tab (untagged events are kept)")
            .field("limit", "number", "Maximum events to return (default 50, max 500)"),
        get_events,
    );

    let cursor = network_cursor();
    register_tool(
        tools,
        "get_network_log",
        "Return network events newer than the previous call; 2xx/3xx responses count as \
         successful.",
        InputSchema::new()
            .field("include_successful", "boolean", "Include 200-399 responses (default true)")
            .field("include_failed", "boolean", "Include other responses (default true)"),
        move |hub, args| {
            let cursor = Arc::clone(&cursor);
            get_network_log(hub, args, cursor)
        },
    );

    register_tool(
        tools,
        "replay_interactions",
        "Return the recorded user interactions, oldest first.",
        InputSchema::new().field("limit", "number", "Maximum interactions (default 50, max 200)"),
        replay_interactions,
    );

    register_tool(
        tools,
        "clear_events",
        "Empty the event ring.",
        InputSchema::new(),
        clear_events,
    );
}

async fn get_events(hub: Arc<HubState>, args: Value) -> String {
    let result = (|| {
        let source = opt_str(&args, "source")?;
        let level = opt_str(&args, "level")?;
        let since = opt_u64(&args, "since")?;
        let tab_id = opt_str(&args, "tab_id")?;
        let limit = limit_arg(&args, 50, 500)?;
        Ok::<_, String>((source, level, since, tab_id, limit))
    })();
    let (source, level, since, tab_id, limit) = match result {
        Ok(parsed) => parsed,
        Err(message) => return error_text(message),
    };

    let mut events = hub.events();
    if let Some(ref source) = source {
        events.retain(|e| e.source.as_str() == source);
    }
    if let Some(ref level) = level {
        events.retain(|e| e.level.as_str() == level);
    }
    if let Some(since) = since {
        events.retain(|e| e.ts >= since);
    }
    if let Some(ref tab_id) = tab_id {
        // Events without a tab association stay visible under any filter.
        events.retain(|e| match e.payload.get("tabId").and_then(Value::as_str) {
            Some(event_tab) => event_tab == tab_id,
            None => true,
        });
    }
    let total = events.len();
    if events.len() > limit {
        events.drain(..events.len() - limit);
    }
    ok_text(json!({ "events": events, "total": total }))
}

async fn get_network_log(
    hub: Arc<HubState>,
    args: Value,
    cursor: Arc<std::sync::atomic::AtomicU64>,
) -> String {
    let include_successful = match opt_bool(&args, "include_successful", true) {
        Ok(b) => b,
        Err(message) => return error_text(message),
    };
    let include_failed = match opt_bool(&args, "include_failed", true) {
        Ok(b) => b,
        Err(message) => return error_text(message),
    };

    let after = cursor.load(Ordering::Acquire);
    let events: Vec<_> = hub
        .events()
        .into_iter()
        .filter(|e| e.source == Source::BrowserNetwork && e.ts > after)
        .filter(|e| {
            let successful = e
                .payload
                .get("status")
                .and_then(Value::as_i64)
                .is_some_and(|status| (200..400).contains(&status));
            if successful {
                include_successful
            } else {
                include_failed
            }
        })
        .collect();

    // Advance the cursor past everything returned so the next call only
    // sees newer traffic.
    if let Some(last) = events.last() {
        cursor.store(last.ts, Ordering::Release);
    }
    ok_text(json!({ "events": events, "count": events.len() }))
}

async fn replay_interactions(hub: Arc<HubState>, args: Value) -> String {
    let limit = match limit_arg(&args, 50, 200) {
        Ok(limit) => limit,
        Err(message) => return error_text(message),
    };
    let mut interactions = hub.interactions();
    if interactions.len() > limit {
        interactions.drain(..interactions.len() - limit);
    }
    ok_text(json!({ "interactions": interactions, "count": interactions.len() }))
}

async fn clear_events(hub: Arc<HubState>, _args: Value) -> String {
    hub.clear_events();
    ok_text(json!({ "cleared": true, "timestamp": now_ms() }))
}
