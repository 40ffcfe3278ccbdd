// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watch-rule tools.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::event::{Level, Source};
use crate::hub::HubState;
use crate::watch::{RuleConditions, RuleSpec};

use super::{
    error_text, ok_text, opt_str, opt_u64, register_tool, req_str, InputSchema, RegisteredTool,
};

pub(super) fn register(tools: &mut Vec<RegisteredTool>) {
    register_tool(
        tools,
        "add_watch_rule",
        "Register a watch rule; matching events land in the watched buffer.",
        InputSchema::new()
            .required("label", "string", "Human-readable rule label")
            .field("source", "string", "Restrict to one source tag")
            .field("status_codes", "array", "HTTP status codes to match")
            .field("url_pattern", "string", "URL glob (* and ** wildcards)")
            .field("methods", "array", "HTTP methods to match")
            .field("levels", "array", "Event levels to match")
            .field("message_contains", "string", "Case-insensitive message substring")
            .field("payload_contains", "object", "Structural partial match on the payload"),
        add_watch_rule,
    );

    register_tool(
        tools,
        "remove_watch_rule",
        "Remove a watch rule by id.",
        InputSchema::new().required("rule_id", "string", "Rule id to remove"),
        remove_watch_rule,
    );

    register_tool(
        tools,
        "list_watch_rules",
        "List registered watch rules.",
        InputSchema::new(),
        list_watch_rules,
    );

    register_tool(
        tools,
        "get_watched_events",
        "Return matched events, newest first.",
        InputSchema::new()
            .field("limit", "number", "Maximum entries to return")
            .field("rule_id", "string", "Only matches from this rule"),
        get_watched_events,
    );

    register_tool(
        tools,
        "clear_watched_events",
        "Empty the watched-event buffer.",
        InputSchema::new(),
        clear_watched_events,
    );
}

/// Translate snake_case tool arguments into a rule spec.
fn parse_rule_spec(args: &Value) -> Result<RuleSpec, String> {
    let label = req_str(args, "label")?;

    let source = match opt_str(args, "source")? {
        Some(tag) => {
            Some(tag.parse::<Source>().map_err(|_| format!("unknown source: {tag}"))?)
        }
        None => None,
    };

    let status_codes = match args.get("status_codes") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let codes: Result<Vec<i64>, String> = items
                .iter()
                .map(|v| v.as_i64().ok_or_else(|| "status_codes must be integers".to_owned()))
                .collect();
            Some(codes?)
        }
        Some(_) => return Err("status_codes must be an array".to_owned()),
    };

    let methods = match args.get("methods") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let methods: Result<Vec<String>, String> = items
                .iter()
                .map(|v| {
                    v.as_str().map(str::to_owned).ok_or_else(|| "methods must be strings".to_owned())
                })
                .collect();
            Some(methods?)
        }
        Some(_) => return Err("methods must be an array".to_owned()),
    };

    let levels = match args.get("levels") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let levels: Result<Vec<Level>, String> = items
                .iter()
                .map(|v| {
                    v.as_str()
                        .and_then(|s| s.parse::<Level>().ok())
                        .ok_or_else(|| "levels must be valid level names".to_owned())
                })
                .collect();
            Some(levels?)
        }
        Some(_) => return Err("levels must be an array".to_owned()),
    };

    let payload_contains = match args.get("payload_contains") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => return Err("payload_contains must be an object".to_owned()),
    };

    let conditions = RuleConditions {
        status_codes,
        url_pattern: opt_str(args, "url_pattern")?,
        methods,
        levels,
        message_contains: opt_str(args, "message_contains")?,
        payload_contains,
    };

    if conditions.is_empty() {
        return Err("at least one condition is required".to_owned());
    }

    Ok(RuleSpec { label, source, conditions })
}

async fn add_watch_rule(hub: Arc<HubState>, args: Value) -> String {
    let spec = match parse_rule_spec(&args) {
        Ok(spec) => spec,
        Err(message) => return error_text(message),
    };
    match hub.add_watch_rule(spec) {
        Ok(rule) => ok_text(json!({ "rule": rule })),
        Err(code) => error_text(code),
    }
}

async fn remove_watch_rule(hub: Arc<HubState>, args: Value) -> String {
    let rule_id = match req_str(&args, "rule_id") {
        Ok(rule_id) => rule_id,
        Err(message) => return error_text(message),
    };
    if hub.remove_watch_rule(&rule_id) {
        ok_text(json!({ "removed": true, "ruleId": rule_id }))
    } else {
        error_text(format!("watch rule not found: {rule_id}"))
    }
}

async fn list_watch_rules(hub: Arc<HubState>, _args: Value) -> String {
    ok_text(json!({ "rules": hub.watch_rules() }))
}

async fn get_watched_events(hub: Arc<HubState>, args: Value) -> String {
    let limit = match opt_u64(&args, "limit") {
        Ok(limit) => limit.map(|n| n as usize),
        Err(message) => return error_text(message),
    };
    let rule_id = match opt_str(&args, "rule_id") {
        Ok(rule_id) => rule_id,
        Err(message) => return error_text(message),
    };
    let events = hub.watched_events(limit, rule_id.as_deref());
    ok_text(json!({ "events": events, "count": events.len() }))
}

async fn clear_watched_events(hub: Arc<HubState>, _args: Value) -> String {
    hub.clear_watched_events();
    ok_text(json!({ "cleared": true }))
}
