// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session recording tools.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::hub::HubState;
use crate::session;

use super::{error_text, ok_text, opt_str, register_tool, req_str, InputSchema, RegisteredTool};

pub(super) fn register(tools: &mut Vec<RegisteredTool>) {
    register_tool(
        tools,
        "start_session",
        "Clear the event ring and start recording a fresh session.",
        InputSchema::new().field("label", "string", "Optional label echoed back to the caller"),
        start_session,
    );

    register_tool(
        tools,
        "stop_session",
        "Stop the active session and freeze its capture.",
        InputSchema::new(),
        stop_session,
    );

    register_tool(
        tools,
        "export_session",
        "Write the current session to a JSON file.",
        InputSchema::new().required("path", "string", "Destination file path"),
        export_session,
    );

    register_tool(
        tools,
        "import_session",
        "Load a previously exported session file.",
        InputSchema::new().required("path", "string", "Session file path"),
        import_session,
    );

    register_tool(
        tools,
        "diff_sessions",
        "Compare two exported session files.",
        InputSchema::new()
            .required("pathA", "string", "First session file")
            .required("pathB", "string", "Second session file"),
        diff_sessions,
    );

    register_tool(
        tools,
        "get_session_summary",
        "Summary of the active or last-stopped session.",
        InputSchema::new(),
        get_session_summary,
    );
}

async fn start_session(hub: Arc<HubState>, args: Value) -> String {
    let label = match opt_str(&args, "label") {
        Ok(label) => label,
        Err(message) => return error_text(message),
    };
    let session_id = hub.start_session();
    let mut body = json!({ "started": true, "sessionId": session_id });
    if let Some(label) = label {
        body["label"] = json!(label);
    }
    ok_text(body)
}

async fn stop_session(hub: Arc<HubState>, _args: Value) -> String {
    match hub.stop_session() {
        Some(summary) => ok_text(json!({ "stopped": true, "summary": summary })),
        None => error_text("no active session"),
    }
}

async fn export_session(hub: Arc<HubState>, args: Value) -> String {
    let path = match req_str(&args, "path") {
        Ok(path) => PathBuf::from(path),
        Err(message) => return error_text(message),
    };
    match hub.export_session(&path) {
        Ok(()) => ok_text(json!({ "exported": true, "path": path.display().to_string() })),
        Err(e) => error_text(e),
    }
}

async fn import_session(_hub: Arc<HubState>, args: Value) -> String {
    let path = match req_str(&args, "path") {
        Ok(path) => PathBuf::from(path),
        Err(message) => return error_text(message),
    };
    match session::import(&path) {
        Ok(session) => ok_text(json!({
            "imported": true,
            "sessionId": session.id,
            "summary": session.summary,
        })),
        Err(e) => error_text(e),
    }
}

async fn diff_sessions(_hub: Arc<HubState>, args: Value) -> String {
    let path_a = match req_str(&args, "pathA") {
        Ok(path) => PathBuf::from(path),
        Err(message) => return error_text(message),
    };
    let path_b = match req_str(&args, "pathB") {
        Ok(path) => PathBuf::from(path),
        Err(message) => return error_text(message),
    };
    let a = match session::import(&path_a) {
        Ok(session) => session,
        Err(e) => return error_text(e),
    };
    let b = match session::import(&path_b) {
        Ok(session) => session,
        Err(e) => return error_text(e),
    };
    match serde_json::to_value(session::diff(&a, &b)) {
        Ok(value) => ok_text(value),
        Err(e) => error_text(e),
    }
}

async fn get_session_summary(hub: Arc<HubState>, _args: Value) -> String {
    let (active, summary) = hub.session_status();
    match summary {
        Some(summary) => ok_text(json!({ "active": active, "summary": summary })),
        None => ok_text(json!({ "active": false })),
    }
}
