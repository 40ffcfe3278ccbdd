// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP read/control handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::ErrorCode;
use crate::hub::HubState;

/// `GET /` — identity document for humans probing the port.
pub async fn identity(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    let (http_port, ws_port) = s.ports();
    Json(json!({
        "name": "daibug",
        "version": env!("CARGO_PKG_VERSION"),
        "httpPort": http_port,
        "wsPort": ws_port,
    }))
}

/// Query parameters for `GET /events`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsQuery {
    pub source: Option<String>,
    pub level: Option<String>,
    pub limit: Option<usize>,
}

/// `GET /events` — filtered snapshot of the event ring.
pub async fn events(
    State(s): State<Arc<HubState>>,
    Query(q): Query<EventsQuery>,
) -> impl IntoResponse {
    let mut events = s.events();
    if let Some(ref source) = q.source {
        events.retain(|e| e.source.as_str() == source);
    }
    if let Some(ref level) = q.level {
        events.retain(|e| e.level.as_str() == level);
    }
    let total = events.len();
    if let Some(limit) = q.limit {
        if events.len() > limit {
            events.drain(..events.len() - limit);
        }
    }
    Json(json!({ "events": events, "total": total }))
}

/// `GET /status` — connection and child liveness summary.
pub async fn status(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(json!({
        "connectedClients": s.connected_clients(),
        "isDevServerRunning": s.is_dev_server_running(),
        "detectedFramework": s.detected_framework().map(|f| f.as_str()),
        "uptimeSecs": s.uptime_secs(),
        "eventCount": s.event_count(),
    }))
}

/// `GET /ports` — the resolved port pair.
pub async fn ports(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    let (http_port, ws_port) = s.ports();
    Json(json!({ "httpPort": http_port, "wsPort": ws_port }))
}

/// `GET /tabs` — known browser tabs.
pub async fn tabs(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(json!({ "tabs": s.tabs() }))
}

/// `GET /watch-rules` — registered watch rules.
pub async fn watch_rules(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(json!({ "rules": s.watch_rules() }))
}

/// `GET /watched-events` — the newest-first matched buffer.
pub async fn watched_events(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(json!({ "events": s.watched_events(None, None) }))
}

/// `GET /config` — the active configuration.
pub async fn config(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(s.config.clone())
}

/// `GET /session` — active flag and summary of the current or last session.
pub async fn session(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    let (active, summary) = s.session_status();
    match summary {
        Some(summary) => Json(json!({ "active": active, "summary": summary })),
        None => Json(json!({ "active": active })),
    }
}

/// Body for `POST /command`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandBody {
    pub command: String,
}

/// Commands a caller may broadcast to browser clients.
const BROADCASTABLE: [&str; 3] = ["snapshot_dom", "capture_react", "capture_storage"];

/// `POST /command` — broadcast a capture command to all WebSocket clients.
pub async fn command(
    State(s): State<Arc<HubState>>,
    body: Result<Json<CommandBody>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(body)) = body else {
        return ErrorCode::BadRequest.to_http_response("invalid JSON body").into_response();
    };
    if !BROADCASTABLE.contains(&body.command.as_str()) {
        return ErrorCode::BadRequest
            .to_http_response(format!("unknown command: {}", body.command))
            .into_response();
    }
    s.broadcast_command(json!({ "type": "command", "command": body.command }));
    (StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response()
}

/// Fallback for unknown paths.
pub async fn not_found() -> impl IntoResponse {
    ErrorCode::NotFound.to_http_response("unknown path")
}

/// Fallback for known paths hit with the wrong method.
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": { "code": "BAD_REQUEST", "message": "method not allowed" } })),
    )
}
