// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and WebSocket servers: port binding policy, router construction,
//! and the shared error envelope.

pub mod http;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::error::ErrorCode;
use crate::hub::HubState;

/// Attempts on the preferred port before falling through to later ones.
const BIND_RETRIES: u32 = 5;
const BIND_BACKOFF: Duration = Duration::from_millis(120);

/// Bind a loopback listener on `preferred`, retrying with back-off, then on
/// subsequent ports (skipping `skip`) until one binds.
pub async fn bind_with_fallback(preferred: u16, skip: &[u16]) -> anyhow::Result<(TcpListener, u16)> {
    for attempt in 1..=BIND_RETRIES {
        match TcpListener::bind(("127.0.0.1", preferred)).await {
            Ok(listener) => {
                let port = listener.local_addr()?.port();
                return Ok((listener, port));
            }
            Err(e) => {
                debug!(port = preferred, attempt, "bind failed: {e}");
                if attempt < BIND_RETRIES {
                    tokio::time::sleep(BIND_BACKOFF).await;
                }
            }
        }
    }

    for port in (u32::from(preferred) + 1)..=u32::from(u16::MAX) {
        let port = port as u16;
        if skip.contains(&port) {
            continue;
        }
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            debug!(preferred, port, "fell back to next free port");
            return Ok((listener, port));
        }
    }

    anyhow::bail!("{}: no loopback port available from {preferred}", ErrorCode::PortExhausted)
}

/// Top-level error response envelope shared across HTTP and WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body containing a machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorCode {
    /// Convert this error code into a transport [`ErrorBody`].
    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    /// Convert this error code into an axum JSON error response.
    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

/// Build the read/control HTTP router.
pub fn build_http_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/", get(http::identity))
        .route("/events", get(http::events))
        .route("/status", get(http::status))
        .route("/ports", get(http::ports))
        .route("/tabs", get(http::tabs))
        .route("/watch-rules", get(http::watch_rules))
        .route("/watched-events", get(http::watched_events))
        .route("/config", get(http::config))
        .route("/session", get(http::session))
        .route("/command", post(http::command))
        .fallback(http::not_found)
        .method_not_allowed_fallback(http::method_not_allowed)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build the WebSocket router; every path upgrades.
pub fn build_ws_router(state: Arc<HubState>) -> Router {
    Router::new().fallback(get(ws::ws_handler)).with_state(state)
}

/// Serve the HTTP endpoint until hub shutdown.
pub fn serve_http(state: Arc<HubState>, listener: TcpListener) {
    let shutdown = state.shutdown.clone();
    let router = build_http_router(state);
    tokio::spawn(async move {
        let result =
            axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await;
        if let Err(e) = result {
            error!("HTTP server error: {e}");
        }
    });
}

/// Serve the WebSocket endpoint until hub shutdown.
pub fn serve_ws(state: Arc<HubState>, listener: TcpListener) {
    let shutdown = state.shutdown.clone();
    let router = build_ws_router(state);
    tokio::spawn(async move {
        let result =
            axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await;
        if let Err(e) = result {
            error!("WebSocket server error: {e}");
        }
    });
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
