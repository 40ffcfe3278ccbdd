// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoint: browser clients push events and receive commands;
//! observers receive the live event broadcast.
//!
//! Each connection forwards the hub's broadcast channels through its own
//! socket. A client that cannot keep up lags its broadcast receiver and is
//! disconnected; ingestion never waits for a slow socket.

#[path = "ws_msg.rs"]
mod msg;
pub use msg::*;

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::hub::HubState;

/// WebSocket upgrade handler (any path upgrades).
pub async fn ws_handler(
    State(state): State<Arc<HubState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket))
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<HubState>, socket: WebSocket) {
    state.client_connected();

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut event_rx = state.subscribe_events();
    let mut command_rx = state.subscribe_commands();
    let shutdown = state.shutdown.clone();

    // Per-connect one-shot: tell the client which console levels to forward.
    let include = state.config.console.effective_include();
    let filter_sent = include.is_empty()
        || send_json(
            &mut ws_tx,
            &json!({ "type": "command", "command": "set_console_filter", "include": include }),
        )
        .await
        .is_ok();

    if filter_sent {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = event_rx.recv() => {
                    match event {
                        Ok(event) => {
                            if send_json(&mut ws_tx, &event).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("dropping slow WebSocket client (lagged by {n} events)");
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                frame = command_rx.recv() => {
                    match frame {
                        Ok(frame) => {
                            if send_json(&mut ws_tx, &frame).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("dropping slow WebSocket client (lagged by {n} commands)");
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => handle_frame(&state, &text),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!("WebSocket receive error: {e}");
                            break;
                        }
                    }
                }
            }
        }
    }

    state.client_disconnected();
}

/// Demux one inbound frame into the hub. Malformed or unknown frames are
/// dropped without a reply.
fn handle_frame(state: &HubState, text: &str) {
    match parse_inbound(text) {
        Some(InboundMessage::BrowserEvent { source, level, payload }) => {
            state.ingest_browser_event(&source, &level, payload);
        }
        Some(InboundMessage::BrowserInteraction {
            interaction_type,
            target,
            value,
            url,
            x,
            y,
        }) => {
            state.record_interaction(&interaction_type, target, value, url, x, y);
        }
        Some(InboundMessage::BrowserTabInfo { tab_id, tab_url, tab_title }) => {
            state.upsert_tab(&tab_id, &tab_url, &tab_title);
        }
        Some(InboundMessage::BrowserStorage { payload }) => {
            state.ingest_storage(payload);
        }
        None => debug!("dropped unrecognized WebSocket frame"),
    }
}

/// Send a JSON-serialized value as one text frame.
async fn send_json<S, T>(tx: &mut S, value: &T) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
    T: Serialize,
{
    let text = match serde_json::to_string(value) {
        Ok(t) => t,
        Err(_) => return Err(()),
    };
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
