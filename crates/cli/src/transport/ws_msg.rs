// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket inbound message types.
//!
//! Frames are UTF-8 JSON, tagged by `type`. A bare `{source, level,
//! payload}` object (the legacy extension wire format) is accepted as a
//! `browser_event`. Unrecognized frames parse to `None` and are dropped.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// A page-context event pushed by the browser extension.
    BrowserEvent {
        source: String,
        level: String,
        payload: Value,
    },
    /// A user interaction observed in the page.
    BrowserInteraction {
        #[serde(rename = "interactionType")]
        interaction_type: String,
        target: Option<String>,
        value: Option<String>,
        url: Option<String>,
        x: Option<f64>,
        y: Option<f64>,
    },
    /// Tab identity refresh from the extension service worker.
    BrowserTabInfo {
        #[serde(rename = "tabId")]
        tab_id: String,
        #[serde(rename = "tabUrl", default)]
        tab_url: String,
        #[serde(rename = "tabTitle", default)]
        tab_title: String,
    },
    /// A storage snapshot frame.
    BrowserStorage { payload: Value },
}

/// Legacy bare event frame with no `type` tag.
#[derive(Debug, Clone, Deserialize)]
struct LegacyEventFrame {
    source: String,
    level: String,
    payload: Value,
}

/// Parse one inbound text frame; `None` means silently drop it.
pub fn parse_inbound(text: &str) -> Option<InboundMessage> {
    if let Ok(message) = serde_json::from_str::<InboundMessage>(text) {
        return Some(message);
    }
    serde_json::from_str::<LegacyEventFrame>(text).ok().map(|frame| InboundMessage::BrowserEvent {
        source: frame.source,
        level: frame.level,
        payload: frame.payload,
    })
}
