// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event model and id factory.
//!
//! Every observed occurrence — a dev-server line, a browser console entry,
//! a network request — becomes one immutable [`Event`]. Ids are
//! `evt_<13-digit-ms>_<3-digit-seq>`; the sequence runs within a single
//! observed millisecond and restarts on the next one, so events minted in
//! one batch carry adjacent suffixes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ErrorCode;

/// Closed set of event origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "vite")]
    Vite,
    #[serde(rename = "next")]
    Next,
    #[serde(rename = "devserver")]
    Devserver,
    #[serde(rename = "browser:console")]
    BrowserConsole,
    #[serde(rename = "browser:network")]
    BrowserNetwork,
    #[serde(rename = "browser:dom")]
    BrowserDom,
    #[serde(rename = "browser:storage")]
    BrowserStorage,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vite => "vite",
            Self::Next => "next",
            Self::Devserver => "devserver",
            Self::BrowserConsole => "browser:console",
            Self::BrowserNetwork => "browser:network",
            Self::BrowserDom => "browser:dom",
            Self::BrowserStorage => "browser:storage",
        }
    }
}

impl FromStr for Source {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, ErrorCode> {
        match s {
            "vite" => Ok(Self::Vite),
            "next" => Ok(Self::Next),
            "devserver" => Ok(Self::Devserver),
            "browser:console" => Ok(Self::BrowserConsole),
            "browser:network" => Ok(Self::BrowserNetwork),
            "browser:dom" => Ok(Self::BrowserDom),
            "browser:storage" => Ok(Self::BrowserStorage),
            _ => Err(ErrorCode::InvalidKind),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of event severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
    Debug,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

impl FromStr for Level {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, ErrorCode> {
        match s {
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "debug" => Ok(Self::Debug),
            _ => Err(ErrorCode::InvalidKind),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payloads are always JSON objects, never null or a scalar.
pub type Payload = serde_json::Map<String, Value>;

/// One observed occurrence. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub ts: u64,
    pub source: Source,
    pub level: Level,
    pub payload: Payload,
}

/// A recorded user interaction (click, input, navigation, ...).
///
/// Interactions live in their own bounded ring and never enter the event
/// stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub ts: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

/// A connected browser tab. `connected_at` is stable across updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub tab_id: String,
    pub url: String,
    pub title: String,
    pub connected_at: u64,
}

/// A point-in-time capture of a tab's web storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSnapshot {
    pub ts: u64,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<String>,
    #[serde(default)]
    pub local_storage: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub session_storage: std::collections::BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Value>,
}

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Monotonic millisecond clock with a per-millisecond sequence counter.
///
/// `tick()` never moves backwards even if the wall clock does; the sequence
/// starts at 1 for each new millisecond and increments while the clock
/// reading is unchanged. This is the batching boundary for id suffixes.
#[derive(Debug)]
pub struct SeqClock {
    last_ms: u64,
    seq: u32,
}

impl SeqClock {
    pub fn new() -> Self {
        Self { last_ms: 0, seq: 0 }
    }

    pub fn tick(&mut self) -> (u64, u32) {
        let now = now_ms().max(self.last_ms);
        if now == self.last_ms {
            self.seq += 1;
        } else {
            self.last_ms = now;
            self.seq = 1;
        }
        (self.last_ms, self.seq)
    }
}

impl Default for SeqClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Mints ids of the form `<prefix>_<ms>_<3-digit-seq>`.
#[derive(Debug)]
pub struct IdMint {
    prefix: &'static str,
    clock: SeqClock,
}

impl IdMint {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, clock: SeqClock::new() }
    }

    pub fn next(&mut self) -> (String, u64) {
        let (ms, seq) = self.clock.tick();
        (format!("{}_{ms}_{seq:03}", self.prefix), ms)
    }
}

/// Constructs events with monotonic ids and timestamps.
///
/// Callers must serialize construction; the hub funnels all event creation
/// through its single ingestion path.
#[derive(Debug, Default)]
pub struct EventFactory {
    clock: SeqClock,
}

impl EventFactory {
    pub fn new() -> Self {
        Self { clock: SeqClock::new() }
    }

    /// Build an event. Fails with `INVALID_KIND` when the payload is not a
    /// JSON object (source and level are already closed enums here; wire
    /// handlers map unknown tag strings to the same error before reaching
    /// the factory).
    pub fn create(&mut self, source: Source, level: Level, payload: Value) -> Result<Event, ErrorCode> {
        let Value::Object(payload) = payload else {
            return Err(ErrorCode::InvalidKind);
        };
        let (ts, seq) = self.clock.tick();
        Ok(Event { id: format!("evt_{ts:013}_{seq:03}"), ts, source, level, payload })
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
