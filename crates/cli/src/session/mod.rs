// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session recording — a time-bounded, serializable, diffable capture of
//! events, interactions, watched events, and storage snapshots.
//!
//! The recorder seeds itself from whatever is already in the event ring at
//! `start()` and appends everything that arrives afterwards. `stop()`
//! freezes the capture; later reads return the frozen value. Export is the
//! redaction boundary for storage values.

pub mod diff;

pub use diff::{diff, SessionDiff};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ErrorCode;
use crate::event::{now_ms, Event, Interaction, Level, Source, StorageSnapshot};
use crate::redact::REDACTED;
use crate::watch::WatchedEvent;

/// Literal version string of the session file format.
pub const SESSION_VERSION: &str = "1.0";

/// How many distinct error messages the summary keeps.
const TOP_ERRORS: usize = 5;

/// Host and build facts captured alongside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub framework: String,
    pub node_version: String,
    pub platform: String,
    pub daibug_version: String,
    pub cmd: String,
    pub started_at: u64,
}

impl Environment {
    /// Environment for a hub supervising `cmd`; the framework tag is filled
    /// in once detection locks.
    pub fn for_command(cmd: &str) -> Self {
        Self {
            framework: "unknown".to_owned(),
            node_version: detect_node_version().unwrap_or_else(|| "unknown".to_owned()),
            platform: std::env::consts::OS.to_owned(),
            daibug_version: env!("CARGO_PKG_VERSION").to_owned(),
            cmd: cmd.to_owned(),
            started_at: now_ms(),
        }
    }
}

fn detect_node_version() -> Option<String> {
    static NODE_VERSION: std::sync::OnceLock<Option<String>> = std::sync::OnceLock::new();
    NODE_VERSION
        .get_or_init(|| {
            let output = std::process::Command::new("node").arg("--version").output().ok()?;
            if !output.status.success() {
                return None;
            }
            let version = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            (!version.is_empty()).then_some(version)
        })
        .clone()
}

/// One error message with its occurrence count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopError {
    pub message: String,
    pub count: usize,
}

/// Aggregate counts computed deterministically over the sorted events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total_events: usize,
    pub error_count: usize,
    pub warn_count: usize,
    pub network_requests: usize,
    pub failed_requests: usize,
    pub interaction_count: usize,
    pub duration: u64,
    pub top_errors: Vec<TopError>,
}

/// A complete recorded session (the on-disk document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub version: String,
    pub id: String,
    pub exported_at: u64,
    pub environment: Environment,
    pub config: Config,
    pub events: Vec<Event>,
    pub interactions: Vec<Interaction>,
    pub watched_events: Vec<WatchedEvent>,
    pub storage_snapshots: Vec<StorageSnapshot>,
    pub summary: SessionSummary,
}

/// Records events and companion streams between `start` and `stop`.
#[derive(Debug)]
pub struct SessionRecorder {
    id: String,
    environment: Environment,
    config: Config,
    events: Vec<Event>,
    interactions: Vec<Interaction>,
    watched_events: Vec<WatchedEvent>,
    storage_snapshots: Vec<StorageSnapshot>,
    active: bool,
    frozen: Option<Session>,
}

impl SessionRecorder {
    /// Begin recording. `seed` is the event-ring snapshot at start time.
    pub fn start(config: Config, environment: Environment, seed: Vec<Event>) -> Self {
        Self {
            id: format!("session_{}", now_ms()),
            environment,
            config,
            events: seed,
            interactions: Vec::new(),
            watched_events: Vec::new(),
            storage_snapshots: Vec::new(),
            active: true,
            frozen: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Update the detected framework tag after lock-in.
    pub fn set_framework(&mut self, framework: &str) {
        if self.active {
            self.environment.framework = framework.to_owned();
        }
    }

    pub fn record_event(&mut self, event: &Event) {
        if self.active {
            self.events.push(event.clone());
        }
    }

    pub fn record_interaction(&mut self, interaction: &Interaction) {
        if self.active {
            self.interactions.push(interaction.clone());
        }
    }

    pub fn record_watched(&mut self, watched: &WatchedEvent) {
        if self.active {
            self.watched_events.push(watched.clone());
        }
    }

    pub fn record_storage(&mut self, snapshot: &StorageSnapshot) {
        if self.active {
            self.storage_snapshots.push(snapshot.clone());
        }
    }

    /// Stop recording and freeze the capture.
    pub fn stop(&mut self) {
        if self.active {
            self.active = false;
            self.frozen = Some(self.build_session());
        }
    }

    /// Current (active) or frozen (stopped) session.
    pub fn snapshot(&self) -> Session {
        match self.frozen {
            Some(ref frozen) => frozen.clone(),
            None => self.build_session(),
        }
    }

    /// Summary of the current or frozen capture.
    pub fn summary(&self) -> SessionSummary {
        match self.frozen {
            Some(ref frozen) => frozen.summary.clone(),
            None => compute_summary(&self.events, self.interactions.len()),
        }
    }

    /// Serialize the session, re-applying field redaction to storage
    /// snapshot values.
    pub fn export_string(&self) -> Result<String, ErrorCode> {
        let mut session = self.snapshot();
        redact_storage_values(&mut session.storage_snapshots, &self.config.redact.fields);
        serde_json::to_string_pretty(&session).map_err(|_| ErrorCode::Internal)
    }

    /// Write the exported session to disk, creating parent directories.
    pub fn export(&self, path: &Path) -> anyhow::Result<()> {
        let text = self.export_string().map_err(|code| anyhow::anyhow!("{code}"))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    fn build_session(&self) -> Session {
        let mut events = self.events.clone();
        sort_events(&mut events);
        let summary = compute_summary(&events, self.interactions.len());
        Session {
            version: SESSION_VERSION.to_owned(),
            id: self.id.clone(),
            exported_at: now_ms(),
            environment: self.environment.clone(),
            config: self.config.clone(),
            events,
            interactions: self.interactions.clone(),
            watched_events: self.watched_events.clone(),
            storage_snapshots: self.storage_snapshots.clone(),
            summary,
        }
    }
}

/// Parse a session document, enforcing the version and a non-empty id.
pub fn import_string(text: &str) -> Result<Session, ErrorCode> {
    let session: Session = serde_json::from_str(text).map_err(|_| ErrorCode::InvalidFormat)?;
    if session.version != SESSION_VERSION || session.id.is_empty() {
        return Err(ErrorCode::InvalidFormat);
    }
    Ok(session)
}

/// Read and parse a session file.
pub fn import(path: &Path) -> anyhow::Result<Session> {
    let text = std::fs::read_to_string(path)
        .map_err(|_| anyhow::anyhow!("{}: {}", ErrorCode::NotFound, path.display()))?;
    import_string(&text).map_err(|code| anyhow::anyhow!("{code}: {}", path.display()))
}

/// Order events by `(ts, id)` — the canonical order for summaries and diffs.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id)));
}

/// Compute the deterministic summary over already-sorted events.
pub fn compute_summary(events: &[Event], interaction_count: usize) -> SessionSummary {
    let mut error_count = 0;
    let mut warn_count = 0;
    let mut network_requests = 0;
    let mut failed_requests = 0;
    let mut error_messages: std::collections::BTreeMap<String, usize> = Default::default();

    for event in events {
        match event.level {
            Level::Error => {
                error_count += 1;
                if let Some(message) = event.payload.get("message").and_then(|v| v.as_str()) {
                    *error_messages.entry(message.to_owned()).or_insert(0) += 1;
                }
            }
            Level::Warn => warn_count += 1,
            _ => {}
        }
        if event.source == Source::BrowserNetwork {
            network_requests += 1;
            let failed = event
                .payload
                .get("status")
                .and_then(|v| v.as_i64())
                .is_some_and(|status| !(200..400).contains(&status));
            if failed {
                failed_requests += 1;
            }
        }
    }

    let duration = match (events.first(), events.last()) {
        (Some(first), Some(last)) => last.ts.saturating_sub(first.ts),
        _ => 0,
    };

    // Top errors by frequency; the BTreeMap iteration breaks ties
    // lexicographically.
    let mut top: Vec<TopError> = error_messages
        .into_iter()
        .map(|(message, count)| TopError { message, count })
        .collect();
    top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.message.cmp(&b.message)));
    top.truncate(TOP_ERRORS);

    SessionSummary {
        total_events: events.len(),
        error_count,
        warn_count,
        network_requests,
        failed_requests,
        interaction_count,
        duration,
        top_errors: top,
    }
}

/// Replace values under sensitive keys in storage snapshots.
fn redact_storage_values(snapshots: &mut [StorageSnapshot], fields: &[String]) {
    let lowered: Vec<String> = fields.iter().map(|f| f.to_lowercase()).collect();
    let sensitive = |key: &str| lowered.iter().any(|f| *f == key.to_lowercase());
    for snapshot in snapshots {
        for (key, value) in snapshot.local_storage.iter_mut() {
            if sensitive(key) {
                *value = REDACTED.to_owned();
            }
        }
        for (key, value) in snapshot.session_storage.iter_mut() {
            if sensitive(key) {
                *value = REDACTED.to_owned();
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
