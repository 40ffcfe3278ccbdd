// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The hub — owns every registry, the ingest pipeline, command broadcast,
//! and lifecycle.
//!
//! All state mutation is funnelled through [`HubState`]'s single core mutex
//! so id assignment, redaction, ring insertion, watch evaluation, and
//! recording happen atomically per event. Fan-out to WebSocket clients and
//! correlated waiters goes through a broadcast channel after the lock is
//! released; a slow subscriber can lag and be dropped, never stall
//! ingestion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::detect::FrameworkDetector;
use crate::error::ErrorCode;
use crate::event::{
    now_ms, Event, EventFactory, IdMint, Interaction, Level, Source, StorageSnapshot, TabInfo,
};
use crate::redact::Redactor;
use crate::ring::Ring;
use crate::session::{Environment, Session, SessionRecorder, SessionSummary};
use crate::supervisor::Supervisor;
use crate::watch::{RuleSpec, WatchEngine, WatchRule, WatchedEvent};

/// Fixed store capacities.
pub const EVENT_RING_CAPACITY: usize = 500;
pub const INTERACTION_RING_CAPACITY: usize = 200;

/// How long `start()` waits for the first event to drain, and the poll step.
const DRAIN_WAIT: Duration = Duration::from_millis(700);
const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Back-ends the hub exposes; the tool registry is built from these.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub watch: bool,
    pub session: bool,
}

/// Which child stream a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStream {
    Stdout,
    Stderr,
}

/// Registries and serialized producers, guarded by one mutex.
struct HubCore {
    factory: EventFactory,
    interaction_ids: IdMint,
    detector: FrameworkDetector,
    events: Ring<Event>,
    interactions: Ring<Interaction>,
    tabs: HashMap<String, TabInfo>,
    watch: WatchEngine,
    recorder: Option<SessionRecorder>,
}

/// Shared hub state handed to transports, tools, and the supervisor.
pub struct HubState {
    pub config: Config,
    core: Mutex<HubCore>,
    redactor: Redactor,
    event_tx: broadcast::Sender<Event>,
    command_tx: broadcast::Sender<Value>,
    pub shutdown: CancellationToken,
    client_count: AtomicI32,
    dev_server_running: AtomicBool,
    http_port: AtomicU16,
    ws_port: AtomicU16,
    started_at_ms: u64,
    cmd: String,
}

impl HubState {
    pub fn new(config: Config, cmd: &str) -> Arc<Self> {
        let redactor = Redactor::new(&config.redact.fields, &config.redact.url_patterns);
        let (event_tx, _) = broadcast::channel(256);
        let (command_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            config,
            core: Mutex::new(HubCore {
                factory: EventFactory::new(),
                interaction_ids: IdMint::new("int"),
                detector: FrameworkDetector::with_command_hint(cmd),
                events: Ring::new(EVENT_RING_CAPACITY),
                interactions: Ring::new(INTERACTION_RING_CAPACITY),
                tabs: HashMap::new(),
                watch: WatchEngine::new(),
                recorder: None,
            }),
            redactor,
            event_tx,
            command_tx,
            shutdown: CancellationToken::new(),
            client_count: AtomicI32::new(0),
            dev_server_running: AtomicBool::new(false),
            http_port: AtomicU16::new(0),
            ws_port: AtomicU16::new(0),
            started_at_ms: now_ms(),
            cmd: cmd.to_owned(),
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities { watch: true, session: true }
    }

    // -- Ingest pipeline ------------------------------------------------------

    /// The single serialized ingest path: tab upsert → construct → redact →
    /// watch evaluation → ring → recorder, then broadcast.
    pub fn ingest(&self, source: Source, level: Level, payload: Value) -> Result<Event, ErrorCode> {
        let (event, watched) = {
            let mut core = self.core.lock();

            if let Some(tab_id) = payload.get("tabId").and_then(Value::as_str) {
                let url = payload.get("url").and_then(Value::as_str);
                core.touch_tab(tab_id, url, None);
            }

            let event = core.factory.create(source, level, payload)?;
            let mut event = self.redactor.redact_event(&event);
            let watched = core.watch.evaluate(&mut event);
            core.events.push(event.clone());
            if let Some(recorder) = core.recorder.as_mut() {
                recorder.record_event(&event);
                for entry in &watched {
                    recorder.record_watched(entry);
                }
            }
            (event, watched)
        };

        if !watched.is_empty() {
            debug!(event = %event.id, rule = %watched[0].matched_rule.label, "watch rule matched");
        }
        let _ = self.event_tx.send(event.clone());
        Ok(event)
    }

    /// Ingest an inbound browser event after tag validation. Malformed
    /// frames are logged and skipped; they never fail the caller.
    pub fn ingest_browser_event(&self, source: &str, level: &str, payload: Value) {
        match (source.parse::<Source>(), level.parse::<Level>()) {
            (Ok(source), Ok(level)) => {
                if let Err(code) = self.ingest(source, level, payload) {
                    debug!(%code, "dropped browser event");
                }
            }
            _ => debug!(source, level, "dropped browser event with unknown tags"),
        }
    }

    /// Ingest one line of child output.
    pub fn ingest_child_line(&self, line: &str, stream: ChildStream) {
        let source = {
            let mut core = self.core.lock();
            let source = core.detector.classify_line(line);
            if let Some(framework) = core.detector.locked() {
                if let Some(recorder) = core.recorder.as_mut() {
                    recorder.set_framework(framework.as_str());
                }
            }
            source
        };
        let level = match stream {
            ChildStream::Stdout => Level::Info,
            ChildStream::Stderr => Level::Warn,
        };
        let payload = serde_json::json!({ "message": line });
        if let Err(code) = self.ingest(source, level, payload) {
            debug!(%code, "dropped child output line");
        }
    }

    /// Record a spawn failure as an error event.
    pub fn ingest_child_failure(&self, message: &str) {
        self.dev_server_running.store(false, Ordering::Release);
        let source = self.core.lock().detector.locked().unwrap_or(Source::Devserver);
        let payload = serde_json::json!({ "message": message, "exitCode": 1 });
        if let Err(code) = self.ingest(source, Level::Error, payload) {
            debug!(%code, "dropped child failure event");
        }
    }

    /// Record a non-zero child exit as an error event.
    pub fn ingest_child_exit(&self, exit_code: i32) {
        self.dev_server_running.store(false, Ordering::Release);
        if exit_code == 0 {
            return;
        }
        let source = self.core.lock().detector.locked().unwrap_or(Source::Devserver);
        let payload = serde_json::json!({ "exitCode": exit_code });
        if let Err(code) = self.ingest(source, Level::Error, payload) {
            debug!(%code, "dropped child exit event");
        }
    }

    /// Append a browser interaction to its ring.
    pub fn record_interaction(
        &self,
        kind: &str,
        target: Option<String>,
        value: Option<String>,
        url: Option<String>,
        x: Option<f64>,
        y: Option<f64>,
    ) -> Interaction {
        let mut core = self.core.lock();
        let (id, ts) = core.interaction_ids.next();
        let interaction = Interaction { id, ts, kind: kind.to_owned(), target, value, url, x, y };
        core.interactions.push(interaction.clone());
        if let Some(recorder) = core.recorder.as_mut() {
            recorder.record_interaction(&interaction);
        }
        interaction
    }

    /// Upsert a tab, preserving the original `connectedAt`.
    pub fn upsert_tab(&self, tab_id: &str, url: &str, title: &str) {
        self.core.lock().touch_tab(tab_id, Some(url), Some(title));
    }

    /// Ingest a storage snapshot frame: recorded for the active session and
    /// re-emitted as a `browser:storage` event.
    pub fn ingest_storage(&self, payload: Value) {
        if self.config.session.capture_storage {
            if let Some(snapshot) = parse_storage_snapshot(&payload) {
                let mut core = self.core.lock();
                if let Some(recorder) = core.recorder.as_mut() {
                    recorder.record_storage(&snapshot);
                }
            }
        }
        if let Err(code) = self.ingest(Source::BrowserStorage, Level::Info, payload) {
            debug!(%code, "dropped storage snapshot event");
        }
    }

    // -- Reads ----------------------------------------------------------------

    /// Events currently in the ring, oldest first (a fresh copy).
    pub fn events(&self) -> Vec<Event> {
        self.core.lock().events.to_vec()
    }

    pub fn event_count(&self) -> usize {
        self.core.lock().events.len()
    }

    pub fn clear_events(&self) {
        self.core.lock().events.clear();
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.core.lock().interactions.to_vec()
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        let core = self.core.lock();
        let mut tabs: Vec<TabInfo> = core.tabs.values().cloned().collect();
        tabs.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then_with(|| a.tab_id.cmp(&b.tab_id)));
        tabs
    }

    pub fn detected_framework(&self) -> Option<Source> {
        self.core.lock().detector.locked()
    }

    pub fn connected_clients(&self) -> i32 {
        self.client_count.load(Ordering::Acquire)
    }

    pub fn client_connected(&self) {
        self.client_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn client_disconnected(&self) {
        self.client_count.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn is_dev_server_running(&self) -> bool {
        self.dev_server_running.load(Ordering::Acquire)
    }

    pub(crate) fn set_dev_server_running(&self, running: bool) {
        self.dev_server_running.store(running, Ordering::Release);
    }

    pub fn uptime_secs(&self) -> u64 {
        now_ms().saturating_sub(self.started_at_ms) / 1000
    }

    pub fn set_ports(&self, http: u16, ws: u16) {
        self.http_port.store(http, Ordering::Release);
        self.ws_port.store(ws, Ordering::Release);
    }

    /// The resolved `(http, ws)` port pair.
    pub fn ports(&self) -> (u16, u16) {
        (self.http_port.load(Ordering::Acquire), self.ws_port.load(Ordering::Acquire))
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    // -- Watch rules ----------------------------------------------------------

    pub fn add_watch_rule(&self, spec: RuleSpec) -> Result<WatchRule, ErrorCode> {
        self.core.lock().watch.add_rule(spec)
    }

    pub fn remove_watch_rule(&self, id: &str) -> bool {
        self.core.lock().watch.remove_rule(id)
    }

    pub fn watch_rules(&self) -> Vec<WatchRule> {
        self.core.lock().watch.list_rules()
    }

    pub fn watched_events(&self, limit: Option<usize>, rule_id: Option<&str>) -> Vec<WatchedEvent> {
        self.core.lock().watch.matched(limit, rule_id)
    }

    pub fn clear_watched_events(&self) {
        self.core.lock().watch.clear_matched()
    }

    // -- Sessions -------------------------------------------------------------

    /// Start a fresh recording: clears the event ring first so the new
    /// session only sees what happens from here on.
    pub fn start_session(&self) -> String {
        let mut core = self.core.lock();
        core.events.clear();
        let id = core.begin_recorder(&self.config, &self.cmd, Vec::new());
        info!(session = %id, "session started");
        id
    }

    /// Start a recorder seeded with the current ring contents (used by
    /// `session.autoStart`).
    pub fn start_session_seeded(&self) -> String {
        let mut core = self.core.lock();
        let seed = core.events.to_vec();
        core.begin_recorder(&self.config, &self.cmd, seed)
    }

    /// Stop the active recorder; returns its frozen summary.
    pub fn stop_session(&self) -> Option<SessionSummary> {
        let mut core = self.core.lock();
        let recorder = core.recorder.as_mut()?;
        if !recorder.is_active() {
            return None;
        }
        recorder.stop();
        Some(recorder.summary())
    }

    /// `(active, summary)` for the active or last-stopped recorder.
    pub fn session_status(&self) -> (bool, Option<SessionSummary>) {
        let core = self.core.lock();
        match core.recorder {
            Some(ref recorder) => (recorder.is_active(), Some(recorder.summary())),
            None => (false, None),
        }
    }

    /// Snapshot of the active or last-stopped session.
    pub fn session_snapshot(&self) -> Option<Session> {
        self.core.lock().recorder.as_ref().map(|r| r.snapshot())
    }

    /// Export the current session to disk.
    pub fn export_session(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let core = self.core.lock();
        match core.recorder {
            Some(ref recorder) => recorder.export(path),
            None => Err(anyhow::anyhow!("{}: no session to export", ErrorCode::NotFound)),
        }
    }

    // -- Fan-out --------------------------------------------------------------

    /// Subscribe to the live event broadcast. New subscribers see only
    /// events ingested after this call — no historical backlog.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe to command frames destined for browser clients.
    pub fn subscribe_commands(&self) -> broadcast::Receiver<Value> {
        self.command_tx.subscribe()
    }

    /// Broadcast a command frame to all connected WebSocket clients.
    pub fn broadcast_command(&self, frame: Value) -> usize {
        self.command_tx.send(frame).unwrap_or(0)
    }

    /// Await the first event on `rx` matching `predicate`, up to `timeout`.
    ///
    /// Callers subscribe *before* broadcasting their command so the
    /// response cannot slip past. The subscription lives only for the
    /// duration of the wait; hub shutdown cancels it with the same timeout
    /// error.
    pub async fn wait_for_event<F>(
        &self,
        mut rx: broadcast::Receiver<Event>,
        timeout: Duration,
        predicate: F,
    ) -> Result<Event, ErrorCode>
    where
        F: Fn(&Event) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(ErrorCode::CommandTimeout),
                _ = tokio::time::sleep_until(deadline) => return Err(ErrorCode::CommandTimeout),
                event = rx.recv() => event,
            };
            match event {
                Ok(event) if predicate(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("command wait lagged by {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ErrorCode::CommandTimeout),
            }
        }
    }
}

impl HubCore {
    /// Install a new recorder, stamping the detected framework into its
    /// environment.
    fn begin_recorder(&mut self, config: &Config, cmd: &str, seed: Vec<Event>) -> String {
        let mut environment = Environment::for_command(cmd);
        if let Some(framework) = self.detector.locked() {
            environment.framework = framework.as_str().to_owned();
        }
        let recorder = SessionRecorder::start(config.clone(), environment, seed);
        let id = recorder.id().to_owned();
        self.recorder = Some(recorder);
        id
    }

    /// Create or refresh a tab entry, keeping the original `connectedAt`.
    fn touch_tab(&mut self, tab_id: &str, url: Option<&str>, title: Option<&str>) {
        match self.tabs.get_mut(tab_id) {
            Some(tab) => {
                if let Some(url) = url {
                    tab.url = url.to_owned();
                }
                if let Some(title) = title {
                    tab.title = title.to_owned();
                }
            }
            None => {
                self.tabs.insert(
                    tab_id.to_owned(),
                    TabInfo {
                        tab_id: tab_id.to_owned(),
                        url: url.unwrap_or_default().to_owned(),
                        title: title.unwrap_or_default().to_owned(),
                        connected_at: now_ms(),
                    },
                );
            }
        }
    }
}

/// Parse a storage-snapshot payload leniently; frames without storage maps
/// still produce an event but are not recorded as snapshots.
fn parse_storage_snapshot(payload: &Value) -> Option<StorageSnapshot> {
    let obj = payload.as_object()?;
    let string_map = |key: &str| {
        obj.get(key)
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_owned())))
                    .collect()
            })
            .unwrap_or_default()
    };
    let local_storage: std::collections::BTreeMap<String, String> = string_map("localStorage");
    let session_storage: std::collections::BTreeMap<String, String> = string_map("sessionStorage");
    if local_storage.is_empty() && session_storage.is_empty() {
        return None;
    }
    Some(StorageSnapshot {
        ts: now_ms(),
        url: obj.get("url").and_then(Value::as_str).unwrap_or_default().to_owned(),
        tab_id: obj.get("tabId").and_then(Value::as_str).map(str::to_owned),
        local_storage,
        session_storage,
        cookies: obj.get("cookies").cloned(),
    })
}

/// Owns the hub lifecycle: server binds, child supervision, start/stop.
pub struct Hub {
    pub state: Arc<HubState>,
    runtime: Mutex<Lifecycle>,
    child_stdin_null: bool,
}

enum Lifecycle {
    Idle,
    Started { supervisor: Arc<Supervisor> },
    Stopped,
}

impl Hub {
    pub fn new(config: Config, cmd: &str) -> Self {
        Self {
            state: HubState::new(config, cmd),
            runtime: Mutex::new(Lifecycle::Idle),
            child_stdin_null: false,
        }
    }

    /// Detach the child from stdin (the agent bridge owns it in `--mcp`
    /// mode).
    pub fn child_stdin_null(mut self) -> Self {
        self.child_stdin_null = true;
        self
    }

    /// Bind HTTP then WS, spawn the dev server, install config watch rules,
    /// and optionally auto-start a session. Waits briefly for startup output
    /// to drain so early readers observe it.
    pub async fn start(&self) -> anyhow::Result<()> {
        {
            let runtime = self.runtime.lock();
            match *runtime {
                Lifecycle::Idle => {}
                _ => anyhow::bail!("{}: hub already started", ErrorCode::AlreadyStarted),
            }
        }

        let http_config = self.state.config.hub.http_port;
        let ws_config = self.state.config.hub.ws_port;

        let (http_listener, http_port) =
            crate::transport::bind_with_fallback(http_config, &[ws_config]).await?;
        let (ws_listener, ws_port) =
            crate::transport::bind_with_fallback(ws_config, &[http_port]).await?;
        self.state.set_ports(http_port, ws_port);
        info!(http_port, ws_port, "daibug hub listening on loopback");

        crate::transport::serve_http(Arc::clone(&self.state), http_listener);
        crate::transport::serve_ws(Arc::clone(&self.state), ws_listener);

        // Rules and the auto-started session are installed before the child
        // spawns so its first lines are already matched and recorded.
        for rule in &self.state.config.watch {
            if let Err(code) = self.state.add_watch_rule(rule.to_spec()) {
                warn!(%code, label = %rule.label, "skipping invalid watch rule from config");
            }
        }
        if self.state.config.session.auto_start {
            let id = self.state.start_session_seeded();
            info!(session = %id, "session auto-started");
        }

        let stdin = if self.child_stdin_null {
            std::process::Stdio::null()
        } else {
            std::process::Stdio::inherit()
        };
        let supervisor = Arc::new(Supervisor::spawn(&self.state.cmd, Arc::clone(&self.state), stdin));
        *self.runtime.lock() = Lifecycle::Started { supervisor };

        // Give the pipeline a moment to surface startup output.
        let deadline = tokio::time::Instant::now() + DRAIN_WAIT;
        while self.state.event_count() == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL).await;
        }
        Ok(())
    }

    /// Stop the recorder, close both servers and all clients, and terminate
    /// the child. Idempotent after the first call.
    pub async fn stop(&self) -> anyhow::Result<()> {
        let supervisor = {
            let mut runtime = self.runtime.lock();
            match std::mem::replace(&mut *runtime, Lifecycle::Stopped) {
                Lifecycle::Started { supervisor } => Some(supervisor),
                Lifecycle::Stopped => return Ok(()),
                Lifecycle::Idle => {
                    *runtime = Lifecycle::Idle;
                    anyhow::bail!("{}: hub not started", ErrorCode::NotStarted)
                }
            }
        };

        self.state.stop_session();
        // Cancels servers, WS connections, and outstanding command waits.
        self.state.shutdown.cancel();
        if let Some(supervisor) = supervisor {
            supervisor.shutdown().await;
        }
        info!("daibug hub stopped");
        Ok(())
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
