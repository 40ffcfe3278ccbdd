// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration schema, defaults, file loading, and CLI flag mapping.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::event::Source;
use crate::watch::{RuleConditions, RuleSpec};

/// Name of the config file discovered in the working directory.
pub const CONFIG_FILE_NAME: &str = "daibug.config.json";

/// The browser console levels the hub can ask clients to forward.
pub const CONSOLE_LEVELS: [&str; 4] = ["log", "debug", "warn", "error"];

/// Local observability hub for frontend development.
#[derive(Debug, Parser)]
#[command(name = "daibug", version, about)]
pub struct CliArgs {
    /// Dev-server command to spawn and supervise.
    #[arg(long, env = "DAIBUG_CMD")]
    pub cmd: Option<String>,

    /// Console capture preset (all, verbose, errors, errors-and-warnings,
    /// or a comma-separated list of levels).
    #[arg(long)]
    pub console: Option<String>,

    /// Add a network watch rule: `<urlGlob>:<csv of status codes>`.
    #[arg(long)]
    pub watch_network: Option<String>,

    /// Extra sensitive field names to redact (comma-separated).
    #[arg(long)]
    pub redact: Option<String>,

    /// Start recording a session as soon as the hub is up.
    #[arg(long)]
    pub session_auto_start: bool,

    /// Path to a JSON config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Skip discovery of daibug.config.json in the working directory.
    #[arg(long)]
    pub no_config: bool,

    /// Serve the tool surface over stdin/stdout (line-delimited JSON).
    #[arg(long)]
    pub mcp: bool,

    /// HTTP port to listen on.
    #[arg(long, env = "DAIBUG_HTTP_PORT")]
    pub http_port: Option<u16>,

    /// WebSocket port to listen on.
    #[arg(long, env = "DAIBUG_WS_PORT")]
    pub ws_port: Option<u16>,

    /// Log format (json or text).
    #[arg(long, env = "DAIBUG_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DAIBUG_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Top-level hub configuration (the `daibug.config.json` schema).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub console: ConsoleConfig,
    pub network: NetworkConfig,
    pub watch: Vec<WatchRuleConfig>,
    pub redact: RedactConfig,
    pub hub: HubPorts,
    pub session: SessionOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsoleConfig {
    pub include: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self { include: vec!["error".into(), "warn".into(), "log".into()] }
    }
}

impl ConsoleConfig {
    /// The include list with aliases expanded and unknown names dropped.
    pub fn effective_include(&self) -> Vec<String> {
        expand_console_include(&self.include)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkConfig {
    pub capture_body: bool,
    pub max_body_size: u64,
    pub ignore: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { capture_body: true, max_body_size: 51_200, ignore: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactConfig {
    pub fields: Vec<String>,
    pub url_patterns: Vec<String>,
}

impl Default for RedactConfig {
    fn default() -> Self {
        Self {
            fields: vec!["password".into(), "token".into(), "authorization".into(), "cookie".into()],
            url_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HubPorts {
    pub http_port: u16,
    pub ws_port: u16,
}

impl Default for HubPorts {
    fn default() -> Self {
        Self { http_port: 5000, ws_port: 4999 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionOptions {
    pub auto_start: bool,
    pub capture_storage: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { auto_start: false, capture_storage: true }
    }
}

/// A watch rule as declared in config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRuleConfig {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(flatten)]
    pub conditions: RuleConditions,
}

impl WatchRuleConfig {
    pub fn to_spec(&self) -> RuleSpec {
        RuleSpec {
            label: self.label.clone(),
            source: self.source,
            conditions: self.conditions.clone(),
        }
    }
}

impl Config {
    /// Parse a config document from JSON text.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| anyhow::anyhow!("{}: {e}", crate::error::ErrorCode::InvalidFormat))?;
        Ok(config)
    }

    /// Load a config file from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        Self::from_json(&text)
    }

    /// Resolve the effective config from CLI flags: explicit `--config`,
    /// else `daibug.config.json` in the working directory unless
    /// `--no-config`, else defaults; CLI flags override file values.
    pub fn resolve(args: &CliArgs) -> anyhow::Result<Self> {
        let mut config = if let Some(ref path) = args.config {
            Self::load(path)?
        } else if !args.no_config && Path::new(CONFIG_FILE_NAME).exists() {
            Self::load(Path::new(CONFIG_FILE_NAME))?
        } else {
            Self::default()
        };
        config.apply_cli(args);
        Ok(config)
    }

    /// Overlay CLI flags onto the loaded config.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(ref preset) = args.console {
            self.console.include = preset.split(',').map(|s| s.trim().to_owned()).collect();
        }
        if let Some(ref spec) = args.watch_network {
            self.watch.push(parse_watch_network(spec));
        }
        if let Some(ref csv) = args.redact {
            for field in csv.split(',') {
                let field = field.trim();
                if !field.is_empty() && !self.redact.fields.iter().any(|f| f == field) {
                    self.redact.fields.push(field.to_owned());
                }
            }
        }
        if args.session_auto_start {
            self.session.auto_start = true;
        }
        if let Some(port) = args.http_port {
            self.hub.http_port = port;
        }
        if let Some(port) = args.ws_port {
            self.hub.ws_port = port;
        }
    }

    /// Validate the config; an empty list means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.hub.http_port == 0 {
            errors.push("hub.httpPort must be between 1 and 65535".to_owned());
        }
        if self.hub.ws_port == 0 {
            errors.push("hub.wsPort must be between 1 and 65535".to_owned());
        }
        if self.hub.http_port != 0 && self.hub.http_port == self.hub.ws_port {
            errors.push("hub.httpPort and hub.wsPort must differ".to_owned());
        }
        for (idx, rule) in self.watch.iter().enumerate() {
            if rule.label.trim().is_empty() {
                errors.push(format!("watch[{idx}]: label must not be empty"));
            }
            if rule.conditions.is_empty() {
                errors.push(format!("watch[{idx}]: at least one condition is required"));
            }
        }
        errors
    }
}

/// Expand console include aliases and drop unknown level names.
///
/// `all`/`verbose` expand to the full set, `errors` to `{error}`,
/// `errors-and-warnings` to `{error, warn}`.
pub fn expand_console_include(raw: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |level: &str| {
        if !out.iter().any(|l| l == level) {
            out.push(level.to_owned());
        }
    };
    for name in raw {
        match name.as_str() {
            "all" | "verbose" => CONSOLE_LEVELS.iter().for_each(|l| push(l)),
            "errors" => push("error"),
            "errors-and-warnings" => {
                push("error");
                push("warn");
            }
            other if CONSOLE_LEVELS.contains(&other) => push(other),
            _ => {}
        }
    }
    out
}

/// Parse a `--watch-network <urlGlob>:<csv of status codes>` flag value.
fn parse_watch_network(spec: &str) -> WatchRuleConfig {
    let (pattern, codes) = match spec.rsplit_once(':') {
        Some((pattern, csv)) if csv.chars().all(|c| c.is_ascii_digit() || c == ',') && !csv.is_empty() => {
            let codes: Vec<i64> = csv.split(',').filter_map(|c| c.parse().ok()).collect();
            (pattern, if codes.is_empty() { None } else { Some(codes) })
        }
        _ => (spec, None),
    };
    WatchRuleConfig {
        label: format!("network {pattern}"),
        source: Some(Source::BrowserNetwork),
        conditions: RuleConditions {
            url_pattern: Some(pattern.to_owned()),
            status_codes: codes,
            ..Default::default()
        },
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
