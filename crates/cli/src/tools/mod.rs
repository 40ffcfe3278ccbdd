// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-facing tool surface: a registry of named, schema-described
//! operations over the hub's state.
//!
//! Handlers produce one JSON text fragment and report failures as
//! `{"error": "..."}` payloads instead of raising. The registry is built
//! from the capabilities the hub exposes; watch and session tool groups
//! only appear when their back-ends do.

mod command;
mod query;
mod session;
mod watch;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use crate::hub::HubState;

/// Hard ceiling for command/response tool timeouts.
pub const MAX_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default command/response timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// One field of a tool's input schema.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub required: bool,
}

/// Declarative object schema for a tool's arguments.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InputSchema {
    pub fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_owned(),
            kind: kind.to_owned(),
            description: description.to_owned(),
            required: false,
        });
        self
    }

    pub fn required(mut self, name: &str, kind: &str, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_owned(),
            kind: kind.to_owned(),
            description: description.to_owned(),
            required: true,
        });
        self
    }

    /// Render as a JSON-Schema-shaped object for discovery responses.
    pub fn to_json(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(
                field.name.clone(),
                json!({ "type": field.kind, "description": field.description }),
            );
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }
        json!({ "type": "object", "properties": properties, "required": required })
    }
}

/// Discovery record for one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

type HandlerFuture = Pin<Box<dyn Future<Output = String> + Send>>;
type Handler = Arc<dyn Fn(Arc<HubState>, Value) -> HandlerFuture + Send + Sync>;

struct RegisteredTool {
    spec: ToolSpec,
    handler: Handler,
}

/// The set of tools exposed to the agent.
pub struct ToolRegistry {
    hub: Arc<HubState>,
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Build the registry from the hub's capabilities.
    pub fn new(hub: Arc<HubState>) -> Self {
        let capabilities = hub.capabilities();
        let mut tools = Vec::new();

        query::register(&mut tools);
        command::register(&mut tools);
        if capabilities.watch {
            watch::register(&mut tools);
        }
        if capabilities.session {
            session::register(&mut tools);
        }

        Self { hub, tools }
    }

    /// Discovery: specs of every registered tool.
    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    /// Invoke a tool by name. Unknown names and handler failures both come
    /// back as `{"error": ...}` text.
    pub async fn call(&self, name: &str, args: Value) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.spec.name == name) else {
            return error_text(format!("unknown tool: {name}"));
        };
        (tool.handler)(Arc::clone(&self.hub), args).await
    }
}

/// Register one tool with its handler.
fn register_tool<F, Fut>(
    tools: &mut Vec<RegisteredTool>,
    name: &str,
    description: &str,
    schema: InputSchema,
    handler: F,
) where
    F: Fn(Arc<HubState>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = String> + Send + 'static,
{
    tools.push(RegisteredTool {
        spec: ToolSpec {
            name: name.to_owned(),
            description: description.to_owned(),
            input_schema: schema.to_json(),
        },
        handler: Arc::new(move |hub, args| Box::pin(handler(hub, args))),
    });
}

/// Render a failure payload.
fn error_text(message: impl std::fmt::Display) -> String {
    json!({ "error": message.to_string() }).to_string()
}

/// Render a success payload.
fn ok_text(value: Value) -> String {
    value.to_string()
}

// -- Argument helpers ---------------------------------------------------------

fn opt_str(args: &Value, key: &str) -> Result<Option<String>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("{key} must be a string")),
    }
}

fn req_str(args: &Value, key: &str) -> Result<String, String> {
    match opt_str(args, key)? {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(format!("{key} is required")),
    }
}

fn opt_u64(args: &Value, key: &str) -> Result<Option<u64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| format!("{key} must be a non-negative integer")),
    }
}

fn opt_bool(args: &Value, key: &str, default: bool) -> Result<bool, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(format!("{key} must be a boolean")),
    }
}

/// `limit` with a default and a hard cap.
fn limit_arg(args: &Value, default: usize, cap: usize) -> Result<usize, String> {
    let limit = opt_u64(args, "limit")?.map(|n| n as usize).unwrap_or(default);
    Ok(limit.min(cap))
}

/// Command timeout in milliseconds, capped at [`MAX_COMMAND_TIMEOUT`].
fn timeout_arg(args: &Value, default: Duration) -> Result<Duration, String> {
    let ms = opt_u64(args, "timeout")?;
    let timeout = ms.map(Duration::from_millis).unwrap_or(default);
    Ok(timeout.min(MAX_COMMAND_TIMEOUT))
}

/// Shared cursor state for `get_network_log`.
pub(crate) fn network_cursor() -> Arc<AtomicU64> {
    Arc::new(AtomicU64::new(0))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
