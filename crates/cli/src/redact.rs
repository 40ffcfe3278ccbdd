// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload redaction applied before events are stored or broadcast.
//!
//! Sensitive keys are matched case-insensitively and replaced with a
//! sentinel, recursively through nested objects and arrays. Network events
//! whose URL matches a configured pattern lose their bodies wholesale;
//! storage events with a sensitive key lose their values. Inputs are never
//! mutated — redaction always produces a deep-cloned event.

use serde_json::Value;

use crate::event::{Event, Source};
use crate::glob::UrlGlob;

/// Sentinel for redacted field values.
pub const REDACTED: &str = "[REDACTED]";

/// Sentinel for request/response bodies on sensitive endpoints.
pub const REDACTED_ENDPOINT: &str = "[REDACTED - sensitive endpoint]";

/// Replaces sensitive values in event payloads.
#[derive(Debug)]
pub struct Redactor {
    fields: Vec<String>,
    url_patterns: Vec<UrlGlob>,
}

impl Redactor {
    pub fn new(fields: &[String], url_patterns: &[String]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_lowercase()).collect(),
            url_patterns: url_patterns.iter().map(|p| UrlGlob::new(p)).collect(),
        }
    }

    /// Whether a key names a sensitive field (case-insensitive).
    pub fn is_sensitive_field(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.fields.iter().any(|f| *f == lower)
    }

    /// Whether a URL hits one of the sensitive-endpoint patterns.
    pub fn is_sensitive_url(&self, url: &str) -> bool {
        self.url_patterns.iter().any(|g| g.matches_url(url))
    }

    /// Produce a redacted deep clone of the event. The input is unchanged.
    pub fn redact_event(&self, event: &Event) -> Event {
        let mut payload = self.redact_map(&event.payload);

        match event.source {
            Source::BrowserNetwork => {
                let sensitive = payload
                    .get("url")
                    .and_then(Value::as_str)
                    .is_some_and(|url| self.is_sensitive_url(url));
                if sensitive {
                    payload.insert("requestBody".to_owned(), Value::String(REDACTED_ENDPOINT.to_owned()));
                    payload.insert("responseBody".to_owned(), Value::String(REDACTED_ENDPOINT.to_owned()));
                }
            }
            Source::BrowserStorage => {
                let sensitive = payload
                    .get("key")
                    .and_then(Value::as_str)
                    .is_some_and(|key| self.is_sensitive_field(key));
                if sensitive {
                    payload.insert("value".to_owned(), Value::String(REDACTED.to_owned()));
                    if payload.contains_key("previousValue") {
                        payload.insert("previousValue".to_owned(), Value::String(REDACTED.to_owned()));
                    }
                }
            }
            _ => {}
        }

        Event { id: event.id.clone(), ts: event.ts, source: event.source, level: event.level, payload }
    }

    /// Redact one JSON value recursively.
    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.redact_map(map)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            other => other.clone(),
        }
    }

    fn redact_map(&self, map: &serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                if self.is_sensitive_field(key) {
                    (key.clone(), Value::String(REDACTED.to_owned()))
                } else {
                    (key.clone(), self.redact_value(value))
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
