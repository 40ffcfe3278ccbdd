// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watch rules — user-defined predicates evaluated against every event.
//!
//! Matches land in a newest-first bounded buffer and annotate the event
//! payload so downstream consumers can see which rule fired.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;
use crate::event::{now_ms, Event, IdMint, Level, Source};
use crate::glob::UrlGlob;

/// Capacity of the matched-event buffer.
pub const WATCHED_CAPACITY: usize = 200;

/// Conditions a rule can place on an event. At least one must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConditions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_codes: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<Level>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_contains: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_contains: Option<serde_json::Map<String, Value>>,
}

impl RuleConditions {
    pub fn is_empty(&self) -> bool {
        self.status_codes.is_none()
            && self.url_pattern.is_none()
            && self.methods.is_none()
            && self.levels.is_none()
            && self.message_contains.is_none()
            && self.payload_contains.is_none()
    }
}

/// A registered watch rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRule {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub conditions: RuleConditions,
    pub created_at: u64,
    pub active: bool,
}

/// Caller-facing rule specification; the engine assigns id and timestamps.
#[derive(Debug, Clone, Default)]
pub struct RuleSpec {
    pub label: String,
    pub source: Option<Source>,
    pub conditions: RuleConditions,
}

/// Reference to the rule that matched, embedded in watched entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub id: String,
    pub label: String,
}

/// One rule match: the (annotated) event plus the rule that caught it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedEvent {
    pub event: Event,
    pub matched_rule: MatchedRule,
    pub matched_at: u64,
}

/// Holds rules and the newest-first buffer of matched events.
#[derive(Debug)]
pub struct WatchEngine {
    rules: Vec<WatchRule>,
    matched: Vec<WatchedEvent>,
    ids: IdMint,
}

impl WatchEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new(), matched: Vec::new(), ids: IdMint::new("rule") }
    }

    /// Register a rule. Requires a non-empty label and at least one
    /// condition.
    pub fn add_rule(&mut self, spec: RuleSpec) -> Result<WatchRule, ErrorCode> {
        if spec.label.trim().is_empty() || spec.conditions.is_empty() {
            return Err(ErrorCode::BadRequest);
        }
        let (id, created_at) = self.ids.next();
        let rule = WatchRule {
            id,
            label: spec.label,
            source: spec.source,
            conditions: spec.conditions,
            created_at,
            active: true,
        };
        self.rules.push(rule.clone());
        Ok(rule)
    }

    /// Remove a rule by id; returns whether one was removed.
    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        self.rules.len() != before
    }

    /// Defensive copies of the registered rules.
    pub fn list_rules(&self) -> Vec<WatchRule> {
        self.rules.clone()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate an event against all active rules.
    ///
    /// On a match the event payload is annotated with `watched`,
    /// `watchRuleLabel`, and `watchRuleId` (first matching rule wins for the
    /// annotation), and one buffer entry is inserted per matching rule,
    /// newest first. Returns the inserted entries.
    pub fn evaluate(&mut self, event: &mut Event) -> Vec<WatchedEvent> {
        let matches: Vec<MatchedRule> = self
            .rules
            .iter()
            .filter(|rule| rule.active && rule_matches(rule, event))
            .map(|rule| MatchedRule { id: rule.id.clone(), label: rule.label.clone() })
            .collect();

        if matches.is_empty() {
            return Vec::new();
        }

        if let Some(first) = matches.first() {
            event.payload.insert("watched".to_owned(), Value::Bool(true));
            event
                .payload
                .insert("watchRuleLabel".to_owned(), Value::String(first.label.clone()));
            event.payload.insert("watchRuleId".to_owned(), Value::String(first.id.clone()));
        }

        let matched_at = now_ms();
        let entries: Vec<WatchedEvent> = matches
            .into_iter()
            .map(|matched_rule| WatchedEvent { event: event.clone(), matched_rule, matched_at })
            .collect();
        for entry in &entries {
            self.matched.insert(0, entry.clone());
        }
        self.matched.truncate(WATCHED_CAPACITY);
        entries
    }

    /// Matched events, newest first, optionally filtered by rule id and
    /// truncated to `limit`.
    pub fn matched(&self, limit: Option<usize>, rule_id: Option<&str>) -> Vec<WatchedEvent> {
        let iter = self
            .matched
            .iter()
            .filter(|w| rule_id.is_none_or(|id| w.matched_rule.id == id))
            .cloned();
        match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    pub fn matched_len(&self) -> usize {
        self.matched.len()
    }

    pub fn clear_matched(&mut self) {
        self.matched.clear();
    }
}

impl Default for WatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn rule_matches(rule: &WatchRule, event: &Event) -> bool {
    if rule.source.is_some_and(|s| s != event.source) {
        return false;
    }
    let c = &rule.conditions;

    if let Some(ref codes) = c.status_codes {
        let Some(status) = event.payload.get("status").and_then(Value::as_i64) else {
            return false;
        };
        if !codes.contains(&status) {
            return false;
        }
    }

    if let Some(ref pattern) = c.url_pattern {
        let Some(url) = event.payload.get("url").and_then(Value::as_str) else {
            return false;
        };
        if !UrlGlob::new(pattern).matches_url(url) {
            return false;
        }
    }

    if let Some(ref methods) = c.methods {
        let Some(method) = event.payload.get("method").and_then(Value::as_str) else {
            return false;
        };
        let upper = method.to_uppercase();
        if !methods.iter().any(|m| m.to_uppercase() == upper) {
            return false;
        }
    }

    if let Some(ref levels) = c.levels {
        if !levels.contains(&event.level) {
            return false;
        }
    }

    if let Some(ref needle) = c.message_contains {
        let Some(message) = event.payload.get("message").and_then(Value::as_str) else {
            return false;
        };
        if !message.to_lowercase().contains(&needle.to_lowercase()) {
            return false;
        }
    }

    if let Some(ref expected) = c.payload_contains {
        if !partial_match_map(expected, &event.payload) {
            return false;
        }
    }

    true
}

/// Structural partial match: every expected key must exist with scalar
/// equality, array prefix equality by index, or a recursive partial match
/// for nested objects.
fn partial_match_map(expected: &serde_json::Map<String, Value>, actual: &serde_json::Map<String, Value>) -> bool {
    expected.iter().all(|(key, want)| match actual.get(key) {
        Some(have) => partial_match(want, have),
        None => false,
    })
}

fn partial_match(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Object(w), Value::Object(h)) => partial_match_map(w, h),
        (Value::Array(w), Value::Array(h)) => {
            w.len() <= h.len() && w.iter().zip(h.iter()).all(|(a, b)| partial_match(a, b))
        }
        (w, h) => w == h,
    }
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod tests;
