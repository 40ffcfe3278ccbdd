// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use serde_json::json;

use crate::event::Level;

fn event(source: Source, payload: serde_json::Value) -> Event {
    let serde_json::Value::Object(payload) = payload else {
        unreachable!("test payloads are objects");
    };
    Event { id: "evt_0000000000001_001".into(), ts: 1, source, level: Level::Info, payload }
}

fn default_redactor() -> Redactor {
    Redactor::new(
        &["password".into(), "token".into(), "authorization".into(), "cookie".into()],
        &[],
    )
}

#[test]
fn top_level_fields_are_replaced() {
    let redactor = default_redactor();
    let input = event(Source::BrowserConsole, json!({"password": "hunter2", "message": "hi"}));
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["password"], json!(REDACTED));
    assert_eq!(out.payload["message"], json!("hi"));
}

#[test]
fn matching_is_case_insensitive_on_the_key() {
    let redactor = default_redactor();
    let input = event(Source::BrowserNetwork, json!({"Authorization": "Bearer x", "TOKEN": "y"}));
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["Authorization"], json!(REDACTED));
    assert_eq!(out.payload["TOKEN"], json!(REDACTED));
}

#[test]
fn nested_objects_and_arrays_are_walked() {
    let redactor = default_redactor();
    let input = event(
        Source::BrowserNetwork,
        json!({
            "requestBody": {"user": {"password": "s"}, "items": [{"token": "t1"}, {"ok": 1}]},
        }),
    );
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["requestBody"]["user"]["password"], json!(REDACTED));
    assert_eq!(out.payload["requestBody"]["items"][0]["token"], json!(REDACTED));
    assert_eq!(out.payload["requestBody"]["items"][1]["ok"], json!(1));
}

#[test]
fn input_event_is_structurally_unchanged() {
    let redactor = default_redactor();
    let input = event(Source::BrowserConsole, json!({"password": "secret", "nested": {"token": "t"}}));
    let before = input.clone();
    let _ = redactor.redact_event(&input);
    assert_eq!(input, before);
}

#[test]
fn sensitive_endpoint_bodies_are_replaced_url_preserved() {
    let redactor = Redactor::new(&[], &["/api/auth/**".into()]);
    let input = event(
        Source::BrowserNetwork,
        json!({
            "url": "http://localhost:3000/api/auth/login",
            "method": "POST",
            "requestBody": {"user": "u"},
            "responseBody": {"ok": true},
        }),
    );
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["requestBody"], json!(REDACTED_ENDPOINT));
    assert_eq!(out.payload["responseBody"], json!(REDACTED_ENDPOINT));
    assert_eq!(out.payload["url"], json!("http://localhost:3000/api/auth/login"));
    assert_eq!(out.payload["method"], json!("POST"));
}

#[test]
fn endpoint_redaction_only_applies_to_network_events() {
    let redactor = Redactor::new(&[], &["/api/**".into()]);
    let input = event(Source::BrowserConsole, json!({"url": "/api/x", "requestBody": "b"}));
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["requestBody"], json!("b"));
}

#[test]
fn non_matching_network_urls_keep_their_bodies() {
    let redactor = Redactor::new(&[], &["/api/auth/**".into()]);
    let input = event(
        Source::BrowserNetwork,
        json!({"url": "/api/products", "responseBody": {"items": []}}),
    );
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["responseBody"], json!({"items": []}));
}

#[test]
fn storage_events_with_sensitive_key_lose_values() {
    let redactor = default_redactor();
    let input = event(
        Source::BrowserStorage,
        json!({"key": "Token", "value": "abc", "previousValue": "xyz", "area": "local"}),
    );
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["value"], json!(REDACTED));
    assert_eq!(out.payload["previousValue"], json!(REDACTED));
    assert_eq!(out.payload["key"], json!("Token"));
}

#[test]
fn storage_events_without_previous_value_do_not_gain_one() {
    let redactor = default_redactor();
    let input = event(Source::BrowserStorage, json!({"key": "password", "value": "v"}));
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["value"], json!(REDACTED));
    assert!(!out.payload.contains_key("previousValue"));
}

#[test]
fn storage_events_with_benign_key_are_untouched() {
    let redactor = default_redactor();
    let input = event(Source::BrowserStorage, json!({"key": "theme", "value": "dark"}));
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["value"], json!("dark"));
}

#[test]
fn key_must_match_exactly_not_by_substring() {
    let redactor = default_redactor();
    let input = event(Source::BrowserNetwork, json!({"accessToken": "t", "token": "u"}));
    let out = redactor.redact_event(&input);
    assert_eq!(out.payload["accessToken"], json!("t"));
    assert_eq!(out.payload["token"], json!(REDACTED));
}
