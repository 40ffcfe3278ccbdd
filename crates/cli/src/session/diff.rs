// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pairwise session comparison.
//!
//! Two sessions are compared along four axes: events by id, interactions by
//! id and positional signature, network endpoints by first-seen status per
//! URL, and storage as a flattened key→value map. `divergesAt` pins the
//! earliest timestamp at which the event streams part ways.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{Event, Interaction, Source};

use super::{sort_events, Session};

/// Top-line verdict of a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub identical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diverges_at: Option<u64>,
}

/// An event present in both sessions whose fields differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFieldDiff {
    pub id: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDiff {
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub different: Vec<EventFieldDiff>,
}

impl EventDiff {
    fn is_empty(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.different.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionDiff {
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_mismatch_index: Option<usize>,
}

impl InteractionDiff {
    fn is_empty(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.first_mismatch_index.is_none()
    }
}

/// A URL whose first-seen response status differs between the sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDifference {
    pub url: String,
    pub status_a: i64,
    pub status_b: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDiff {
    pub endpoints_only_in_a: Vec<String>,
    pub endpoints_only_in_b: Vec<String>,
    pub status_differences: Vec<StatusDifference>,
}

impl NetworkDiff {
    fn is_empty(&self) -> bool {
        self.endpoints_only_in_a.is_empty()
            && self.endpoints_only_in_b.is_empty()
            && self.status_differences.is_empty()
    }
}

/// A storage key whose flattened value differs between the sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueDifference {
    pub key: String,
    pub value_a: String,
    pub value_b: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDiff {
    pub keys_only_in_a: Vec<String>,
    pub keys_only_in_b: Vec<String>,
    pub value_differences: Vec<ValueDifference>,
}

impl StorageDiff {
    fn is_empty(&self) -> bool {
        self.keys_only_in_a.is_empty()
            && self.keys_only_in_b.is_empty()
            && self.value_differences.is_empty()
    }
}

/// Full comparison result between two sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDiff {
    pub summary: DiffSummary,
    pub event_diff: EventDiff,
    pub interaction_diff: InteractionDiff,
    pub network_diff: NetworkDiff,
    pub storage_diff: StorageDiff,
}

/// Compare two sessions.
pub fn diff(a: &Session, b: &Session) -> SessionDiff {
    let mut events_a = a.events.clone();
    let mut events_b = b.events.clone();
    sort_events(&mut events_a);
    sort_events(&mut events_b);

    let event_diff = diff_events(&events_a, &events_b);
    let interaction_diff = diff_interactions(&a.interactions, &b.interactions);
    let network_diff = diff_network(&events_a, &events_b);
    let storage_diff = diff_storage(a, b);

    let identical = event_diff.is_empty()
        && interaction_diff.is_empty()
        && network_diff.is_empty()
        && storage_diff.is_empty();

    SessionDiff {
        summary: DiffSummary { identical, diverges_at: diverges_at(&events_a, &events_b) },
        event_diff,
        interaction_diff,
        network_diff,
        storage_diff,
    }
}

fn diff_events(a: &[Event], b: &[Event]) -> EventDiff {
    let by_id_a: BTreeMap<&str, &Event> = a.iter().map(|e| (e.id.as_str(), e)).collect();
    let by_id_b: BTreeMap<&str, &Event> = b.iter().map(|e| (e.id.as_str(), e)).collect();

    let only_in_a = by_id_a
        .keys()
        .filter(|id| !by_id_b.contains_key(**id))
        .map(|id| (*id).to_owned())
        .collect();
    let only_in_b = by_id_b
        .keys()
        .filter(|id| !by_id_a.contains_key(**id))
        .map(|id| (*id).to_owned())
        .collect();

    let mut different = Vec::new();
    for (id, ea) in &by_id_a {
        let Some(eb) = by_id_b.get(id) else { continue };
        let mut fields = Vec::new();
        if ea.source != eb.source {
            fields.push("source".to_owned());
        }
        if ea.level != eb.level {
            fields.push("level".to_owned());
        }
        if ea.ts != eb.ts {
            fields.push("ts".to_owned());
        }
        if ea.payload != eb.payload {
            fields.push("payload".to_owned());
        }
        if !fields.is_empty() {
            different.push(EventFieldDiff { id: (*id).to_owned(), fields });
        }
    }

    EventDiff { only_in_a, only_in_b, different }
}

/// The positional signature of an interaction: everything but id and ts.
fn interaction_signature(i: &Interaction) -> (&str, Option<&str>, Option<&str>, Option<&str>, Option<f64>, Option<f64>) {
    (i.kind.as_str(), i.target.as_deref(), i.value.as_deref(), i.url.as_deref(), i.x, i.y)
}

fn diff_interactions(a: &[Interaction], b: &[Interaction]) -> InteractionDiff {
    let ids_a: BTreeSet<&str> = a.iter().map(|i| i.id.as_str()).collect();
    let ids_b: BTreeSet<&str> = b.iter().map(|i| i.id.as_str()).collect();

    let only_in_a = ids_a.difference(&ids_b).map(|id| (*id).to_owned()).collect();
    let only_in_b = ids_b.difference(&ids_a).map(|id| (*id).to_owned()).collect();

    let mut first_mismatch_index = None;
    for (idx, (ia, ib)) in a.iter().zip(b.iter()).enumerate() {
        if interaction_signature(ia) != interaction_signature(ib) {
            first_mismatch_index = Some(idx);
            break;
        }
    }
    if first_mismatch_index.is_none() && a.len() != b.len() {
        first_mismatch_index = Some(a.len().min(b.len()));
    }

    InteractionDiff { only_in_a, only_in_b, first_mismatch_index }
}

/// First-seen response status per URL, in event order.
fn first_statuses(events: &[Event]) -> BTreeMap<String, i64> {
    let mut map = BTreeMap::new();
    for event in events {
        if event.source != Source::BrowserNetwork {
            continue;
        }
        let (Some(url), Some(status)) = (
            event.payload.get("url").and_then(Value::as_str),
            event.payload.get("status").and_then(Value::as_i64),
        ) else {
            continue;
        };
        map.entry(url.to_owned()).or_insert(status);
    }
    map
}

fn diff_network(a: &[Event], b: &[Event]) -> NetworkDiff {
    let statuses_a = first_statuses(a);
    let statuses_b = first_statuses(b);

    let endpoints_only_in_a = statuses_a
        .keys()
        .filter(|url| !statuses_b.contains_key(*url))
        .cloned()
        .collect();
    let endpoints_only_in_b = statuses_b
        .keys()
        .filter(|url| !statuses_a.contains_key(*url))
        .cloned()
        .collect();

    let status_differences = statuses_a
        .iter()
        .filter_map(|(url, status_a)| {
            let status_b = statuses_b.get(url)?;
            (status_a != status_b).then(|| StatusDifference {
                url: url.clone(),
                status_a: *status_a,
                status_b: *status_b,
            })
        })
        .collect();

    NetworkDiff { endpoints_only_in_a, endpoints_only_in_b, status_differences }
}

/// Flatten all storage snapshots into one key→value map; localStorage wins
/// over sessionStorage, later snapshots win over earlier ones.
fn flatten_storage(session: &Session) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for snapshot in &session.storage_snapshots {
        for (key, value) in &snapshot.session_storage {
            map.insert(key.clone(), value.clone());
        }
        for (key, value) in &snapshot.local_storage {
            map.insert(key.clone(), value.clone());
        }
    }
    map
}

fn diff_storage(a: &Session, b: &Session) -> StorageDiff {
    let map_a = flatten_storage(a);
    let map_b = flatten_storage(b);

    let keys_only_in_a = map_a.keys().filter(|k| !map_b.contains_key(*k)).cloned().collect();
    let keys_only_in_b = map_b.keys().filter(|k| !map_a.contains_key(*k)).cloned().collect();

    let value_differences = map_a
        .iter()
        .filter_map(|(key, value_a)| {
            let value_b = map_b.get(key)?;
            (value_a != value_b).then(|| ValueDifference {
                key: key.clone(),
                value_a: value_a.clone(),
                value_b: value_b.clone(),
            })
        })
        .collect();

    StorageDiff { keys_only_in_a, keys_only_in_b, value_differences }
}

/// The earliest timestamp at which the two (sorted) event streams diverge:
/// the first positional mismatch, or the first extra event in the longer
/// stream.
fn diverges_at(a: &[Event], b: &[Event]) -> Option<u64> {
    for (ea, eb) in a.iter().zip(b.iter()) {
        if ea != eb {
            return Some(ea.ts.min(eb.ts));
        }
    }
    match a.len().cmp(&b.len()) {
        std::cmp::Ordering::Less => b.get(a.len()).map(|e| e.ts),
        std::cmp::Ordering::Greater => a.get(b.len()).map(|e| e.ts),
        std::cmp::Ordering::Equal => None,
    }
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod tests;
