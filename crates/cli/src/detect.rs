// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framework detection for dev-server output.
//!
//! The detector classifies each child output line into a framework tag and
//! locks onto the first framework it recognizes, so later unmarked lines
//! inherit the tag. A command-string hint can pre-lock before any output
//! arrives.

use crate::event::Source;

/// Stateful line classifier with framework lock-in.
#[derive(Debug, Default)]
pub struct FrameworkDetector {
    locked: Option<Source>,
}

impl FrameworkDetector {
    pub fn new() -> Self {
        Self { locked: None }
    }

    /// Pre-lock from a command-line hint, when one exists.
    pub fn with_command_hint(cmd: &str) -> Self {
        Self { locked: detect_from_command(cmd) }
    }

    /// The framework this detector has locked onto, if any.
    pub fn locked(&self) -> Option<Source> {
        self.locked
    }

    /// Classify one output line, locking onto recognized frameworks.
    ///
    /// Unlocked lines with no signature and no URL fall back to `vite` so
    /// early startup chatter stays coherent with the most common stack; the
    /// stateless [`classify_output`] keeps `devserver` for the same input.
    pub fn classify_line(&mut self, text: &str) -> Source {
        if is_next_signature(text) {
            self.locked = Some(Source::Next);
            return Source::Next;
        }
        if is_vite_signature(text) {
            self.locked = Some(Source::Vite);
            return Source::Vite;
        }
        if let Some(locked) = self.locked {
            return locked;
        }
        if contains_url(text) {
            self.locked = Some(Source::Devserver);
            return Source::Devserver;
        }
        Source::Vite
    }
}

/// One-shot classifier for text outside the supervised pipeline.
///
/// Same signature rules as the stateful detector, but with no lock and a
/// `devserver` fallback for unrecognized text.
pub fn classify_output(text: &str) -> Source {
    if is_next_signature(text) {
        return Source::Next;
    }
    if is_vite_signature(text) {
        return Source::Vite;
    }
    Source::Devserver
}

/// Guess the framework from the dev command itself (`vite`, `next dev`, ...).
///
/// Matches whole words only, so `vitest` is not `vite`.
pub fn detect_from_command(cmd: &str) -> Option<Source> {
    if contains_word(cmd, "next") {
        return Some(Source::Next);
    }
    if contains_word(cmd, "vite") {
        return Some(Source::Vite);
    }
    None
}

fn is_next_signature(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("next.js") || lower.contains("next dev") || lower.contains("compiled /")
}

fn is_vite_signature(text: &str) -> bool {
    text.contains("VITE") || text.contains("vite") || text.contains("➜ Local:")
}

fn contains_url(text: &str) -> bool {
    text.contains("http://") || text.contains("https://")
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
