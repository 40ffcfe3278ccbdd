// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! URL glob matching for redaction and watch rules.
//!
//! `**` matches any characters including `/`; a single `*` also crosses `/`
//! boundaries (URL globs here are substring wildcards, not path segments).
//! Matching is anchored and case-insensitive, and URLs are reduced to
//! `pathname + search` before being tested.

use regex::Regex;

/// A compiled, anchored, case-insensitive URL glob.
#[derive(Debug, Clone)]
pub struct UrlGlob {
    pattern: String,
    regex: Option<Regex>,
}

impl UrlGlob {
    /// Compile a glob pattern. Everything except `*` matches literally.
    pub fn new(pattern: &str) -> Self {
        let mut re = String::with_capacity(pattern.len() + 8);
        re.push_str("(?i)^");
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '*' {
                // `**` and `*` compile identically; consume the pair.
                if chars.peek() == Some(&'*') {
                    chars.next();
                }
                re.push_str(".*");
            } else {
                let mut buf = [0u8; 4];
                re.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
        re.push('$');
        Self { pattern: pattern.to_owned(), regex: Regex::new(&re).ok() }
    }

    /// The source pattern this glob was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Test a URL against the glob, reducing it to `pathname + search`
    /// first. Inputs that do not parse as URLs are matched raw.
    pub fn matches_url(&self, url: &str) -> bool {
        match self.regex {
            Some(ref regex) => regex.is_match(&path_and_query(url)),
            None => false,
        }
    }
}

/// Strip scheme and host from a URL, keeping `pathname + search`.
///
/// Non-URL inputs (already-relative paths, arbitrary strings) pass through
/// unchanged.
pub fn path_and_query(url: &str) -> String {
    let rest = match url.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') =>
        {
            rest
        }
        _ => return url.to_owned(),
    };
    // Drop the fragment, keep the query.
    let rest = rest.split_once('#').map(|(r, _)| r).unwrap_or(rest);
    match rest.find('/') {
        Some(idx) => rest[idx..].to_owned(),
        None => "/".to_owned(),
    }
}

#[cfg(test)]
#[path = "glob_tests.rs"]
mod tests;
