// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use yare::parameterized;

#[parameterized(
    exact = { "/api/login", "/api/login", true },
    case_insensitive = { "/API/Login", "/api/login", true },
    single_star = { "/api/*", "/api/login", true },
    single_star_crosses_slash = { "/api/*", "/api/v1/login", true },
    double_star = { "/api/**", "/api/v1/users/42", true },
    anchored_prefix = { "/api/*", "/v2/api/login", false },
    anchored_suffix = { "*/login", "/login/extra", false },
    mid_pattern = { "/api/*/token", "/api/auth/token", true },
    no_match = { "/auth/**", "/api/login", false },
)]
fn glob_semantics(pattern: &str, input: &str, expected: bool) {
    assert_eq!(UrlGlob::new(pattern).matches_url(input), expected, "{pattern} vs {input}");
}

#[test]
fn url_is_reduced_to_path_and_query() {
    let glob = UrlGlob::new("/api/**");
    assert!(glob.matches_url("http://localhost:3000/api/users"));
    assert!(glob.matches_url("https://example.com/api/users?id=1"));
    assert!(!glob.matches_url("https://example.com/other"));
}

#[test]
fn query_string_is_part_of_the_match() {
    let glob = UrlGlob::new("/search?q=*");
    assert!(glob.matches_url("http://localhost/search?q=rust"));
    assert!(!glob.matches_url("http://localhost/search"));
}

#[test]
fn non_url_input_is_matched_raw() {
    let glob = UrlGlob::new("/api/*");
    assert!(glob.matches_url("/api/login"));
    assert!(!glob.matches_url("not a url"));
    assert!(UrlGlob::new("not a url").matches_url("not a url"));
}

#[test]
fn literal_metacharacters_do_not_leak_into_the_regex() {
    let glob = UrlGlob::new("/api/v1.0/(beta)");
    assert!(glob.matches_url("/api/v1.0/(beta)"));
    assert!(!glob.matches_url("/api/v1x0/(beta)"));
}

#[test]
fn path_and_query_helper() {
    assert_eq!(path_and_query("http://localhost:3000/api/x?y=1"), "/api/x?y=1");
    assert_eq!(path_and_query("https://example.com"), "/");
    assert_eq!(path_and_query("https://example.com/p#frag"), "/p");
    assert_eq!(path_and_query("/already/relative"), "/already/relative");
    assert_eq!(path_and_query("plain text"), "plain text");
}
