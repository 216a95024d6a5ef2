// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use yare::parameterized;

fn env(entries: &[&str]) -> Environ {
    Environ::from_entries(entries.iter().copied())
}

#[test]
fn bare_name_matches_on_equality() {
    let expr = EventExpr::name("startup");
    assert!(expr.matches("startup", &env(&[])));
    assert!(!expr.matches("shutdown", &env(&[])));
}

#[test]
fn arg_matcher_requires_key_present() {
    let expr = EventExpr::Match(EventMatch::name("starting").arg("JOB", "web"));
    assert!(expr.matches("starting", &env(&["JOB=web"])));
    assert!(!expr.matches("starting", &env(&["JOB=db"])));
    assert!(!expr.matches("starting", &env(&[])));
}

#[test]
fn arg_matcher_globs_values() {
    let expr = EventExpr::Match(EventMatch::name("net-device-up").arg("IFACE", "eth*"));
    assert!(expr.matches("net-device-up", &env(&["IFACE=eth0"])));
    assert!(expr.matches("net-device-up", &env(&["IFACE=eth10"])));
    assert!(!expr.matches("net-device-up", &env(&["IFACE=wlan0"])));
}

#[test]
fn any_takes_first_satisfied_branch() {
    let expr = EventExpr::any([EventExpr::name("startup"), EventExpr::name("runlevel")]);
    assert!(expr.matches("runlevel", &env(&[])));
    assert!(!expr.matches("shutdown", &env(&[])));
}

#[test]
fn all_requires_every_branch() {
    let expr = EventExpr::all([
        EventExpr::name("stopping"),
        EventExpr::Match(EventMatch::name("stopping").arg("JOB", "db")),
    ]);
    assert!(expr.matches("stopping", &env(&["JOB=db"])));
    assert!(!expr.matches("stopping", &env(&["JOB=web"])));
}

#[test]
fn empty_all_never_matches() {
    let expr = EventExpr::all([]);
    assert!(!expr.matches("anything", &env(&[])));
}

#[parameterized(
    exact = { "eth0", "eth0", true },
    star_tail = { "eth*", "eth12", true },
    star_middle = { "e*0", "eth0", true },
    star_empty = { "eth*", "eth", true },
    question = { "tty?", "tty1", true },
    question_missing = { "tty?", "tty", false },
    no_match = { "eth*", "wlan0", false },
    star_only = { "*", "", true },
)]
fn glob_cases(pattern: &str, text: &str, expected: bool) {
    assert_eq!(glob_match(pattern, text), expected);
}

#[test]
fn display_renders_tree() {
    let expr = EventExpr::any([
        EventExpr::name("startup"),
        EventExpr::Match(EventMatch::name("starting").arg("JOB", "web")),
    ]);
    assert_eq!(expr.to_string(), "(startup or starting JOB=web)");
}

#[test]
fn toml_forms_deserialize() {
    let bare: EventExpr = serde_json::from_str("\"startup\"").unwrap();
    assert_eq!(bare, EventExpr::name("startup"));

    let matcher: EventExpr =
        serde_json::from_str(r#"{"event":"starting","args":{"JOB":"web"}}"#).unwrap();
    assert!(matcher.matches("starting", &env(&["JOB=web"])));

    let tree: EventExpr =
        serde_json::from_str(r#"{"any":["startup",{"event":"runlevel","args":{"RUNLEVEL":"2"}}]}"#)
            .unwrap();
    assert!(tree.matches("startup", &env(&[])));
    assert!(tree.matches("runlevel", &env(&["RUNLEVEL=2"])));
}
