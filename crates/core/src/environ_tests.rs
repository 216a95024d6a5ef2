// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;

#[test]
fn set_and_get() {
    let mut env = Environ::new();
    env.set("JOB", "hello");
    assert_eq!(env.get("JOB"), Some("hello"));
    assert_eq!(env.get("INSTANCE"), None);
}

#[test]
fn set_replaces_in_place() {
    let mut env = Environ::new();
    env.set("A", "1");
    env.set("B", "2");
    env.set("A", "3");
    let entries: Vec<_> = env.entries().collect();
    assert_eq!(entries, vec!["A=3", "B=2"]);
}

#[test]
fn from_entries_drops_malformed() {
    let env = Environ::from_entries(["A=1", "garbage", "B=2"]);
    assert_eq!(env.len(), 2);
    assert_eq!(env.get("B"), Some("2"));
}

#[test]
fn merge_overrides() {
    let mut base = Environ::from_entries(["A=1", "B=2"]);
    let over = Environ::from_entries(["B=9", "C=3"]);
    base.merge(&over);
    let entries: Vec<_> = base.entries().collect();
    assert_eq!(entries, vec!["A=1", "B=9", "C=3"]);
}

#[test]
fn empty_value_is_preserved() {
    let mut env = Environ::new();
    env.set("INSTANCE", "");
    assert_eq!(env.get("INSTANCE"), Some(""));
    assert!(env.contains("INSTANCE"));
}

#[test]
fn pairs_split_on_first_equals() {
    let env = Environ::from_entries(["CMD=a=b"]);
    assert_eq!(env.pairs().next(), Some(("CMD", "a=b")));
}

#[test]
fn expand_substitutes_variables() {
    let env = Environ::from_entries(["TTY=tty1", "N=5"]);
    assert_eq!(env.expand("$TTY").unwrap(), "tty1");
    assert_eq!(env.expand("console-$TTY-$N").unwrap(), "console-tty1-5");
    assert_eq!(env.expand("no variables").unwrap(), "no variables");
}

#[test]
fn expand_missing_variable_errors() {
    let env = Environ::new();
    assert_eq!(env.expand("$TTY"), Err(MissingVariable("TTY".into())));
}

#[test]
fn lone_dollar_passes_through() {
    let env = Environ::new();
    assert_eq!(env.expand("cost: $").unwrap(), "cost: $");
}
