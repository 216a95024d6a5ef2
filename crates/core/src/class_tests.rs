// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use yare::parameterized;

#[test]
fn defaults_match_supervisor_policy() {
    let class = JobClass::new("svc");
    assert_eq!(class.kill_timeout_secs, 5);
    assert_eq!(class.respawn_limit, 10);
    assert_eq!(class.respawn_interval_secs, 5);
    assert_eq!(class.umask, 0o022);
    assert_eq!(class.nice, 0);
    assert_eq!(class.expect, ExpectMode::None);
    assert_eq!(class.console, ConsoleMode::None);
    assert!(!class.task);
    assert!(!class.respawn);
}

#[test]
fn process_table_roundtrip() {
    let mut class = JobClass::new("svc");
    assert!(!class.has_process(ProcessKind::Main));
    class.set_process(ProcessKind::Main, ProcessDef::command("/bin/true"));
    class.set_process(ProcessKind::PreStart, ProcessDef::script("mkdir -p /run/svc\n"));
    assert!(class.has_process(ProcessKind::Main));
    assert_eq!(class.process(ProcessKind::Main).map(|p| p.command.as_str()), Some("/bin/true"));
    assert!(class.process(ProcessKind::PreStart).is_some_and(|p| p.script));
    assert!(class.process(ProcessKind::PostStop).is_none());
}

#[parameterized(
    none = { ExpectMode::None, false, 0 },
    stop = { ExpectMode::Stop, false, 0 },
    fork = { ExpectMode::Fork, true, 1 },
    daemon = { ExpectMode::Daemon, true, 2 },
)]
fn expect_mode_tracing(expect: ExpectMode, traced: bool, forks: u32) {
    let mut class = JobClass::new("svc");
    class.expect = expect;
    assert_eq!(class.traced(), traced);
    assert_eq!(class.expected_forks(), forks);
}

#[test]
fn normal_exit_encoding() {
    let mut normal = NormalExit::statuses([0, 2]);
    normal.push_signal(15);
    assert!(normal.contains_encoded(0));
    assert!(normal.contains_encoded(2));
    assert!(normal.contains_encoded(15 << 8));
    assert!(!normal.contains_encoded(1));
    assert!(!normal.contains_encoded(15));
}

#[test]
fn process_kind_indexes_are_distinct() {
    let mut seen = [false; PROCESS_KINDS];
    for kind in ProcessKind::ALL {
        assert!(!seen[kind.index()]);
        seen[kind.index()] = true;
    }
}

#[test]
fn class_serde_roundtrip() {
    let mut class = JobClass::new("web");
    class.set_process(ProcessKind::Main, ProcessDef::command("/usr/sbin/webd --foreground"));
    class.respawn = true;
    class.limits.push((ResourceKind::Nofile, RlimitSpec { soft: Some(4096), hard: None }));
    let json = serde_json::to_string(&class).unwrap();
    let back: JobClass = serde_json::from_str(&json).unwrap();
    assert_eq!(back, class);
}
