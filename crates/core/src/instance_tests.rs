// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use crate::test_support::{instance_of, service_class};
use yare::parameterized;

#[test]
fn new_instance_rests_at_waiting_stop() {
    let inst = instance_of(service_class("svc", "/usr/sbin/webd"));
    assert_eq!(inst.goal, Goal::Stop);
    assert_eq!(inst.state, State::Waiting);
    assert!(inst.pids.iter().all(Option::is_none));
    assert_eq!(inst.trace, TraceState::None);
}

#[test]
fn pid_table_holds_one_pid_per_kind() {
    let mut inst = instance_of(service_class("svc", "/usr/sbin/webd"));
    inst.set_pid(ProcessKind::Main, Pid(100));
    inst.set_pid(ProcessKind::PreStart, Pid(101));
    assert_eq!(inst.pid(ProcessKind::Main), Some(Pid(100)));
    inst.set_pid(ProcessKind::Main, Pid(102));
    assert_eq!(inst.pid(ProcessKind::Main), Some(Pid(102)));
    inst.clear_pid(ProcessKind::Main);
    assert!(inst.pid(ProcessKind::Main).is_none());
    assert_eq!(inst.pid(ProcessKind::PreStart), Some(Pid(101)));
}

#[test]
fn capture_env_layers_class_start_and_identity() {
    let mut class = service_class("svc", "/usr/sbin/webd");
    class.env.set("TIER", "prod");
    class.env.set("PORT", "80");
    let mut inst = Instance::new(std::sync::Arc::new(class), "one");
    inst.start_env = Environ::from_entries(["PORT=8080", "EXTRA=x"]);
    inst.capture_env();

    assert_eq!(inst.env.get("TIER"), Some("prod"));
    assert_eq!(inst.env.get("PORT"), Some("8080"));
    assert_eq!(inst.env.get("EXTRA"), Some("x"));
    assert_eq!(inst.env.get("VIGIL_JOB"), Some("svc"));
    assert_eq!(inst.env.get("VIGIL_INSTANCE"), Some("one"));
}

#[test]
fn result_env_ok_when_not_failed() {
    let inst = instance_of(service_class("svc", "/usr/sbin/webd"));
    let env = inst.result_env();
    assert_eq!(env.get("JOB"), Some("svc"));
    assert_eq!(env.get("RESULT"), Some("ok"));
    assert!(!env.contains("PROCESS"));
}

#[test]
fn result_env_carries_exit_status() {
    let mut inst = instance_of(service_class("svc", "/usr/sbin/webd"));
    inst.failed =
        Some(FailRecord { process: ProcessKind::Main, status: ExitStatus::from_code(3) });
    let env = inst.result_env();
    assert_eq!(env.get("RESULT"), Some("failed"));
    assert_eq!(env.get("PROCESS"), Some("main"));
    assert_eq!(env.get("EXIT_STATUS"), Some("3"));
    assert!(!env.contains("EXIT_SIGNAL"));
}

#[test]
fn result_env_carries_exit_signal_name() {
    let mut inst = instance_of(service_class("svc", "/usr/sbin/webd"));
    inst.failed =
        Some(FailRecord { process: ProcessKind::Main, status: ExitStatus::from_signal(9) });
    let env = inst.result_env();
    assert_eq!(env.get("EXIT_SIGNAL"), Some("KILL"));
    assert!(!env.contains("EXIT_STATUS"));
}

#[parameterized(
    zero = { 0, Some(0), None },
    code = { 42, Some(42), None },
    spawn_failed = { -1, Some(-1), None },
)]
fn exit_status_codes(raw: i32, code: Option<i32>, signal: Option<i32>) {
    let status = ExitStatus::from_code(raw);
    assert_eq!(status.code(), code);
    assert_eq!(status.signal(), signal);
}

#[test]
fn exit_status_signal_encoding() {
    let status = ExitStatus::from_signal(15);
    assert_eq!(status.signal(), Some(15));
    assert_eq!(status.code(), None);
    assert_eq!(status.encoded(), 15 << 8);
    assert!(!status.is_success());
    assert_eq!(status.to_string(), "signal TERM");
}

#[test]
fn job_handle_display() {
    assert_eq!(JobHandle::new("web", "").to_string(), "web");
    assert_eq!(JobHandle::new("getty", "tty1").to_string(), "getty (tty1)");
}
