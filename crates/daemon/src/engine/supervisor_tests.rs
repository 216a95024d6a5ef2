// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use crate::engine::reaper::ChildEvent;
use crate::engine::test_helpers::Harness;
use nix::sys::signal::Signal;
use vigil_core::test_support::{respawn_class, service_class, task_class};
use vigil_core::{EventExpr, State};

fn startup_task() -> JobClass {
    let mut class = task_class("hello", "/bin/true");
    class.start_on = Some(EventExpr::name("startup"));
    class
}

#[test]
fn startup_event_starts_matching_task() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(startup_task());
    h.sup.emit_startup();
    h.sup.pump();

    assert_eq!(h.state_of("hello"), Some(State::Running));
    assert_eq!(
        h.processes.0.lock().spawned,
        vec![("hello".to_string(), ProcessKind::Main, false)]
    );

    // The startup event stays open until the task completes.
    assert_eq!(h.sup.bus.live_count(), 1);

    let pid = h.last_spawned_pid();
    h.sup.on_child_event(pid, ChildEvent::Exited { status: 0 });
    h.sup.pump();

    // Task finished: instance destroyed, all events drained.
    assert_eq!(h.state_of("hello"), None);
    assert_eq!(h.sup.bus.live_count(), 0);
}

#[test]
fn unknown_pid_is_ignored() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(startup_task());
    h.sup.on_child_event(Pid(9999), ChildEvent::Exited { status: 1 });
    h.sup.pump();
    assert_eq!(h.state_of("hello"), None);
}

#[test]
fn start_wait_replies_when_running() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(service_class("web", "/usr/sbin/webd"));

    let mut rx = h.request(Request::Start { name: "web".into(), env: vec![], wait: true });
    assert!(rx.try_recv().is_err(), "reply must wait for running");

    h.sup.pump();
    assert_eq!(h.state_of("web"), Some(State::Running));
    assert_eq!(rx.try_recv().unwrap(), Response::Ok);
}

#[test]
fn start_unknown_job_errors() {
    let mut h = Harness::new();
    let mut rx = h.request(Request::Start { name: "zzz".into(), env: vec![], wait: false });
    assert!(rx.try_recv().unwrap().is_error());
}

#[test]
fn double_start_errors() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(service_class("web", "/usr/sbin/webd"));
    h.request(Request::Start { name: "web".into(), env: vec![], wait: false });
    h.sup.pump();

    let mut rx = h.request(Request::Start { name: "web".into(), env: vec![], wait: false });
    assert!(rx.try_recv().unwrap().is_error());
}

#[test]
fn spawn_setup_error_fails_start() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(service_class("bad", "/usr/sbin/badd"));
    h.processes.0.lock().fail_queue.push(SpawnError::Chroot(Errno::ENOENT));

    let mut rx = h.request(Request::Start { name: "bad".into(), env: vec![], wait: true });
    h.sup.pump();

    // The instance failed, cycled to waiting, and was destroyed.
    assert_eq!(h.state_of("bad"), None);
    let response = rx.try_recv().unwrap();
    assert!(response.is_error(), "waiter must see the failure: {response:?}");
}

#[test]
fn stop_sends_term_and_escalates_on_timeout() {
    let mut h = Harness::new();
    let mut class = service_class("svc", "/usr/sbin/stubborn");
    class.kill_timeout_secs = 5;
    h.sup.on_class_loaded(class);
    h.request(Request::Start { name: "svc".into(), env: vec![], wait: false });
    h.sup.pump();
    let pid = h.last_spawned_pid();

    h.request(Request::Stop { name: "svc".into(), env: vec![], wait: false });
    h.sup.pump();

    assert_eq!(h.state_of("svc"), Some(State::Killed));
    assert_eq!(h.processes.0.lock().kills, vec![(pid, Signal::SIGTERM)]);
    let handle = JobHandle::new("svc", "");
    let ops = h.sup.take_timer_ops();
    assert_eq!(
        ops,
        vec![TimerOp::Arm {
            key: TimerKey::Kill(handle.clone()),
            after: Duration::from_secs(5)
        }]
    );

    h.sup.on_kill_timeout(&handle);
    assert_eq!(
        h.processes.0.lock().kills,
        vec![(pid, Signal::SIGTERM), (pid, Signal::SIGKILL)]
    );

    h.sup.on_child_event(pid, ChildEvent::Killed { signum: 9, core: false });
    h.sup.pump();
    assert_eq!(h.state_of("svc"), None);
}

#[test]
fn timer_cancelled_when_process_dies_before_timeout() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(service_class("svc", "/usr/sbin/webd"));
    h.request(Request::Start { name: "svc".into(), env: vec![], wait: false });
    h.sup.pump();
    let pid = h.last_spawned_pid();

    h.request(Request::Stop { name: "svc".into(), env: vec![], wait: false });
    h.sup.pump();
    h.sup.take_timer_ops();

    h.sup.on_child_event(pid, ChildEvent::Killed { signum: 15, core: false });
    h.sup.pump();
    let ops = h.sup.take_timer_ops();
    assert!(ops.contains(&TimerOp::Cancel { key: TimerKey::Kill(JobHandle::new("svc", "")) }));
}

#[test]
fn respawn_respawns_then_runs_away() {
    let mut h = Harness::new();
    h.clock.set_epoch_ms(1_000_000);
    h.sup.on_class_loaded(respawn_class("svc", "/bin/crasher", 3, 10));
    h.request(Request::Start { name: "svc".into(), env: vec![], wait: false });
    h.sup.pump();
    assert_eq!(h.spawn_count(), 1);

    for _ in 0..4 {
        let pid = h.last_spawned_pid();
        h.sup.on_child_event(pid, ChildEvent::Exited { status: 1 });
        h.sup.pump();
        h.clock.advance(Duration::from_secs(1));
    }

    // Initial spawn plus three respawns; the fourth failure is runaway.
    assert_eq!(h.spawn_count(), 4);
    assert_eq!(h.state_of("svc"), None);
}

#[test]
fn expect_stop_job_advances_on_sigstop() {
    let mut h = Harness::new();
    let mut class = service_class("ready", "/usr/sbin/readyd");
    class.expect = vigil_core::ExpectMode::Stop;
    h.sup.on_class_loaded(class);
    h.request(Request::Start { name: "ready".into(), env: vec![], wait: false });
    h.sup.pump();
    assert_eq!(h.state_of("ready"), Some(State::Spawned));

    let pid = h.last_spawned_pid();
    h.sup.on_child_event(pid, ChildEvent::Stopped { signum: nix::libc::SIGSTOP });
    h.sup.pump();

    assert_eq!(h.state_of("ready"), Some(State::Running));
    assert_eq!(h.processes.0.lock().kills, vec![(pid, Signal::SIGCONT)]);
}

#[test]
fn restart_cycles_the_instance() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(service_class("web", "/usr/sbin/webd"));
    h.request(Request::Start { name: "web".into(), env: vec![], wait: false });
    h.sup.pump();
    let first_pid = h.last_spawned_pid();

    h.request(Request::Restart { name: "web".into(), env: vec![], wait: false });
    h.sup.pump();
    assert_eq!(h.state_of("web"), Some(State::Killed));

    h.sup.on_child_event(first_pid, ChildEvent::Killed { signum: 15, core: false });
    h.sup.pump();

    assert_eq!(h.state_of("web"), Some(State::Running));
    assert_eq!(h.spawn_count(), 2);
}

#[test]
fn emit_wait_resolves_after_bound_jobs_finish() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(startup_task());

    let (tx, mut rx) = tokio::sync::oneshot::channel();
    let verdict = h.sup.handle_control(
        Request::Emit { name: "startup".into(), env: vec![], wait: true },
        tx,
    );
    assert!(matches!(verdict, ControlVerdict::Done));
    h.sup.pump();
    assert!(rx.try_recv().is_err(), "event still blocked by the task");

    let pid = h.last_spawned_pid();
    h.sup.on_child_event(pid, ChildEvent::Exited { status: 0 });
    h.sup.pump();
    assert_eq!(rx.try_recv().unwrap(), Response::Ok);
}

#[test]
fn emit_wait_reports_failure() {
    let mut h = Harness::new();
    let mut class = task_class("svc", "/bin/crasher");
    class.start_on = Some(EventExpr::name("go"));
    h.sup.on_class_loaded(class);

    let (tx, mut rx) = tokio::sync::oneshot::channel();
    h.sup
        .handle_control(Request::Emit { name: "go".into(), env: vec![], wait: true }, tx);
    h.sup.pump();

    let pid = h.last_spawned_pid();
    h.sup.on_child_event(pid, ChildEvent::Exited { status: 1 });
    h.sup.pump();

    assert!(rx.try_recv().unwrap().is_error());
}

#[test]
fn list_reports_goal_state_and_pid() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(service_class("web", "/usr/sbin/webd"));
    h.request(Request::Start { name: "web".into(), env: vec![], wait: false });
    h.sup.pump();

    let jobs = h.sup.list_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].class, "web");
    assert_eq!(jobs[0].goal, "start");
    assert_eq!(jobs[0].state, "running");
    assert_eq!(jobs[0].pid, Some(h.last_spawned_pid().0));
}

#[test]
fn status_reports_expressions() {
    let mut h = Harness::new();
    let mut class = service_class("web", "/usr/sbin/webd");
    class.start_on = Some(EventExpr::name("startup"));
    class.description = Some("web server".into());
    h.sup.on_class_loaded(class);

    match h.sup.job_status("web") {
        Response::Status { job } => {
            assert_eq!(job.start_on.as_deref(), Some("startup"));
            assert_eq!(job.description.as_deref(), Some("web server"));
            assert!(job.instances.is_empty());
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn unloading_a_class_stops_its_instances() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(service_class("web", "/usr/sbin/webd"));
    h.request(Request::Start { name: "web".into(), env: vec![], wait: false });
    h.sup.pump();
    let pid = h.last_spawned_pid();

    h.sup.apply_config(vec![]);
    h.sup.pump();
    assert_eq!(h.state_of("web"), Some(State::Killed));

    h.sup.on_child_event(pid, ChildEvent::Killed { signum: 15, core: false });
    h.sup.pump();

    // Entry retired with its last instance.
    assert!(h.sup.job_status("web").is_error());
}

#[test]
fn superseded_class_applies_to_next_start() {
    let mut h = Harness::new();
    h.sup.on_class_loaded(service_class("web", "/usr/sbin/webd"));
    h.request(Request::Start { name: "web".into(), env: vec![], wait: false });
    h.sup.pump();

    h.sup.on_class_loaded(service_class("web", "/usr/sbin/webd-new"));

    // Running instance still uses the old definition.
    let handle = JobHandle::new("web", "");
    {
        let inst = h.sup.instance(&handle).unwrap();
        assert_eq!(inst.class.process(ProcessKind::Main).unwrap().command, "/usr/sbin/webd");
    }

    // Cycle it; the new start picks up the new command.
    let pid = h.last_spawned_pid();
    h.request(Request::Stop { name: "web".into(), env: vec![], wait: false });
    h.sup.pump();
    h.sup.on_child_event(pid, ChildEvent::Killed { signum: 15, core: false });
    h.sup.pump();
    h.request(Request::Start { name: "web".into(), env: vec![], wait: false });
    h.sup.pump();

    assert_eq!(h.spawn_count(), 2);
    let inst = h.sup.instance(&handle).unwrap();
    assert_eq!(
        inst.class.process(ProcessKind::Main).unwrap().command,
        "/usr/sbin/webd-new"
    );
}
