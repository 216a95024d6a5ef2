// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Shared fakes for engine tests: spawn/kill and ptrace without a kernel.

use crate::engine::spawn::SpawnError;
use crate::engine::supervisor::{ControlVerdict, ProcessAdapter, Supervisor};
use crate::engine::trace::Ptracer;
use crate::protocol::{Request, Response};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use vigil_core::{Environ, FakeClock, JobClass, JobHandle, Pid, ProcessKind, State};

#[derive(Default)]
pub(crate) struct FakeProcessState {
    pub next_pid: i32,
    /// `(class, kind, traced)` per spawn, in order.
    pub spawned: Vec<(String, ProcessKind, bool)>,
    pub kills: Vec<(Pid, Signal)>,
    /// Errors to return for upcoming spawns, in order.
    pub fail_queue: Vec<SpawnError>,
}

/// Records spawn/kill calls instead of forking.
#[derive(Clone, Default)]
pub(crate) struct FakeProcesses(pub Arc<Mutex<FakeProcessState>>);

impl ProcessAdapter for FakeProcesses {
    fn spawn(
        &mut self,
        class: &JobClass,
        kind: ProcessKind,
        _env: &Environ,
        trace: bool,
    ) -> Result<Pid, SpawnError> {
        let mut state = self.0.lock();
        if !state.fail_queue.is_empty() {
            return Err(state.fail_queue.remove(0));
        }
        state.next_pid += 1;
        state.spawned.push((class.name.to_string(), kind, trace));
        Ok(Pid(1000 + state.next_pid))
    }

    fn kill(&mut self, pid: Pid, signal: Signal) -> Result<(), Errno> {
        self.0.lock().kills.push((pid, signal));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakePtracerState {
    pub ops: Vec<String>,
    pub fork_children: Vec<Pid>,
    /// When set, `set_options(_, false)` probes fail (child not stopped yet).
    pub probe_fails: bool,
}

/// Records ptrace calls; fork children are scripted.
#[derive(Clone, Default)]
pub(crate) struct FakePtracer(pub Arc<Mutex<FakePtracerState>>);

impl Ptracer for FakePtracer {
    fn set_options(&mut self, pid: Pid, follow: bool) -> Result<(), Errno> {
        let mut state = self.0.lock();
        if !follow && state.probe_fails {
            return Err(Errno::ESRCH);
        }
        state.ops.push(format!("set_options({}, follow={follow})", pid.0));
        Ok(())
    }

    fn cont(&mut self, pid: Pid, signum: Option<i32>) -> Result<(), Errno> {
        self.0.lock().ops.push(match signum {
            Some(n) => format!("cont({}, sig={n})", pid.0),
            None => format!("cont({})", pid.0),
        });
        Ok(())
    }

    fn detach(&mut self, pid: Pid) -> Result<(), Errno> {
        self.0.lock().ops.push(format!("detach({})", pid.0));
        Ok(())
    }

    fn fork_child(&mut self, pid: Pid) -> Result<Pid, Errno> {
        let mut state = self.0.lock();
        let child = state.fork_children.remove(0);
        state.ops.push(format!("fork_child({}) -> {}", pid.0, child.0));
        Ok(child)
    }
}

pub(crate) struct Harness {
    pub sup: Supervisor<FakeProcesses, FakePtracer, FakeClock>,
    pub processes: FakeProcesses,
    pub ptracer: FakePtracer,
    pub clock: FakeClock,
}

impl Harness {
    pub fn new() -> Self {
        let processes = FakeProcesses::default();
        let ptracer = FakePtracer::default();
        let clock = FakeClock::new();
        let sup = Supervisor::new(processes.clone(), ptracer.clone(), clock.clone());
        Self { sup, processes, ptracer, clock }
    }

    pub fn last_spawned_pid(&self) -> Pid {
        Pid(1000 + self.processes.0.lock().next_pid)
    }

    pub fn spawn_count(&self) -> usize {
        self.processes.0.lock().spawned.len()
    }

    /// Send a control request that must be handled without driver help.
    pub fn request(&mut self, request: Request) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        assert!(matches!(
            self.sup.handle_control(request, tx),
            ControlVerdict::Done
        ));
        rx
    }

    pub fn state_of(&self, class: &str) -> Option<State> {
        self.sup.instance(&JobHandle::new(class, "")).map(|inst| inst.state)
    }
}
