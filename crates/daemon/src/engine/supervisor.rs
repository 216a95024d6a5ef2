// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! The supervisor: owns the class registry, the pid index, the event bus,
//! and the waiter table, and executes the [`Action`]s the per-instance
//! state machine produces.
//!
//! Everything here is mutated from the main loop only; the listener and the
//! timer wheel talk to it through channels and [`TimerOp`] buffers.

use crate::engine::bus::EventBus;
use crate::engine::reaper::ChildEvent;
use crate::engine::registry::Registry;
use crate::engine::spawn::{plan_command, spawn_process, SpawnError};
use crate::engine::timers::{TimerKey, TimerOp};
use crate::engine::trace::{platform_supports_trace, Ptracer};
use crate::engine::waiters::WaiterTable;
use crate::protocol::{InstanceStatus, JobStatus, JobSummary, Request, Response};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use vigil_core::{
    event::names, Action, Blocker, Clock, Environ, EventId, EventSeed, ExitStatus, ExpectMode,
    Instance, JobClass, JobHandle, Pid, ProcessKind, ProcessSignal, TraceState,
};

/// Process operations the supervisor needs; a trait so tests can run the
/// whole engine without forking.
pub trait ProcessAdapter {
    fn spawn(
        &mut self,
        class: &JobClass,
        kind: ProcessKind,
        env: &Environ,
        trace: bool,
    ) -> Result<Pid, SpawnError>;

    fn kill(&mut self, pid: Pid, signal: Signal) -> Result<(), Errno>;
}

/// Real fork/exec spawning and signalling.
#[derive(Default)]
pub struct UnixProcesses;

impl ProcessAdapter for UnixProcesses {
    fn spawn(
        &mut self,
        class: &JobClass,
        kind: ProcessKind,
        env: &Environ,
        trace: bool,
    ) -> Result<Pid, SpawnError> {
        let def = class.process(kind).ok_or(SpawnError::Exec(Errno::ENOENT))?;
        let plan = plan_command(def);
        let (pid, feed) = spawn_process(class, kind, &plan, env, trace)?;
        if let Some(feed) = feed {
            // Feed the script body off the main loop; closing the fd gives
            // the shell its EOF.
            tokio::task::spawn_blocking(move || {
                use std::io::Write;
                let mut pipe = std::fs::File::from(feed.fd);
                if let Err(error) = pipe.write_all(feed.body.as_bytes()) {
                    warn!(%error, "failed to feed script to shell");
                }
            });
        }
        Ok(pid)
    }

    fn kill(&mut self, pid: Pid, signal: Signal) -> Result<(), Errno> {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid.0), signal)
    }
}

/// Control requests the supervisor defers to the driver.
pub enum ControlVerdict {
    /// Fully handled (reply sent or registered for later).
    Done,
    /// Re-read the configuration directory, then reply.
    Reload(oneshot::Sender<Response>),
    /// Read the log filter, then reply.
    GetLogPriority(oneshot::Sender<Response>),
    /// Replace the log filter, then reply.
    SetLogPriority(String, oneshot::Sender<Response>),
}

pub struct Supervisor<P, T, C> {
    pub(crate) registry: Registry,
    pub(crate) bus: EventBus,
    pub(crate) waiters: WaiterTable,
    pub(crate) ptracer: T,
    processes: P,
    clock: C,
    /// pid → owning instance and process kind.
    pid_index: HashMap<i32, (JobHandle, ProcessKind)>,
    /// Event → instance parked on its completion.
    parked: HashMap<EventId, JobHandle>,
    /// Control callers waiting for an instance to finish starting or
    /// stopping, tagged by the method that registered them.
    instance_waiters: HashMap<JobHandle, Vec<Blocker>>,
    /// Timer changes for the driver to apply after each dispatch.
    timer_ops: Vec<TimerOp>,
}

impl<P, T, C> Supervisor<P, T, C>
where
    P: ProcessAdapter,
    T: Ptracer,
    C: Clock,
{
    pub fn new(processes: P, ptracer: T, clock: C) -> Self {
        Self {
            registry: Registry::new(),
            bus: EventBus::new(),
            waiters: WaiterTable::new(),
            ptracer,
            processes,
            clock,
            pid_index: HashMap::new(),
            parked: HashMap::new(),
            instance_waiters: HashMap::new(),
            timer_ops: Vec::new(),
        }
    }

    /// Timer changes accumulated since the last drain.
    pub fn take_timer_ops(&mut self) -> Vec<TimerOp> {
        std::mem::take(&mut self.timer_ops)
    }

    // === configuration intake ===

    /// A parsed class arrived from the configuration collaborator.
    pub fn on_class_loaded(&mut self, mut class: JobClass) {
        if class.traced() && !platform_supports_trace() {
            warn!(job = %class.name, expect = %class.expect,
                "expect fork/daemon unsupported on this platform; treating as expect none");
            class.expect = ExpectMode::None;
        }
        info!(job = %class.name, "class registered");
        self.registry.register(class);
    }

    /// A class definition went away; stop its instances and retire it.
    pub fn on_class_unloaded(&mut self, name: &str) {
        if !self.registry.contains(name) {
            return;
        }
        info!(job = name, "class unregistered");
        let handles = self.registry.mark_deleted(name);
        for handle in handles {
            let mut out = Vec::new();
            if let Some(inst) = self.registry.instance_mut(&handle) {
                inst.stop(Environ::new(), &mut out);
            }
            self.run_actions(&handle, out);
        }
        self.registry.collect_deleted(name);
    }

    /// Reconcile the registry against a freshly parsed configuration set.
    pub fn apply_config(&mut self, classes: Vec<JobClass>) {
        let keep: Vec<_> = classes.iter().map(|c| c.name.clone()).collect();
        let stale: Vec<_> = self
            .registry
            .class_names()
            .into_iter()
            .filter(|name| !keep.contains(name))
            .collect();
        for class in classes {
            self.on_class_loaded(class);
        }
        for name in stale {
            self.on_class_unloaded(&name);
        }
    }

    // === events ===

    /// Emit the startup event that kicks the binder at boot.
    pub fn emit_startup(&mut self) {
        self.bus.emit(EventSeed::new(names::STARTUP));
    }

    /// Emit a named event (signal mappings, control emit).
    pub fn emit(&mut self, seed: EventSeed) -> EventId {
        self.bus.emit(seed)
    }

    /// Drain the pending queue: run the binder over each event and finish
    /// those nothing held open.
    pub fn pump(&mut self) {
        while let Some(id) = self.bus.take_pending() {
            self.bind_event(id);
            self.finish_event_if_ready(id);
        }
    }

    pub(crate) fn finish_event_if_ready(&mut self, id: EventId) {
        let Some(event) = self.bus.try_finish(id) else {
            return;
        };

        for blocker in &event.blockers {
            if let Some(waiter) = blocker.waiter() {
                let response = if event.failed {
                    Response::error(format!("{} event failed", event.name))
                } else {
                    Response::Ok
                };
                self.waiters.resolve(waiter, response);
            }
        }

        if let Some(handle) = self.parked.remove(&id) {
            let mut out = Vec::new();
            if let Some(inst) = self.registry.instance_mut(&handle) {
                inst.on_event_finished(id, &mut out);
            }
            self.run_actions(&handle, out);
        }
    }

    // === child events ===

    /// Route a reaped child status to its owning instance.
    pub fn on_child_event(&mut self, pid: Pid, event: ChildEvent) {
        let Some((handle, kind)) = self.pid_index.get(&pid.0).cloned() else {
            debug!(pid = pid.0, ?event, "ignored event for unknown pid");
            return;
        };

        match event {
            ChildEvent::Exited { status } => {
                if status == 0 {
                    info!(job = %handle, process = %kind, pid = pid.0, "process exited normally");
                } else {
                    warn!(job = %handle, process = %kind, pid = pid.0, status,
                        "process terminated with status");
                }
                self.child_terminated(&handle, kind, pid, ExitStatus::from_code(status));
            }
            ChildEvent::Killed { signum, core } => {
                warn!(job = %handle, process = %kind, pid = pid.0, signum, core,
                    "process killed by signal");
                self.child_terminated(&handle, kind, pid, ExitStatus::from_signal(signum));
            }
            ChildEvent::Stopped { signum } => {
                let traced = self
                    .registry
                    .instance(&handle)
                    .is_some_and(|inst| inst.trace != TraceState::None);
                if traced && kind == ProcessKind::Main {
                    self.trace_trapped(&handle, kind, signum);
                } else if signum == nix::libc::SIGSTOP {
                    let mut out = Vec::new();
                    if let Some(inst) = self.registry.instance_mut(&handle) {
                        inst.on_child_stopped(kind, &mut out);
                    }
                    self.run_actions(&handle, out);
                } else {
                    // tty stops and friends are none of our business
                    debug!(job = %handle, process = %kind, signum, "ignored stop signal");
                }
            }
            ChildEvent::Continued => {
                info!(job = %handle, process = %kind, pid = pid.0, "process continued");
            }
            ChildEvent::PtraceFork => self.trace_fork(&handle, kind),
            ChildEvent::PtraceExec => self.trace_exec(&handle, kind),
        }
    }

    fn child_terminated(
        &mut self,
        handle: &JobHandle,
        kind: ProcessKind,
        pid: Pid,
        status: ExitStatus,
    ) {
        self.pid_index.remove(&pid.0);
        let clock = self.clock.clone();
        let mut out = Vec::new();
        if let Some(inst) = self.registry.instance_mut(handle) {
            inst.on_child_terminated(kind, status, &clock, &mut out);
        }
        self.run_actions(handle, out);
    }

    /// The kill timer for an instance expired.
    pub fn on_kill_timeout(&mut self, handle: &JobHandle) {
        let mut out = Vec::new();
        if let Some(inst) = self.registry.instance_mut(handle) {
            inst.on_kill_timeout(&mut out);
        }
        self.run_actions(handle, out);
    }

    /// Swap the supervised pid for an instance's main process (follow-fork).
    pub(crate) fn rebind_main_pid(&mut self, handle: &JobHandle, old: Pid, new: Pid) {
        self.pid_index.remove(&old.0);
        self.pid_index.insert(new.0, (handle.clone(), ProcessKind::Main));
        if let Some(inst) = self.registry.instance_mut(handle) {
            inst.set_pid(ProcessKind::Main, new);
        }
    }

    // === action execution ===

    pub(crate) fn run_actions(&mut self, handle: &JobHandle, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            debug!(job = %handle, action = action.name(), "executing");
            match action {
                Action::Spawn { kind } => {
                    let Some(inst) = self.registry.instance(handle) else {
                        continue;
                    };
                    let class = Arc::clone(&inst.class);
                    let env = build_process_env(inst, kind);
                    let trace = kind == ProcessKind::Main && class.traced();
                    let mut out = Vec::new();
                    match self.processes.spawn(&class, kind, &env, trace) {
                        Ok(pid) => {
                            self.pid_index.insert(pid.0, (handle.clone(), kind));
                            if let Some(inst) = self.registry.instance_mut(handle) {
                                inst.on_spawned(kind, pid, &mut out);
                            }
                        }
                        Err(error) => {
                            warn!(job = %handle, process = %kind, %error,
                                "failed to spawn process");
                            if let Some(inst) = self.registry.instance_mut(handle) {
                                inst.on_spawn_failed(kind, &mut out);
                            }
                        }
                    }
                    queue.extend(out);
                }

                Action::Signal { kind, signal } => {
                    let Some(pid) =
                        self.registry.instance(handle).and_then(|inst| inst.pid(kind))
                    else {
                        continue;
                    };
                    info!(job = %handle, process = %kind, pid = pid.0, signal = %signal,
                        "sending signal");
                    match self.processes.kill(pid, map_signal(signal)) {
                        Ok(()) | Err(Errno::ESRCH) => {}
                        Err(errno) => {
                            warn!(job = %handle, pid = pid.0, error = %errno,
                                "failed to send signal");
                        }
                    }
                }

                Action::SetKillTimer { secs, .. } => {
                    self.timer_ops.push(TimerOp::Arm {
                        key: TimerKey::Kill(handle.clone()),
                        after: Duration::from_secs(secs),
                    });
                }

                Action::CancelKillTimer => {
                    self.timer_ops
                        .push(TimerOp::Cancel { key: TimerKey::Kill(handle.clone()) });
                }

                Action::Emit { seed, block } => {
                    let id = self.bus.emit(seed);
                    if block {
                        if let Some(inst) = self.registry.instance_mut(handle) {
                            inst.blocker = Some(id);
                        }
                        self.parked.insert(id, handle.clone());
                    }
                }

                Action::ReleaseBlocked { failed } => {
                    let held = self
                        .registry
                        .instance_mut(handle)
                        .map(|inst| std::mem::take(&mut inst.blocking))
                        .unwrap_or_default();
                    for id in held {
                        if let Some(event) = self.bus.get_mut(id) {
                            event.unblock_job(handle);
                            if failed {
                                event.failed = true;
                            }
                        }
                        self.finish_event_if_ready(id);
                    }
                    for blocker in self.instance_waiters.remove(handle).unwrap_or_default() {
                        let Some(waiter) = blocker.waiter() else {
                            continue;
                        };
                        let response = if failed {
                            Response::error(format!("job failed: {handle}"))
                        } else {
                            Response::Ok
                        };
                        self.waiters.resolve(waiter, response);
                    }
                }

                Action::Destroy => self.destroy_instance(handle),
            }
        }
    }

    fn destroy_instance(&mut self, handle: &JobHandle) {
        info!(job = %handle, "instance removed");
        self.pid_index.retain(|_, (owner, _)| owner != handle);
        self.parked.retain(|_, owner| owner != handle);
        for blocker in self.instance_waiters.remove(handle).unwrap_or_default() {
            if let Some(waiter) = blocker.waiter() {
                self.waiters.resolve(waiter, Response::Ok);
            }
        }
        self.registry.remove_instance(handle);
        self.registry.collect_deleted(&handle.class);
    }

    // === control surface ===

    pub fn handle_control(
        &mut self,
        request: Request,
        reply: oneshot::Sender<Response>,
    ) -> ControlVerdict {
        match request {
            Request::Ping => {
                let _ = reply.send(Response::Ok);
            }
            Request::Hello { .. } | Request::Version => {
                let _ = reply.send(Response::Version {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    protocol: crate::protocol::PROTOCOL_VERSION.to_string(),
                });
            }
            Request::List => {
                let _ = reply.send(Response::List { jobs: self.list_jobs() });
            }
            Request::Status { name } => {
                let _ = reply.send(self.job_status(&name));
            }
            Request::Start { name, env, wait } => self.control_start(&name, env, wait, reply),
            Request::Stop { name, env, wait } => self.control_stop(&name, env, wait, reply),
            Request::Restart { name, env, wait } => {
                self.control_restart(&name, env, wait, reply)
            }
            Request::Emit { name, env, wait } => self.control_emit(&name, env, wait, reply),
            Request::ReloadConfiguration => return ControlVerdict::Reload(reply),
            Request::GetLogPriority => return ControlVerdict::GetLogPriority(reply),
            Request::SetLogPriority { priority } => {
                return ControlVerdict::SetLogPriority(priority, reply)
            }
        }
        ControlVerdict::Done
    }

    fn control_start(
        &mut self,
        name: &str,
        env: Vec<String>,
        wait: bool,
        reply: oneshot::Sender<Response>,
    ) {
        let env = Environ::from_entries(env);
        let Some(entry) = self.registry.lookup(name) else {
            let _ = reply.send(Response::error(format!("unknown job: {name}")));
            return;
        };
        let instance_name = match expand_instance(&entry.class, &env) {
            Ok(instance_name) => instance_name,
            Err(missing) => {
                let _ = reply
                    .send(Response::error(format!("unknown instance variable: {missing}")));
                return;
            }
        };

        let Some(inst) = self.registry.ensure_instance(name, &instance_name) else {
            let _ = reply.send(Response::error(format!("unknown job: {name}")));
            return;
        };
        if inst.goal.is_start() {
            let _ = reply.send(Response::error(format!("job already running: {name}")));
            return;
        }
        let handle = inst.handle();
        let mut out = Vec::new();
        inst.start(env, &mut out);

        if wait {
            let waiter = self.waiters.register(reply);
            self.instance_waiters
                .entry(handle.clone())
                .or_default()
                .push(Blocker::StartMethod { waiter });
        } else {
            let _ = reply.send(Response::Ok);
        }
        self.run_actions(&handle, out);
    }

    fn control_stop(
        &mut self,
        name: &str,
        env: Vec<String>,
        wait: bool,
        reply: oneshot::Sender<Response>,
    ) {
        let env = Environ::from_entries(env);
        let Some((handle, out)) = self.stop_matching(name, &env) else {
            let _ = reply.send(Response::error(format!("unknown instance: {name}")));
            return;
        };
        if wait {
            let waiter = self.waiters.register(reply);
            self.instance_waiters
                .entry(handle.clone())
                .or_default()
                .push(Blocker::StopMethod { waiter });
        } else {
            let _ = reply.send(Response::Ok);
        }
        self.run_actions(&handle, out);
    }

    fn control_restart(
        &mut self,
        name: &str,
        env: Vec<String>,
        wait: bool,
        reply: oneshot::Sender<Response>,
    ) {
        let env = Environ::from_entries(env);
        let Some(entry) = self.registry.lookup(name) else {
            let _ = reply.send(Response::error(format!("unknown job: {name}")));
            return;
        };
        let instance_name = match expand_instance(&entry.class, &env) {
            Ok(instance_name) => instance_name,
            Err(missing) => {
                let _ = reply
                    .send(Response::error(format!("unknown instance variable: {missing}")));
                return;
            }
        };
        let handle = JobHandle::new(name, instance_name.as_str());
        let Some(inst) = self.registry.instance_mut(&handle) else {
            let _ = reply.send(Response::error(format!("unknown instance: {name}")));
            return;
        };
        if !inst.goal.is_start() {
            let _ = reply.send(Response::error(format!("job not running: {name}")));
            return;
        }

        let mut out = Vec::new();
        inst.stop(env.clone(), &mut out);
        inst.start(env, &mut out);

        if wait {
            let waiter = self.waiters.register(reply);
            self.instance_waiters
                .entry(handle.clone())
                .or_default()
                .push(Blocker::RestartMethod { waiter });
        } else {
            let _ = reply.send(Response::Ok);
        }
        self.run_actions(&handle, out);
    }

    fn control_emit(
        &mut self,
        name: &str,
        env: Vec<String>,
        wait: bool,
        reply: oneshot::Sender<Response>,
    ) {
        let seed = EventSeed::with_env(name, Environ::from_entries(env));
        let id = self.bus.emit(seed);
        if wait {
            let waiter = self.waiters.register(reply);
            if let Some(event) = self.bus.get_mut(id) {
                event.block(Blocker::EmitMethod { waiter });
            }
        } else {
            let _ = reply.send(Response::Ok);
        }
    }

    /// Stop the matching instance of `name`, returning its handle and the
    /// actions to run.
    fn stop_matching(
        &mut self,
        name: &str,
        env: &Environ,
    ) -> Option<(JobHandle, Vec<Action>)> {
        let entry = self.registry.lookup(name)?;
        let instance_name = expand_instance(&entry.class, env).ok()?;
        let handle = JobHandle::new(name, instance_name.as_str());
        let inst = self.registry.instance_mut(&handle)?;
        if !inst.goal.is_start() {
            return None;
        }
        let mut out = Vec::new();
        inst.stop(env.clone(), &mut out);
        Some((handle, out))
    }

    // === queries ===

    pub fn list_jobs(&self) -> Vec<JobSummary> {
        let mut jobs = Vec::new();
        for (_, entry) in self.registry.iter() {
            for inst in entry.instances.values() {
                jobs.push(JobSummary {
                    class: inst.class.name.to_string(),
                    instance: inst.name.to_string(),
                    goal: inst.goal.to_string(),
                    state: inst.state.to_string(),
                    pid: inst.pid(ProcessKind::Main).map(|p| p.0),
                });
            }
        }
        jobs
    }

    pub fn job_status(&self, name: &str) -> Response {
        let Some(entry) = self.registry.lookup(name) else {
            return Response::error(format!("unknown job: {name}"));
        };
        let instances = entry
            .instances
            .values()
            .map(|inst| InstanceStatus {
                instance: inst.name.to_string(),
                goal: inst.goal.to_string(),
                state: inst.state.to_string(),
                pids: ProcessKind::ALL
                    .iter()
                    .filter_map(|&kind| {
                        inst.pid(kind).map(|pid| (kind.to_string(), pid.0))
                    })
                    .collect(),
                failed: inst.failed.is_some(),
            })
            .collect();
        Response::Status {
            job: JobStatus {
                class: entry.class.name.to_string(),
                description: entry.class.description.clone(),
                start_on: entry.class.start_on.as_ref().map(|e| e.to_string()),
                stop_on: entry.class.stop_on.as_ref().map(|e| e.to_string()),
                instances,
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn instance(&self, handle: &JobHandle) -> Option<&Instance> {
        self.registry.instance(handle)
    }
}

fn map_signal(signal: ProcessSignal) -> Signal {
    match signal {
        ProcessSignal::Term => Signal::SIGTERM,
        ProcessSignal::Kill => Signal::SIGKILL,
        ProcessSignal::Cont => Signal::SIGCONT,
    }
}

/// Assemble the environment one process runs with: the captured lifecycle
/// environment, the stop environment for the stop-side processes, and any
/// extra exported variables from the supervisor's own environment.
pub(crate) fn build_process_env(inst: &Instance, kind: ProcessKind) -> Environ {
    let mut env = inst.env.clone();
    if matches!(kind, ProcessKind::PreStop | ProcessKind::PostStop) {
        if let Some(stop_env) = &inst.stop_env {
            env.merge(stop_env);
        }
    }
    if let Some(def) = inst.class.process(kind) {
        for name in &def.export {
            if !env.contains(name) {
                if let Ok(value) = std::env::var(name) {
                    env.set(name, &value);
                }
            }
        }
    }
    env
}

/// Expand a class's instance-name template against an environment.
pub(crate) fn expand_instance(
    class: &JobClass,
    env: &Environ,
) -> Result<String, vigil_core::environ::MissingVariable> {
    match &class.instance {
        Some(template) => env.expand(template),
        None => Ok(String::new()),
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
