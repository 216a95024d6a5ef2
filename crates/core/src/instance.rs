// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Job instances: the running realisations of a class.
//!
//! An instance is identified by `(class, name)` and carries the goal, state,
//! pid table, and trace bookkeeping that the state machine in
//! [`crate::machine`] operates on.

use crate::class::{JobClass, ProcessKind, PROCESS_KINDS};
use crate::environ::Environ;
use crate::event::EventId;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;

/// A supervised process id. The daemon converts to and from the platform
/// type at its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pid(pub i32);

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the caller wants an instance to be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Goal {
    Stop,
    Start,
    /// Stop, then start again without an external stimulus.
    Respawn,
}

impl Goal {
    /// Whether this goal drives the instance toward running.
    pub fn is_start(self) -> bool {
        matches!(self, Goal::Start | Goal::Respawn)
    }
}

crate::simple_display! {
    Goal {
        Stop => "stop",
        Start => "start",
        Respawn => "respawn",
    }
}

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum State {
    Waiting,
    Starting,
    PreStart,
    Spawned,
    PostStart,
    Running,
    PreStop,
    Stopping,
    Killed,
    PostStop,
}

crate::simple_display! {
    State {
        Waiting => "waiting",
        Starting => "starting",
        PreStart => "pre-start",
        Spawned => "spawned",
        PostStart => "post-start",
        Running => "running",
        PreStop => "pre-stop",
        Stopping => "stopping",
        Killed => "killed",
        PostStop => "post-stop",
    }
}

/// Follow-fork sub-state for `expect fork` / `expect daemon` tracing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceState {
    /// Not tracing.
    #[default]
    None,
    /// Armed; awaiting the first trap after exec of the spawned child.
    New,
    /// A fork was followed; awaiting the new child's first stop.
    NewChild,
    /// Options set; following the process normally.
    Normal,
}

crate::simple_display! {
    TraceState {
        None => "none",
        New => "new",
        NewChild => "new-child",
        Normal => "normal",
    }
}

/// Process termination status in the combined encoding: normal exits carry
/// the status as-is, terminations by signal carry the signal number shifted
/// into the high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExitStatus(i32);

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus(0);

    pub fn from_code(code: i32) -> Self {
        Self(code)
    }

    pub fn from_signal(signum: i32) -> Self {
        Self(signum << 8)
    }

    pub fn encoded(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// The terminating signal, if this was a kill rather than an exit.
    pub fn signal(self) -> Option<i32> {
        (self.0 & !0xff == self.0 && self.0 != 0).then_some(self.0 >> 8)
    }

    /// The exit code, when not killed by a signal.
    pub fn code(self) -> Option<i32> {
        self.signal().is_none().then_some(self.0)
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.signal() {
            Some(signum) => match signal_name(signum) {
                Some(name) => write!(f, "signal {name}"),
                None => write!(f, "signal {signum}"),
            },
            None => write!(f, "status {}", self.0),
        }
    }
}

/// Names for the signals jobs commonly die from.
pub fn signal_name(signum: i32) -> Option<&'static str> {
    Some(match signum {
        1 => "HUP",
        2 => "INT",
        3 => "QUIT",
        4 => "ILL",
        6 => "ABRT",
        8 => "FPE",
        9 => "KILL",
        11 => "SEGV",
        13 => "PIPE",
        14 => "ALRM",
        15 => "TERM",
        _ => return None,
    })
}

/// Recorded when an instance fails, and carried on its `stopped` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailRecord {
    pub process: ProcessKind,
    pub status: ExitStatus,
}

/// Weak reference to an instance: class name plus instance name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub class: SmolStr,
    pub instance: SmolStr,
}

impl JobHandle {
    pub fn new(class: impl Into<SmolStr>, instance: impl Into<SmolStr>) -> Self {
        Self { class: class.into(), instance: instance.into() }
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.instance.is_empty() {
            f.write_str(&self.class)
        } else {
            write!(f, "{} ({})", self.class, self.instance)
        }
    }
}

/// One running realisation of a [`JobClass`].
#[derive(Debug, Clone)]
pub struct Instance {
    /// The defining class. Held by `Arc` so a superseded class stays alive
    /// until its last instance stops.
    pub class: Arc<JobClass>,
    /// Instance name; empty for single-instance classes.
    pub name: SmolStr,
    pub goal: Goal,
    pub state: State,
    /// At most one live pid per process kind.
    pub pids: [Option<Pid>; PROCESS_KINDS],
    pub failed: Option<FailRecord>,
    /// Start of the current respawn window (clock epoch ms).
    pub respawn_time_ms: u64,
    /// Respawns seen inside the current window.
    pub respawn_count: u32,
    /// Environment handed to the instance when it was told to start;
    /// snapshotted into `env` on entering the starting state.
    pub start_env: Environ,
    /// The captured lifecycle environment all processes run with.
    pub env: Environ,
    /// Environment of the stop request; exported to pre-stop and post-stop.
    pub stop_env: Option<Environ>,
    /// Process the armed kill timer targets, if any.
    pub kill_timer: Option<ProcessKind>,
    pub trace: TraceState,
    pub trace_forks: u32,
    /// Event whose completion the instance is waiting on.
    pub blocker: Option<EventId>,
    /// Events held open until this instance finishes starting or stopping.
    pub blocking: Vec<EventId>,
}

impl Instance {
    pub fn new(class: Arc<JobClass>, name: impl Into<SmolStr>) -> Self {
        Self {
            class,
            name: name.into(),
            goal: Goal::Stop,
            state: State::Waiting,
            pids: Default::default(),
            failed: None,
            respawn_time_ms: 0,
            respawn_count: 0,
            start_env: Environ::new(),
            env: Environ::new(),
            stop_env: None,
            kill_timer: None,
            trace: TraceState::None,
            trace_forks: 0,
            blocker: None,
            blocking: Vec::new(),
        }
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle { class: self.class.name.clone(), instance: self.name.clone() }
    }

    pub fn pid(&self, kind: ProcessKind) -> Option<Pid> {
        self.pids[kind.index()]
    }

    pub fn set_pid(&mut self, kind: ProcessKind, pid: Pid) {
        self.pids[kind.index()] = Some(pid);
    }

    pub fn clear_pid(&mut self, kind: ProcessKind) {
        self.pids[kind.index()] = None;
    }

    pub fn main_alive(&self) -> bool {
        self.pid(ProcessKind::Main).is_some()
    }

    /// Snapshot the lifecycle environment: class defaults, then the start
    /// request's environment, then the identity variables.
    pub fn capture_env(&mut self) {
        let mut env = self.class.env.clone();
        env.merge(&self.start_env);
        env.set("VIGIL_JOB", &self.class.name);
        env.set("VIGIL_INSTANCE", &self.name);
        self.env = env;
    }

    /// Environment carried on `starting` and `started` events.
    pub fn event_env(&self) -> Environ {
        let mut env = Environ::new();
        env.set("JOB", &self.class.name);
        env.set("INSTANCE", &self.name);
        env
    }

    /// Environment carried on `stopping` and `stopped` events: identity plus
    /// the failure result.
    pub fn result_env(&self) -> Environ {
        let mut env = self.event_env();
        match self.failed {
            None => env.set("RESULT", "ok"),
            Some(record) => {
                env.set("RESULT", "failed");
                env.set("PROCESS", &record.process.to_string());
                if let Some(signum) = record.status.signal() {
                    match signal_name(signum) {
                        Some(name) => env.set("EXIT_SIGNAL", name),
                        None => env.set("EXIT_SIGNAL", &signum.to_string()),
                    }
                } else {
                    env.set("EXIT_STATUS", &record.status.encoded().to_string());
                }
            }
        }
        env
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
