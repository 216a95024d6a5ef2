// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Job classes: the declarative templates jobs are started from.

use crate::environ::Environ;
use crate::expr::EventExpr;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::path::PathBuf;

/// Number of process kinds a class can define.
pub const PROCESS_KINDS: usize = 5;

/// The processes a job may run over its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessKind {
    Main,
    PreStart,
    PostStart,
    PreStop,
    PostStop,
}

impl ProcessKind {
    pub const ALL: [ProcessKind; PROCESS_KINDS] = [
        ProcessKind::Main,
        ProcessKind::PreStart,
        ProcessKind::PostStart,
        ProcessKind::PreStop,
        ProcessKind::PostStop,
    ];

    /// Index into per-kind tables such as [`crate::instance::Instance::pids`].
    pub fn index(self) -> usize {
        match self {
            ProcessKind::Main => 0,
            ProcessKind::PreStart => 1,
            ProcessKind::PostStart => 2,
            ProcessKind::PreStop => 3,
            ProcessKind::PostStop => 4,
        }
    }
}

crate::simple_display! {
    ProcessKind {
        Main => "main",
        PreStart => "pre-start",
        PostStart => "post-start",
        PreStop => "pre-stop",
        PostStop => "post-stop",
    }
}

/// How the supervisor decides the main process is ready.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpectMode {
    /// Ready as soon as it has been spawned.
    #[default]
    None,
    /// Ready once it raises `SIGSTOP` against itself.
    Stop,
    /// Ready after it forks once.
    Fork,
    /// Ready after it forks twice.
    Daemon,
}

crate::simple_display! {
    ExpectMode {
        None => "none",
        Stop => "stop",
        Fork => "fork",
        Daemon => "daemon",
    }
}

/// Where a job's standard file descriptors are attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsoleMode {
    /// The null device.
    #[default]
    None,
    /// The system console.
    Output,
    /// The system console, owning the terminal.
    Owner,
    /// The console device, output captured by a logger.
    Logged,
}

crate::simple_display! {
    ConsoleMode {
        None => "none",
        Output => "output",
        Owner => "owner",
        Logged => "logged",
    }
}

/// Resource-limit kinds a class can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    As,
    Core,
    Cpu,
    Data,
    Fsize,
    Memlock,
    Msgqueue,
    Nice,
    Nofile,
    Nproc,
    Rss,
    Rtprio,
    Sigpending,
    Stack,
}

crate::simple_display! {
    ResourceKind {
        As => "as",
        Core => "core",
        Cpu => "cpu",
        Data => "data",
        Fsize => "fsize",
        Memlock => "memlock",
        Msgqueue => "msgqueue",
        Nice => "nice",
        Nofile => "nofile",
        Nproc => "nproc",
        Rss => "rss",
        Rtprio => "rtprio",
        Sigpending => "sigpending",
        Stack => "stack",
    }
}

/// Soft/hard limit values; `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RlimitSpec {
    #[serde(default)]
    pub soft: Option<u64>,
    #[serde(default)]
    pub hard: Option<u64>,
}

/// One process a class may run, and how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDef {
    /// Command line, or script body when `script` is set.
    pub command: String,
    /// Run via the shell rather than exec'ing the command directly.
    #[serde(default)]
    pub script: bool,
    /// Additional variable names exported into this process's environment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub export: Vec<String>,
}

impl ProcessDef {
    pub fn command(command: impl Into<String>) -> Self {
        Self { command: command.into(), script: false, export: Vec::new() }
    }

    pub fn script(body: impl Into<String>) -> Self {
        Self { command: body.into(), script: true, export: Vec::new() }
    }
}

/// Exit statuses and signals that do not count as failure.
///
/// Stored in the combined encoding of [`crate::instance::ExitStatus`]:
/// plain statuses as-is, signals shifted into the high byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalExit(pub Vec<i32>);

impl NormalExit {
    pub fn statuses(statuses: impl IntoIterator<Item = i32>) -> Self {
        Self(statuses.into_iter().collect())
    }

    pub fn push_status(&mut self, status: i32) {
        self.0.push(status);
    }

    pub fn push_signal(&mut self, signum: i32) {
        self.0.push(signum << 8);
    }

    pub fn contains_encoded(&self, encoded: i32) -> bool {
        self.0.contains(&encoded)
    }
}

/// A job class: everything needed to start, supervise, and stop instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobClass {
    pub name: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Instance-name template, expanded against the start event environment.
    /// Empty for single-instance classes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Per-kind process table; indexed by [`ProcessKind::index`].
    pub processes: [Option<ProcessDef>; PROCESS_KINDS],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_on: Option<EventExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_on: Option<EventExpr>,
    /// Class-level environment defaults, merged under the start event's.
    #[serde(default, skip_serializing_if = "Environ::is_empty")]
    pub env: Environ,
    #[serde(default)]
    pub expect: ExpectMode,
    #[serde(default)]
    pub task: bool,
    #[serde(default)]
    pub respawn: bool,
    pub respawn_limit: u32,
    pub respawn_interval_secs: u64,
    #[serde(default)]
    pub normal_exit: NormalExit,
    pub kill_timeout_secs: u64,
    #[serde(default)]
    pub console: ConsoleMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub limits: Vec<(ResourceKind, RlimitSpec)>,
    pub umask: u32,
    pub nice: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oom_adj: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chroot: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chdir: Option<PathBuf>,
    /// Stop the child with `SIGSTOP` before exec so a debugger can attach.
    #[serde(default)]
    pub debug: bool,
}

impl JobClass {
    /// Create a class with the supervisor defaults and no processes.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            description: None,
            instance: None,
            processes: Default::default(),
            start_on: None,
            stop_on: None,
            env: Environ::new(),
            expect: ExpectMode::None,
            task: false,
            respawn: false,
            respawn_limit: 10,
            respawn_interval_secs: 5,
            normal_exit: NormalExit::default(),
            kill_timeout_secs: 5,
            console: ConsoleMode::None,
            limits: Vec::new(),
            umask: 0o022,
            nice: 0,
            oom_adj: None,
            chroot: None,
            chdir: None,
            debug: false,
        }
    }

    pub fn process(&self, kind: ProcessKind) -> Option<&ProcessDef> {
        self.processes[kind.index()].as_ref()
    }

    pub fn has_process(&self, kind: ProcessKind) -> bool {
        self.processes[kind.index()].is_some()
    }

    pub fn set_process(&mut self, kind: ProcessKind, def: ProcessDef) {
        self.processes[kind.index()] = Some(def);
    }

    /// Whether spawning the main process arms the fork tracer.
    pub fn traced(&self) -> bool {
        matches!(self.expect, ExpectMode::Fork | ExpectMode::Daemon)
    }

    /// Forks the tracer must observe before the main pid is final.
    pub fn expected_forks(&self) -> u32 {
        match self.expect {
            ExpectMode::Fork => 1,
            ExpectMode::Daemon => 2,
            _ => 0,
        }
    }
}

#[cfg(test)]
#[path = "class_tests.rs"]
mod tests;
