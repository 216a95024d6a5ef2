// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Follow-fork tracing for `expect fork` / `expect daemon` jobs.
//!
//! The platform calls hide behind [`Ptracer`] so the transition rules can be
//! exercised without a kernel. The rules themselves: after the first trap,
//! arm fork/exec reporting; on each fork, detach the old pid and follow the
//! child; once the expected number of forks has been seen (one for `fork`,
//! two for `daemon`), detach for good and let the state machine move past
//! spawned.

use crate::engine::supervisor::{ProcessAdapter, Supervisor};
use nix::errno::Errno;
use tracing::{debug, info, warn};
use vigil_core::{Clock, ExpectMode, JobHandle, Pid, ProcessKind, State, TraceState};

/// The narrow ptrace surface the tracker needs.
pub trait Ptracer {
    /// Set trace options on a stopped tracee. `follow` arms fork and exec
    /// reporting; without it the call just probes that the pid is attached.
    fn set_options(&mut self, pid: Pid, follow: bool) -> Result<(), Errno>;
    /// Resume a stopped tracee, optionally delivering a signal.
    fn cont(&mut self, pid: Pid, signum: Option<i32>) -> Result<(), Errno>;
    /// Detach from a tracee, leaving it running.
    fn detach(&mut self, pid: Pid) -> Result<(), Errno>;
    /// Read the child pid from a fork event stop.
    fn fork_child(&mut self, pid: Pid) -> Result<Pid, Errno>;
}

/// Real ptrace, Linux only.
#[derive(Default)]
pub struct SysPtracer;

#[cfg(target_os = "linux")]
impl Ptracer for SysPtracer {
    fn set_options(&mut self, pid: Pid, follow: bool) -> Result<(), Errno> {
        use nix::sys::ptrace::{setoptions, Options};
        let options = if follow {
            Options::PTRACE_O_TRACEFORK | Options::PTRACE_O_TRACEEXEC
        } else {
            Options::empty()
        };
        setoptions(nix::unistd::Pid::from_raw(pid.0), options)
    }

    fn cont(&mut self, pid: Pid, signum: Option<i32>) -> Result<(), Errno> {
        let signal = match signum {
            Some(n) => Some(nix::sys::signal::Signal::try_from(n)?),
            None => None,
        };
        nix::sys::ptrace::cont(nix::unistd::Pid::from_raw(pid.0), signal)
    }

    fn detach(&mut self, pid: Pid) -> Result<(), Errno> {
        nix::sys::ptrace::detach(nix::unistd::Pid::from_raw(pid.0), None)
    }

    fn fork_child(&mut self, pid: Pid) -> Result<Pid, Errno> {
        let msg = nix::sys::ptrace::getevent(nix::unistd::Pid::from_raw(pid.0))?;
        Ok(Pid(msg as i32))
    }
}

#[cfg(not(target_os = "linux"))]
impl Ptracer for SysPtracer {
    fn set_options(&mut self, _pid: Pid, _follow: bool) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }
    fn cont(&mut self, _pid: Pid, _signum: Option<i32>) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }
    fn detach(&mut self, _pid: Pid) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }
    fn fork_child(&mut self, _pid: Pid) -> Result<Pid, Errno> {
        Err(Errno::ENOSYS)
    }
}

/// Whether follow-fork tracing works on this build.
pub fn platform_supports_trace() -> bool {
    cfg!(target_os = "linux")
}

impl<P, T, C> Supervisor<P, T, C>
where
    P: ProcessAdapter,
    T: Ptracer,
    C: Clock,
{
    /// A traced child stopped with a signal.
    pub(crate) fn trace_trapped(&mut self, handle: &JobHandle, kind: ProcessKind, signum: i32) {
        let Some(inst) = self.registry.instance(handle) else {
            return;
        };
        match (inst.trace, signum) {
            (TraceState::New, nix::libc::SIGTRAP) => self.trace_new(handle, kind),
            (TraceState::NewChild, nix::libc::SIGSTOP) => self.trace_new_child(handle, kind),
            _ => self.trace_signal(handle, kind, signum),
        }
    }

    /// First stop of a newly traced process: arm fork/exec reporting and let
    /// it run.
    pub(crate) fn trace_new(&mut self, handle: &JobHandle, kind: ProcessKind) {
        let Some(pid) = self.traced_main_pid(handle, kind) else {
            return;
        };
        if let Err(errno) = self.ptracer.set_options(pid, true) {
            warn!(job = %handle, pid = pid.0, error = %errno,
                "failed to set ptrace options; abandoning trace");
            self.abandon_trace(handle);
            return;
        }
        if let Some(inst) = self.registry.instance_mut(handle) {
            inst.trace = TraceState::Normal;
        }
        if let Err(errno) = self.ptracer.cont(pid, None) {
            warn!(job = %handle, pid = pid.0, error = %errno, "failed to continue traced process");
        }
    }

    /// The followed fork child stopped for the first time.
    pub(crate) fn trace_new_child(&mut self, handle: &JobHandle, kind: ProcessKind) {
        let Some(pid) = self.traced_main_pid(handle, kind) else {
            return;
        };
        let (forks, expect) = {
            let Some(inst) = self.registry.instance_mut(handle) else {
                return;
            };
            inst.trace_forks += 1;
            (inst.trace_forks, inst.class.expect)
        };

        if forks > 1 || expect == ExpectMode::Fork {
            if let Err(errno) = self.ptracer.detach(pid) {
                warn!(job = %handle, pid = pid.0, error = %errno, "failed to detach traced process");
            }
            self.finish_trace(handle);
            return;
        }
        self.trace_new(handle, kind);
    }

    /// A signal was delivered to the tracee; pass it through untouched.
    pub(crate) fn trace_signal(&mut self, handle: &JobHandle, kind: ProcessKind, signum: i32) {
        let Some(pid) = self.traced_main_pid(handle, kind) else {
            return;
        };
        if self.registry.instance(handle).map(|i| i.trace) != Some(TraceState::Normal) {
            return;
        }
        if let Err(errno) = self.ptracer.cont(pid, Some(signum)) {
            warn!(job = %handle, pid = pid.0, signum, error = %errno,
                "failed to deliver signal to traced process");
        }
    }

    /// The tracee called fork: follow the child instead.
    pub(crate) fn trace_fork(&mut self, handle: &JobHandle, kind: ProcessKind) {
        let Some(pid) = self.traced_main_pid(handle, kind) else {
            return;
        };
        if self.registry.instance(handle).map(|i| i.trace) != Some(TraceState::Normal) {
            return;
        }

        let child = match self.ptracer.fork_child(pid) {
            Ok(child) => child,
            Err(errno) => {
                warn!(job = %handle, pid = pid.0, error = %errno,
                    "failed to obtain forked child pid");
                return;
            }
        };
        info!(job = %handle, old_pid = pid.0, new_pid = child.0, "process became new process");

        if let Err(errno) = self.ptracer.detach(pid) {
            warn!(job = %handle, pid = pid.0, error = %errno, "failed to detach traced process");
        }

        self.rebind_main_pid(handle, pid, child);
        if let Some(inst) = self.registry.instance_mut(handle) {
            inst.trace = TraceState::NewChild;
        }

        // The wait notification for the child may already have arrived, in
        // which case it is attached and stopped right now.
        if self.ptracer.set_options(child, false).is_ok() {
            self.trace_new_child(handle, kind);
        } else {
            debug!(job = %handle, pid = child.0, "new child not yet stopped");
        }
    }

    /// The tracee called exec. If it forked first the trace is complete;
    /// otherwise keep following (exec before fork is fine).
    pub(crate) fn trace_exec(&mut self, handle: &JobHandle, kind: ProcessKind) {
        let Some(pid) = self.traced_main_pid(handle, kind) else {
            return;
        };
        let Some(inst) = self.registry.instance(handle) else {
            return;
        };
        if inst.trace != TraceState::Normal {
            return;
        }

        if inst.trace_forks > 0 {
            if let Err(errno) = self.ptracer.detach(pid) {
                warn!(job = %handle, pid = pid.0, error = %errno, "failed to detach traced process");
            }
            self.finish_trace(handle);
        } else if let Err(errno) = self.ptracer.cont(pid, None) {
            warn!(job = %handle, pid = pid.0, error = %errno, "failed to continue traced process");
        }
    }

    /// The trace is done; advance the machine past spawned.
    fn finish_trace(&mut self, handle: &JobHandle) {
        let mut out = Vec::new();
        if let Some(inst) = self.registry.instance_mut(handle) {
            inst.on_trace_done(&mut out);
        }
        self.run_actions(handle, out);
    }

    /// A ptrace operation failed outright: drop the trace and carry on as if
    /// it had completed.
    fn abandon_trace(&mut self, handle: &JobHandle) {
        self.finish_trace(handle);
    }

    /// The main pid, but only while the trace is relevant: main process,
    /// still in the spawned state.
    fn traced_main_pid(&self, handle: &JobHandle, kind: ProcessKind) -> Option<Pid> {
        if kind != ProcessKind::Main {
            return None;
        }
        let inst = self.registry.instance(handle)?;
        if inst.state != State::Spawned {
            return None;
        }
        inst.pid(ProcessKind::Main)
    }
}

#[cfg(test)]
#[path = "trace_tests.rs"]
mod tests;
