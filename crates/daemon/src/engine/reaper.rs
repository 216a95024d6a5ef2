// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Child reaper: drains wait status for every ready child and classifies it
//! for the supervisor.

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use tracing::debug;
use vigil_core::Pid;

/// A classified child status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    /// Ran to completion with a normal exit code.
    Exited { status: i32 },
    /// Terminated by a signal, with or without a core dump.
    Killed { signum: i32, core: bool },
    /// Stopped by a signal; a trace stop when the child is being traced.
    Stopped { signum: i32 },
    /// Resumed by `SIGCONT`; informational.
    Continued,
    /// The traced child called fork.
    PtraceFork,
    /// The traced child called exec.
    PtraceExec,
}

/// Collect every pending child status without blocking.
///
/// `__WALL` makes sure trace stops from clone children are not missed;
/// `WUNTRACED`/`WCONTINUED` surface job-control stops for `expect stop`
/// jobs.
pub fn reap() -> Vec<(Pid, ChildEvent)> {
    let mut events = Vec::new();
    let flags = WaitPidFlag::WNOHANG
        | WaitPidFlag::WUNTRACED
        | WaitPidFlag::WCONTINUED
        | WaitPidFlag::__WALL;

    loop {
        match waitpid(None, Some(flags)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => {
                if let Some((pid, event)) = classify(status) {
                    events.push((pid, event));
                }
            }
            Err(Errno::ECHILD) => break,
            Err(Errno::EINTR) => continue,
            Err(errno) => {
                debug!(error = %errno, "waitpid failed");
                break;
            }
        }
    }
    events
}

fn classify(status: WaitStatus) -> Option<(Pid, ChildEvent)> {
    match status {
        WaitStatus::Exited(pid, code) => {
            Some((Pid(pid.as_raw()), ChildEvent::Exited { status: code }))
        }
        WaitStatus::Signaled(pid, signal, core) => Some((
            Pid(pid.as_raw()),
            ChildEvent::Killed { signum: signal as i32, core },
        )),
        WaitStatus::Stopped(pid, signal) => {
            Some((Pid(pid.as_raw()), ChildEvent::Stopped { signum: signal as i32 }))
        }
        WaitStatus::Continued(pid) => Some((Pid(pid.as_raw()), ChildEvent::Continued)),
        #[cfg(target_os = "linux")]
        WaitStatus::PtraceEvent(pid, _, event) => match event {
            nix::libc::PTRACE_EVENT_FORK => Some((Pid(pid.as_raw()), ChildEvent::PtraceFork)),
            nix::libc::PTRACE_EVENT_EXEC => Some((Pid(pid.as_raw()), ChildEvent::PtraceExec)),
            _ => {
                debug!(pid = pid.as_raw(), event, "ignored ptrace event");
                None
            }
        },
        #[cfg(target_os = "linux")]
        WaitStatus::PtraceSyscall(pid) => {
            debug!(pid = pid.as_raw(), "ignored ptrace syscall stop");
            None
        }
        WaitStatus::StillAlive => None,
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
