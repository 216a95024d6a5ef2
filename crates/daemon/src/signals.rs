// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Signal plumbing for the main loop.
//!
//! Asynchronous signals are funneled through tokio's signal driver into the
//! select loop; nothing runs in signal-delivery context except the crash
//! handler, which must fork-and-dump synchronously.

use thiserror::Error;
use tokio::signal::unix::{signal, Signal, SignalKind};
use vigil_core::event::names;

/// Stimuli the main loop receives from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorSignal {
    /// One or more children changed state; drain the reaper.
    Child,
    /// ctrl-alt-delete (`SIGINT` to pid 1).
    CtrlAltDelete,
    /// Keyboard request (`SIGWINCH` to pid 1).
    KbdRequest,
    /// Power status change (`SIGPWR`).
    PowerStatus,
    /// Reload configuration (`SIGHUP`).
    Reload,
    /// Re-bind the control socket (`SIGUSR1`).
    ReconnectControl,
}

impl SupervisorSignal {
    /// The event emitted for this signal, for those that map to one.
    pub fn event_name(self) -> Option<&'static str> {
        match self {
            SupervisorSignal::CtrlAltDelete => Some(names::CTRL_ALT_DELETE),
            SupervisorSignal::KbdRequest => Some(names::KBD_REQUEST),
            SupervisorSignal::PowerStatus => Some(names::POWER_STATUS),
            SupervisorSignal::Reload => Some(names::RELOAD_CONFIGURATION),
            SupervisorSignal::Child | SupervisorSignal::ReconnectControl => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to install signal stream: {0}")]
    Install(#[from] std::io::Error),
}

/// The set of signal streams the daemon listens on.
pub struct SignalStreams {
    child: Signal,
    interrupt: Signal,
    winch: Signal,
    power: Option<Signal>,
    hangup: Signal,
    usr1: Signal,
}

impl SignalStreams {
    pub fn install() -> Result<Self, SignalError> {
        Ok(Self {
            child: signal(SignalKind::child())?,
            interrupt: signal(SignalKind::interrupt())?,
            winch: signal(SignalKind::window_change())?,
            power: power_stream()?,
            hangup: signal(SignalKind::hangup())?,
            usr1: signal(SignalKind::user_defined1())?,
        })
    }

    /// Wait for the next signal of interest.
    pub async fn recv(&mut self) -> SupervisorSignal {
        loop {
            tokio::select! {
                Some(()) = self.child.recv() => return SupervisorSignal::Child,
                Some(()) = self.interrupt.recv() => return SupervisorSignal::CtrlAltDelete,
                Some(()) = self.winch.recv() => return SupervisorSignal::KbdRequest,
                Some(()) = recv_opt(&mut self.power) => return SupervisorSignal::PowerStatus,
                Some(()) = self.hangup.recv() => return SupervisorSignal::Reload,
                Some(()) = self.usr1.recv() => return SupervisorSignal::ReconnectControl,
                else => {}
            }
        }
    }
}

async fn recv_opt(stream: &mut Option<Signal>) -> Option<()> {
    match stream {
        Some(stream) => stream.recv().await,
        None => futures_util::future::pending().await,
    }
}

#[cfg(target_os = "linux")]
fn power_stream() -> Result<Option<Signal>, SignalError> {
    Ok(Some(signal(SignalKind::from_raw(nix::libc::SIGPWR))?))
}

#[cfg(not(target_os = "linux"))]
fn power_stream() -> Result<Option<Signal>, SignalError> {
    Ok(None)
}

/// Install the synchronous crash handler for `SIGSEGV`/`SIGABRT`.
///
/// On crash: fork a child that re-raises the signal with the default
/// disposition so a core is dumped, then exit with the signal number.
#[allow(unsafe_code)]
pub fn install_crash_handler() {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet};

    let action = SigAction::new(
        SigHandler::Handler(crash_handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        let _ = sigaction(nix::sys::signal::Signal::SIGSEGV, &action);
        let _ = sigaction(nix::sys::signal::Signal::SIGABRT, &action);
    }
}

/// Async-signal-safe: syscalls only.
#[allow(unsafe_code)]
extern "C" fn crash_handler(signum: i32) {
    unsafe {
        let pid = nix::libc::fork();
        if pid == 0 {
            // Child: default disposition, unlimited core, dump in /.
            let mut mask: nix::libc::sigset_t = std::mem::zeroed();
            nix::libc::sigfillset(&mut mask);
            nix::libc::sigprocmask(nix::libc::SIG_SETMASK, &mask, std::ptr::null_mut());

            nix::libc::signal(signum, nix::libc::SIG_DFL);

            let limit = nix::libc::rlimit {
                rlim_cur: nix::libc::RLIM_INFINITY,
                rlim_max: nix::libc::RLIM_INFINITY,
            };
            nix::libc::setrlimit(nix::libc::RLIMIT_CORE, &limit);
            nix::libc::chdir(c"/".as_ptr());

            nix::libc::raise(signum);
            nix::libc::sigdelset(&mut mask, signum);
            nix::libc::sigprocmask(nix::libc::SIG_SETMASK, &mask, std::ptr::null_mut());
            nix::libc::pause();
            nix::libc::_exit(0);
        } else if pid > 0 {
            let mut status = 0;
            nix::libc::waitpid(pid, &mut status, 0);
        }
        nix::libc::_exit(signum);
    }
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
