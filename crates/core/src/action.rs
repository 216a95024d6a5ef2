// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Actions the state machine asks the daemon to perform.
//!
//! Transitions in [`crate::machine`] are pure; every side effect they need
//! comes back to the caller as an ordered list of `Action`s, executed by the
//! daemon against the instance that produced them.

use crate::class::ProcessKind;
use crate::event::EventSeed;
use serde::{Deserialize, Serialize};

/// Signals the machine sends to supervised processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessSignal {
    Term,
    Kill,
    Cont,
}

crate::simple_display! {
    ProcessSignal {
        Term => "TERM",
        Kill => "KILL",
        Cont => "CONT",
    }
}

/// A side effect requested by a state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Fork and exec the given process of the instance's class.
    Spawn { kind: ProcessKind },

    /// Signal the live pid of the given process kind.
    Signal { kind: ProcessKind, signal: ProcessSignal },

    /// Arm the kill timer against the given process.
    SetKillTimer { kind: ProcessKind, secs: u64 },

    /// Disarm the kill timer.
    CancelKillTimer,

    /// Emit an event. When `block` is set the instance parks on the event
    /// and resumes from [`crate::machine`]'s `on_event_finished` once it
    /// completes.
    Emit { seed: EventSeed, block: bool },

    /// The instance reached a rest point; release every event it was
    /// holding open, marking them failed if the instance failed.
    ReleaseBlocked { failed: bool },

    /// The instance is done; remove it from its class.
    Destroy,
}

impl Action {
    /// Action name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Spawn { .. } => "spawn",
            Action::Signal { .. } => "signal",
            Action::SetKillTimer { .. } => "set_kill_timer",
            Action::CancelKillTimer => "cancel_kill_timer",
            Action::Emit { .. } => "emit",
            Action::ReleaseBlocked { .. } => "release_blocked",
            Action::Destroy => "destroy",
        }
    }

    /// Key-value pairs for structured logging.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Action::Spawn { kind } => vec![("process", kind.to_string())],
            Action::Signal { kind, signal } => {
                vec![("process", kind.to_string()), ("signal", signal.to_string())]
            }
            Action::SetKillTimer { kind, secs } => {
                vec![("process", kind.to_string()), ("secs", secs.to_string())]
            }
            Action::CancelKillTimer => vec![],
            Action::Emit { seed, block } => {
                vec![("event", seed.name.to_string()), ("block", block.to_string())]
            }
            Action::ReleaseBlocked { failed } => vec![("failed", failed.to_string())],
            Action::Destroy => vec![],
        }
    }
}
