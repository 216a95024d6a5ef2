// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Blockers: the things that hold an event open.
//!
//! An event finishes only once its blocker set is empty. Blockers reference
//! their holder through weak handles (names and table ids), never owning
//! pointers, so releasing one can never leave a cycle behind.

use crate::event::EventId;
use crate::instance::JobHandle;
use serde::{Deserialize, Serialize};

/// Handle into the daemon's table of control-method reply channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaiterId(pub u64);

impl std::fmt::Display for WaiterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "waiter-{}", self.0)
    }
}

/// Something an event is waiting on before it can finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Blocker {
    /// An instance working through the start or stop sequence the event
    /// triggered.
    Job { job: JobHandle },
    /// Another event that must finish first.
    Event { event: EventId },
    /// A control caller that asked `emit --wait`.
    EmitMethod { waiter: WaiterId },
    /// A control caller that asked `start --wait`.
    StartMethod { waiter: WaiterId },
    /// A control caller that asked `stop --wait`.
    StopMethod { waiter: WaiterId },
    /// A control caller that asked `restart --wait`.
    RestartMethod { waiter: WaiterId },
}

impl Blocker {
    /// The reply-table handle, for method blockers.
    pub fn waiter(&self) -> Option<WaiterId> {
        match self {
            Blocker::EmitMethod { waiter }
            | Blocker::StartMethod { waiter }
            | Blocker::StopMethod { waiter }
            | Blocker::RestartMethod { waiter } => Some(*waiter),
            Blocker::Job { .. } | Blocker::Event { .. } => None,
        }
    }

    /// The blocking instance, for job blockers.
    pub fn job(&self) -> Option<&JobHandle> {
        match self {
            Blocker::Job { job } => Some(job),
            _ => None,
        }
    }
}

crate::simple_display! {
    Blocker {
        Job { .. } => "job",
        Event { .. } => "event",
        EmitMethod { .. } => "emit-method",
        StartMethod { .. } => "start-method",
        StopMethod { .. } => "stop-method",
        RestartMethod { .. } => "restart-method",
    }
}
