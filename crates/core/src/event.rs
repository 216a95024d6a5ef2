// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Events: named stimuli with an environment and a blocking lifecycle.

use crate::blocker::{Blocker, WaiterId};
use crate::environ::Environ;
use crate::instance::JobHandle;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Well-known event names emitted by the supervisor itself.
pub mod names {
    /// Emitted once when initialisation completes.
    pub const STARTUP: &str = "startup";
    /// An instance began its start sequence; blocks the instance.
    pub const STARTING: &str = "starting";
    /// An instance reached the running state.
    pub const STARTED: &str = "started";
    /// An instance began its stop sequence; blocks the instance.
    pub const STOPPING: &str = "stopping";
    /// An instance returned to waiting.
    pub const STOPPED: &str = "stopped";
    /// `SIGINT` received (ctrl-alt-delete when running as init).
    pub const CTRL_ALT_DELETE: &str = "ctrl-alt-delete";
    /// `SIGWINCH` received (keyboard request when running as init).
    pub const KBD_REQUEST: &str = "kbd-request";
    /// `SIGPWR` received.
    pub const POWER_STATUS: &str = "power-status";
    /// `SIGHUP` received.
    pub const RELOAD_CONFIGURATION: &str = "reload-configuration";
}

/// Sequence number identifying an event for the duration of its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event-{}", self.0)
    }
}

/// Where an event is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventState {
    /// Queued, not yet handled.
    Pending,
    /// Being (or been) handled; alive while blockers remain.
    Handling,
    /// Blocker set drained; holders have been notified.
    Finished,
}

crate::simple_display! {
    EventState {
        Pending => "pending",
        Handling => "handling",
        Finished => "finished",
    }
}

/// A request to emit an event: name plus environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSeed {
    pub name: SmolStr,
    #[serde(default, skip_serializing_if = "Environ::is_empty")]
    pub env: Environ,
}

impl EventSeed {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self { name: name.into(), env: Environ::new() }
    }

    pub fn with_env(name: impl Into<SmolStr>, env: Environ) -> Self {
        Self { name: name.into(), env }
    }
}

/// A live event on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: SmolStr,
    pub env: Environ,
    pub state: EventState,
    pub blockers: Vec<Blocker>,
    pub failed: bool,
}

impl Event {
    pub fn new(id: EventId, seed: EventSeed) -> Self {
        Self {
            id,
            name: seed.name,
            env: seed.env,
            state: EventState::Pending,
            blockers: Vec::new(),
            failed: false,
        }
    }

    pub fn block(&mut self, blocker: Blocker) {
        self.blockers.push(blocker);
    }

    /// Drop the blocker for `job`; returns whether one was held.
    pub fn unblock_job(&mut self, job: &JobHandle) -> bool {
        let before = self.blockers.len();
        self.blockers.retain(|b| b.job() != Some(job));
        self.blockers.len() != before
    }

    /// Drop the blocker for a departed control caller.
    pub fn unblock_waiter(&mut self, waiter: WaiterId) {
        self.blockers.retain(|b| b.waiter() != Some(waiter));
    }

    pub fn is_blocked(&self) -> bool {
        !self.blockers.is_empty()
    }

    /// One-line description for logging.
    pub fn log_summary(&self) -> String {
        if self.env.is_empty() {
            format!("{} [{}]", self.name, self.id)
        } else {
            let env: Vec<&str> = self.env.entries().collect();
            format!("{} {} [{}]", self.name, env.join(" "), self.id)
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
