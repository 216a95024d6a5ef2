// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Timer wheel for the main loop.
//!
//! The supervisor requests timer changes through [`TimerOp`]s; the driver
//! owns the actual delay queue so the select loop can await expiry without
//! borrowing the supervisor.

use std::collections::HashMap;
use std::time::Duration;
use tokio_util::time::{delay_queue, DelayQueue};
use vigil_core::JobHandle;

/// Timers the supervisor can hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Kill escalation for an instance's signalled process.
    Kill(JobHandle),
}

/// A timer change requested by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerOp {
    Arm { key: TimerKey, after: Duration },
    Cancel { key: TimerKey },
}

#[derive(Default)]
pub struct Timers {
    queue: DelayQueue<TimerKey>,
    keys: HashMap<TimerKey, delay_queue::Key>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, op: TimerOp) {
        match op {
            TimerOp::Arm { key, after } => self.arm(key, after),
            TimerOp::Cancel { key } => self.cancel(&key),
        }
    }

    /// Arm (or re-arm) a timer.
    pub fn arm(&mut self, key: TimerKey, after: Duration) {
        if let Some(existing) = self.keys.remove(&key) {
            self.queue.remove(&existing);
        }
        let handle = self.queue.insert(key.clone(), after);
        self.keys.insert(key, handle);
    }

    pub fn cancel(&mut self, key: &TimerKey) {
        if let Some(existing) = self.keys.remove(key) {
            self.queue.remove(&existing);
        }
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.keys.contains_key(key)
    }

    /// Wait for the next timer to fire. Pends forever while no timer is
    /// armed, so it is safe to poll from a select loop.
    pub async fn expired(&mut self) -> TimerKey {
        use futures_util::StreamExt;
        loop {
            if self.keys.is_empty() {
                futures_util::future::pending::<()>().await;
            }
            if let Some(expired) = self.queue.next().await {
                let key = expired.into_inner();
                self.keys.remove(&key);
                return key;
            }
        }
    }
}

#[cfg(test)]
#[path = "timers_tests.rs"]
mod tests;
