// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Event bus: the queue of pending events and the set of live ones.
//!
//! Emission never blocks the caller. The supervisor's pump drains the
//! pending queue in order, and events stay alive until their blocker set
//! has only reply-waiters left (which are notified as the event finishes).

use std::collections::{HashMap, VecDeque};
use tracing::debug;
use vigil_core::{Event, EventId, EventSeed, EventState};

#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    pending: VecDeque<EventId>,
    live: HashMap<EventId, Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the next pump run.
    pub fn emit(&mut self, seed: EventSeed) -> EventId {
        self.next_id += 1;
        let id = EventId(self.next_id);
        let event = Event::new(id, seed);
        debug!(event = %event.log_summary(), "queued");
        self.live.insert(id, event);
        self.pending.push_back(id);
        id
    }

    /// Pop the oldest pending event, marking it handling.
    pub fn take_pending(&mut self) -> Option<EventId> {
        let id = self.pending.pop_front()?;
        if let Some(event) = self.live.get_mut(&id) {
            event.state = EventState::Handling;
        }
        Some(id)
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.live.get(&id)
    }

    pub fn get_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.live.get_mut(&id)
    }

    /// Finish the event if nothing but reply-waiters hold it open.
    ///
    /// Returns the finished event, with its state updated, for the caller
    /// to notify waiters and parked instances from.
    pub fn try_finish(&mut self, id: EventId) -> Option<Event> {
        let event = self.live.get(&id)?;
        if event.state != EventState::Handling {
            return None;
        }
        if !event.blockers.iter().all(|b| b.waiter().is_some()) {
            return None;
        }
        let mut event = self.live.remove(&id)?;
        event.state = EventState::Finished;
        debug!(event = %event.log_summary(), failed = event.failed, "finished");
        Some(event)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
