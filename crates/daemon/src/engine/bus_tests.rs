// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use vigil_core::{Blocker, JobHandle, WaiterId};

#[test]
fn events_are_handled_in_emission_order() {
    let mut bus = EventBus::new();
    let first = bus.emit(EventSeed::new("startup"));
    let second = bus.emit(EventSeed::new("power-status"));

    assert_eq!(bus.take_pending(), Some(first));
    assert_eq!(bus.take_pending(), Some(second));
    assert_eq!(bus.take_pending(), None);
}

#[test]
fn pending_event_cannot_finish() {
    let mut bus = EventBus::new();
    let id = bus.emit(EventSeed::new("startup"));
    assert!(bus.try_finish(id).is_none());
    bus.take_pending();
    assert!(bus.try_finish(id).is_some());
}

#[test]
fn job_blocker_holds_event_open() {
    let mut bus = EventBus::new();
    let id = bus.emit(EventSeed::new("startup"));
    bus.take_pending();

    bus.get_mut(id)
        .unwrap()
        .block(Blocker::Job { job: JobHandle::new("web", "") });
    assert!(bus.try_finish(id).is_none());

    bus.get_mut(id).unwrap().unblock_job(&JobHandle::new("web", ""));
    let event = bus.try_finish(id).unwrap();
    assert_eq!(event.state, EventState::Finished);
    assert_eq!(bus.live_count(), 0);
}

#[test]
fn waiters_do_not_gate_finishing() {
    let mut bus = EventBus::new();
    let id = bus.emit(EventSeed::new("startup"));
    bus.take_pending();
    bus.get_mut(id).unwrap().block(Blocker::EmitMethod { waiter: WaiterId(1) });

    let event = bus.try_finish(id).unwrap();
    // The waiter is still attached, ready to be notified.
    assert_eq!(event.blockers.len(), 1);
}

#[test]
fn finish_is_idempotent() {
    let mut bus = EventBus::new();
    let id = bus.emit(EventSeed::new("startup"));
    bus.take_pending();
    assert!(bus.try_finish(id).is_some());
    assert!(bus.try_finish(id).is_none());
}
