// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use crate::instance::JobHandle;

fn handle(class: &str) -> JobHandle {
    JobHandle::new(class, "")
}

#[test]
fn new_event_is_pending_and_unblocked() {
    let event = Event::new(EventId(1), EventSeed::new("startup"));
    assert_eq!(event.state, EventState::Pending);
    assert!(!event.is_blocked());
    assert!(!event.failed);
}

#[test]
fn unblock_job_removes_only_that_job() {
    let mut event = Event::new(EventId(1), EventSeed::new("startup"));
    event.block(Blocker::Job { job: handle("web") });
    event.block(Blocker::Job { job: handle("db") });
    event.block(Blocker::EmitMethod { waiter: WaiterId(7) });

    assert!(event.unblock_job(&handle("web")));
    assert!(!event.unblock_job(&handle("web")));
    assert_eq!(event.blockers.len(), 2);
}

#[test]
fn unblock_waiter_releases_method_blockers() {
    let mut event = Event::new(EventId(1), EventSeed::new("startup"));
    event.block(Blocker::StartMethod { waiter: WaiterId(3) });
    event.block(Blocker::Job { job: handle("web") });

    event.unblock_waiter(WaiterId(3));
    assert_eq!(event.blockers.len(), 1);
    assert!(event.is_blocked());
}

#[test]
fn log_summary_includes_environment() {
    let seed = EventSeed::with_env("starting", Environ::from_entries(["JOB=web"]));
    let event = Event::new(EventId(4), seed);
    assert_eq!(event.log_summary(), "starting JOB=web [event-4]");
}

#[test]
fn seed_serde_roundtrip() {
    let seed = EventSeed::with_env("power-status", Environ::from_entries(["STATE=low"]));
    let json = serde_json::to_string(&seed).unwrap();
    let back: EventSeed = serde_json::from_str(&json).unwrap();
    assert_eq!(back, seed);
}
