// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;

#[test]
fn fake_clock_starts_nonzero() {
    assert!(FakeClock::new().epoch_ms() > 0);
}

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(10_000);
    clock.advance(Duration::from_millis(1500));
    assert_eq!(clock.epoch_ms(), 11_500);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.set_epoch_ms(42);
    assert_eq!(other.epoch_ms(), 42);
}

#[test]
fn system_clock_is_recent() {
    // After 2020, before the heat death of the test machine.
    assert!(SystemClock.epoch_ms() > 1_577_836_800_000);
}
