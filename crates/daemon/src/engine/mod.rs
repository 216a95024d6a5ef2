// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Supervisor engine: spawning, reaping, tracing, and the event pump.

mod binder;
pub mod bus;
#[cfg(test)]
pub(crate) mod test_helpers;
pub mod console;
pub mod reaper;
pub mod registry;
pub mod spawn;
pub mod supervisor;
pub mod timers;
pub mod trace;
pub mod waiters;

pub use reaper::{reap, ChildEvent};
pub use supervisor::{ControlVerdict, ProcessAdapter, Supervisor, UnixProcesses};
pub use timers::{TimerKey, TimerOp, Timers};
pub use trace::{Ptracer, SysPtracer};
