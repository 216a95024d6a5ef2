// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Shared fixtures for state-machine and daemon tests.

use crate::class::{JobClass, ProcessDef, ProcessKind};
use crate::instance::Instance;
use std::sync::Arc;

/// A single-instance class with a main process and nothing else.
pub fn service_class(name: &str, command: &str) -> JobClass {
    let mut class = JobClass::new(name);
    class.set_process(ProcessKind::Main, ProcessDef::command(command));
    class
}

/// A task class: runs to completion rather than staying up.
pub fn task_class(name: &str, command: &str) -> JobClass {
    let mut class = service_class(name, command);
    class.task = true;
    class
}

/// A respawning service with the given limit window.
pub fn respawn_class(name: &str, command: &str, limit: u32, interval_secs: u64) -> JobClass {
    let mut class = service_class(name, command);
    class.respawn = true;
    class.respawn_limit = limit;
    class.respawn_interval_secs = interval_secs;
    class
}

/// Wrap a class and create its single unnamed instance.
pub fn instance_of(class: JobClass) -> Instance {
    Instance::new(Arc::new(class), "")
}
