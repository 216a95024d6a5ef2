// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! vigil daemon library.
//!
//! Exposes the control protocol types for CLI clients alongside the
//! supervisor engine itself.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod conf;
pub mod engine;
pub mod lifecycle;
pub mod listener;
pub mod protocol;
pub mod signals;

pub use protocol::{
    InstanceStatus, JobStatus, JobSummary, ProtocolError, Request, Response, PROTOCOL_VERSION,
};
