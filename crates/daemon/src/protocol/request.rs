// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use serde::{Deserialize, Serialize};

/// Request from a control client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping.
    Ping,

    /// Version handshake.
    Hello { version: String },

    /// Daemon version string.
    Version,

    /// Start an instance of the named class.
    Start {
        name: String,
        /// Extra `KEY=VALUE` entries for the job environment; the first may
        /// select the instance for multi-instance classes.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        env: Vec<String>,
        /// Defer the reply until the instance is running (or failed).
        #[serde(default)]
        wait: bool,
    },

    /// Stop an instance of the named class.
    Stop {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        env: Vec<String>,
        #[serde(default)]
        wait: bool,
    },

    /// Stop then start an instance of the named class.
    Restart {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        env: Vec<String>,
        #[serde(default)]
        wait: bool,
    },

    /// Emit an event by name.
    Emit {
        name: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        env: Vec<String>,
        /// Defer the reply until the event finishes.
        #[serde(default)]
        wait: bool,
    },

    /// Summaries of every known instance.
    List,

    /// Detail for one class (and its instances).
    Status { name: String },

    /// Re-read the job configuration directory.
    ReloadConfiguration,

    /// Read the daemon's log filter.
    GetLogPriority,

    /// Replace the daemon's log filter.
    SetLogPriority { priority: String },
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
