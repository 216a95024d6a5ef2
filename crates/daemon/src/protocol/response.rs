// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use serde::{Deserialize, Serialize};

/// One instance in a `List` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub class: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance: String,
    pub goal: String,
    pub state: String,
    /// Main process id, when one is alive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
}

/// Detail for a `Status` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_on: Option<String>,
    pub stop_on: Option<String>,
    pub instances: Vec<InstanceStatus>,
}

/// One instance inside a `Status` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance: String,
    pub goal: String,
    pub state: String,
    /// Live pids by process name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pids: Vec<(String, i32)>,
    #[serde(default)]
    pub failed: bool,
}

/// Reply from the daemon to a control client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Request succeeded with nothing to report.
    Ok,

    /// Request failed.
    Error { message: String },

    /// Reply to `Version` and `Hello`.
    Version { version: String, protocol: String },

    /// Reply to `List`.
    List { jobs: Vec<JobSummary> },

    /// Reply to `Status`.
    Status { job: JobStatus },

    /// Reply to `GetLogPriority`.
    LogPriority { priority: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error { message: message.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
