// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Start-on / stop-on event expressions.
//!
//! A class declares when it starts and stops as a boolean tree over event
//! matchers. A matcher names an event and may constrain arguments carried in
//! the event environment; argument patterns support `*` and `?` globbing.

use crate::environ::Environ;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// A single event matcher: name equality plus per-argument checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMatch {
    pub event: SmolStr,
    /// `KEY = pattern` checks against the event environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, String>,
}

impl EventMatch {
    pub fn name(event: impl Into<SmolStr>) -> Self {
        Self { event: event.into(), args: BTreeMap::new() }
    }

    pub fn arg(mut self, key: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.args.insert(key.into(), pattern.into());
        self
    }

    fn matches(&self, name: &str, env: &Environ) -> bool {
        if self.event != name {
            return false;
        }
        self.args.iter().all(|(key, pattern)| {
            env.get(key).is_some_and(|value| glob_match(pattern, value))
        })
    }
}

/// Boolean tree over [`EventMatch`] leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventExpr {
    /// Bare event name.
    Name(SmolStr),
    /// All sub-expressions must be satisfied.
    All { all: Vec<EventExpr> },
    /// Any sub-expression suffices.
    Any { any: Vec<EventExpr> },
    /// Event name with argument matchers.
    Match(EventMatch),
}

impl EventExpr {
    pub fn name(event: impl Into<SmolStr>) -> Self {
        EventExpr::Name(event.into())
    }

    pub fn all(exprs: impl IntoIterator<Item = EventExpr>) -> Self {
        EventExpr::All { all: exprs.into_iter().collect() }
    }

    pub fn any(exprs: impl IntoIterator<Item = EventExpr>) -> Self {
        EventExpr::Any { any: exprs.into_iter().collect() }
    }

    /// Whether a single event satisfies this expression.
    ///
    /// Conjunctions are evaluated against the one event being handled: every
    /// branch must be satisfied by it. Cross-event conjunction state is a
    /// configuration-layer concern and is not tracked here.
    pub fn matches(&self, name: &str, env: &Environ) -> bool {
        match self {
            EventExpr::Name(event) => event == name,
            EventExpr::Match(m) => m.matches(name, env),
            EventExpr::All { all } => !all.is_empty() && all.iter().all(|e| e.matches(name, env)),
            EventExpr::Any { any } => any.iter().any(|e| e.matches(name, env)),
        }
    }
}

impl std::fmt::Display for EventExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventExpr::Name(event) => f.write_str(event),
            EventExpr::Match(m) => {
                f.write_str(&m.event)?;
                for (key, pattern) in &m.args {
                    write!(f, " {key}={pattern}")?;
                }
                Ok(())
            }
            EventExpr::All { all } => write_joined(f, all, " and "),
            EventExpr::Any { any } => write_joined(f, any, " or "),
        }
    }
}

fn write_joined(
    f: &mut std::fmt::Formatter<'_>,
    exprs: &[EventExpr],
    sep: &str,
) -> std::fmt::Result {
    f.write_str("(")?;
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{expr}")?;
    }
    f.write_str(")")
}

/// Shell-style glob match supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    glob_at(&pat, &txt)
}

fn glob_at(pat: &[char], txt: &[char]) -> bool {
    match pat.split_first() {
        None => txt.is_empty(),
        Some(('*', rest)) => {
            (0..=txt.len()).any(|skip| glob_at(rest, &txt[skip..]))
        }
        Some(('?', rest)) => {
            txt.split_first().is_some_and(|(_, t)| glob_at(rest, t))
        }
        Some((c, rest)) => {
            txt.split_first().is_some_and(|(t, ts)| t == c && glob_at(rest, ts))
        }
    }
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
