// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Ordered environment-variable lists.
//!
//! Job processes and events both carry their environment as an ordered list
//! of `KEY=VALUE` strings. Order is preserved on output; setting an existing
//! key replaces it in place.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A `$VARIABLE` in a template had no value in the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown variable: ${0}")]
pub struct MissingVariable(pub String);

/// An ordered list of `KEY=VALUE` environment entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environ(Vec<String>);

impl Environ {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build from `KEY=VALUE` strings, dropping malformed entries.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut env = Self::new();
        for entry in entries {
            let entry = entry.into();
            if entry.contains('=') {
                env.push_entry(entry);
            }
        }
        env
    }

    /// Set `key` to `value`, replacing any existing entry in place.
    pub fn set(&mut self, key: &str, value: &str) {
        self.push_entry(format!("{key}={value}"));
    }

    /// Look up the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Merge `other` over this environment; entries in `other` win.
    pub fn merge(&mut self, other: &Environ) {
        for entry in &other.0 {
            self.push_entry(entry.clone());
        }
    }

    /// Iterate entries in order as `KEY=VALUE` strings.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Iterate entries in order as `(key, value)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().filter_map(|entry| entry.split_once('='))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expand `$VARIABLE` references in a template against this
    /// environment. A lone `$` passes through.
    pub fn expand(&self, template: &str) -> Result<String, MissingVariable> {
        let mut result = String::new();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }
            let mut name = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                result.push('$');
                continue;
            }
            match self.get(&name) {
                Some(value) => result.push_str(value),
                None => return Err(MissingVariable(name)),
            }
        }
        Ok(result)
    }

    fn push_entry(&mut self, entry: String) {
        let key_len = entry.find('=').unwrap_or(entry.len());
        let key = &entry[..key_len];
        if let Some(existing) = self.0.iter_mut().find(|e| {
            e.split_once('=').map(|(k, _)| k).unwrap_or(e.as_str()) == key
        }) {
            *existing = entry;
        } else {
            self.0.push(entry);
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Environ {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

#[cfg(test)]
#[path = "environ_tests.rs"]
mod tests;
