// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Configuration intake: job classes parsed from a directory of TOML files.
//!
//! One file per class, named `<job>.toml`. The supervisor core never reads
//! files itself; it consumes the [`vigil_core::JobClass`] records this
//! module delivers and accepts that the on-disk state can drift until the
//! next reload.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use vigil_core::{
    ConsoleMode, Environ, EventExpr, ExpectMode, JobClass, NormalExit, ProcessDef, ProcessKind,
    ResourceKind, RlimitSpec,
};

#[derive(Debug, Error)]
pub enum ConfError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// A process stanza: exactly one of `command` or `script`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProcessConfig {
    command: Option<String>,
    script: Option<String>,
    #[serde(default)]
    export: Vec<String>,
}

impl ProcessConfig {
    fn into_def(self, path: &Path, stanza: &str) -> Result<ProcessDef, ConfError> {
        let def = match (self.command, self.script) {
            (Some(command), None) => ProcessDef { command, script: false, export: self.export },
            (None, Some(body)) => ProcessDef { command: body, script: true, export: self.export },
            _ => {
                return Err(ConfError::Invalid {
                    path: path.to_path_buf(),
                    message: format!("{stanza}: exactly one of command or script required"),
                })
            }
        };
        Ok(def)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RespawnLimitConfig {
    count: u32,
    interval: u64,
}

/// `normal_exit` entries: a status number or a signal name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExitSpec {
    Status(i32),
    Signal(String),
}

/// The on-disk shape of a job definition.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobClassConfig {
    description: Option<String>,
    instance: Option<String>,
    start_on: Option<EventExpr>,
    stop_on: Option<EventExpr>,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    expect: ExpectMode,
    #[serde(default)]
    task: bool,
    #[serde(default)]
    respawn: bool,
    respawn_limit: Option<RespawnLimitConfig>,
    #[serde(default)]
    normal_exit: Vec<ExitSpec>,
    kill_timeout: Option<u64>,
    #[serde(default)]
    console: ConsoleMode,
    /// Octal, as a string: `umask = "022"`.
    umask: Option<String>,
    nice: Option<i32>,
    oom_adj: Option<i32>,
    chroot: Option<PathBuf>,
    chdir: Option<PathBuf>,
    #[serde(default)]
    debug: bool,
    #[serde(default)]
    limits: BTreeMap<ResourceKind, RlimitSpec>,
    main: Option<ProcessConfig>,
    #[serde(rename = "pre-start")]
    pre_start: Option<ProcessConfig>,
    #[serde(rename = "post-start")]
    post_start: Option<ProcessConfig>,
    #[serde(rename = "pre-stop")]
    pre_stop: Option<ProcessConfig>,
    #[serde(rename = "post-stop")]
    post_stop: Option<ProcessConfig>,
}

impl JobClassConfig {
    pub fn into_class(self, name: &str, path: &Path) -> Result<JobClass, ConfError> {
        let mut class = JobClass::new(name);
        class.description = self.description;
        class.instance = self.instance;
        class.start_on = self.start_on;
        class.stop_on = self.stop_on;
        class.env = Environ::from_entries(self.env);
        class.expect = self.expect;
        class.task = self.task;
        class.respawn = self.respawn;
        if let Some(limit) = self.respawn_limit {
            class.respawn_limit = limit.count;
            class.respawn_interval_secs = limit.interval;
        }
        class.normal_exit = parse_normal_exit(self.normal_exit, path)?;
        if let Some(secs) = self.kill_timeout {
            class.kill_timeout_secs = secs;
        }
        class.console = self.console;
        if let Some(umask) = self.umask {
            class.umask = u32::from_str_radix(&umask, 8).map_err(|_| ConfError::Invalid {
                path: path.to_path_buf(),
                message: format!("bad umask: {umask}"),
            })?;
        }
        if let Some(nice) = self.nice {
            class.nice = nice;
        }
        class.oom_adj = self.oom_adj;
        class.chroot = self.chroot;
        class.chdir = self.chdir;
        class.debug = self.debug;
        class.limits = self.limits.into_iter().collect();

        let stanzas = [
            (ProcessKind::Main, self.main),
            (ProcessKind::PreStart, self.pre_start),
            (ProcessKind::PostStart, self.post_start),
            (ProcessKind::PreStop, self.pre_stop),
            (ProcessKind::PostStop, self.post_stop),
        ];
        for (kind, config) in stanzas {
            if let Some(config) = config {
                class.set_process(kind, config.into_def(path, &kind.to_string())?);
            }
        }

        if !class.has_process(ProcessKind::Main) && !class.has_process(ProcessKind::PreStart) {
            return Err(ConfError::Invalid {
                path: path.to_path_buf(),
                message: "job defines no main or pre-start process".into(),
            });
        }
        Ok(class)
    }
}

fn parse_normal_exit(specs: Vec<ExitSpec>, path: &Path) -> Result<NormalExit, ConfError> {
    let mut normal = NormalExit::default();
    for spec in specs {
        match spec {
            ExitSpec::Status(status) => normal.push_status(status),
            ExitSpec::Signal(name) => match signal_number(&name) {
                Some(signum) => normal.push_signal(signum),
                None => {
                    return Err(ConfError::Invalid {
                        path: path.to_path_buf(),
                        message: format!("unknown signal: {name}"),
                    })
                }
            },
        }
    }
    Ok(normal)
}

/// Signal name (with or without the SIG prefix) to number.
fn signal_number(name: &str) -> Option<i32> {
    let name = name.strip_prefix("SIG").unwrap_or(name);
    Some(match name {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ABRT" => 6,
        "KILL" => 9,
        "USR1" => 10,
        "USR2" => 12,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        _ => return None,
    })
}

/// Parse one job file; the class name is the file stem.
pub fn load_file(path: &Path) -> Result<JobClass, ConfError> {
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| ConfError::Invalid {
            path: path.to_path_buf(),
            message: "file name is not a valid job name".into(),
        })?
        .to_string();
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfError::Io { path: path.to_path_buf(), source })?;
    let config: JobClassConfig = toml::from_str(&text)
        .map_err(|source| ConfError::Parse { path: path.to_path_buf(), source })?;
    config.into_class(&name, path)
}

/// The job configuration directory.
pub struct ConfDir {
    dir: PathBuf,
}

impl ConfDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Read every `*.toml` job file. Broken files are skipped with a
    /// warning so one bad job cannot take the system down.
    pub fn load(&self) -> Result<Vec<JobClass>, ConfError> {
        let mut classes = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|source| ConfError::Io { path: self.dir.clone(), source })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        for path in paths {
            match load_file(&path) {
                Ok(class) => classes.push(class),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unparseable job file");
                }
            }
        }
        Ok(classes)
    }
}

#[cfg(test)]
#[path = "conf_tests.rs"]
mod tests;
