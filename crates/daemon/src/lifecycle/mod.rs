// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Daemon lifecycle: configuration, startup, and the main loop.
//!
//! The loop is the single thread of control. Signals, control requests, and
//! timer expiry are serialised through one `select!`; after every stimulus
//! the event pump runs and pending timer changes are applied.

use crate::conf::{ConfDir, ConfError};
use crate::engine::{
    reap, ControlVerdict, Supervisor, SysPtracer, TimerKey, Timers, UnixProcesses,
};
use crate::listener::{self, ControlMsg};
use crate::protocol::Response;
use crate::signals::{SignalError, SignalStreams, SupervisorSignal};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter};
use vigil_core::{EventSeed, SystemClock};

/// The supervisor with its production adapters.
pub type DaemonSupervisor = Supervisor<UnixProcesses, SysPtracer, SystemClock>;

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory of `<job>.toml` class definitions.
    pub conf_dir: PathBuf,
    /// Path of the control socket.
    pub socket_path: PathBuf,
    /// Running as an ordinary user for development, not as init.
    pub user_mode: bool,
    /// Re-exec: suppress the startup event.
    pub restart: bool,
}

impl Config {
    /// System paths, for running as pid 1.
    pub fn system() -> Self {
        Self {
            conf_dir: PathBuf::from("/etc/vigil/jobs"),
            socket_path: PathBuf::from("/run/vigil.sock"),
            user_mode: false,
            restart: false,
        }
    }

    /// Per-user paths, for the debug mode.
    pub fn user() -> Self {
        let runtime = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        Self {
            conf_dir: PathBuf::from("/etc/vigil/jobs"),
            socket_path: runtime.join("vigil.sock"),
            user_mode: true,
            restart: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("signal setup failed: {0}")]
    Signal(#[from] SignalError),

    #[error("configuration error: {0}")]
    Conf(#[from] ConfError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad log filter: {0}")]
    LogFilter(String),
}

/// Handle on the daemon's log filter, for get/set log-priority.
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    current: String,
}

impl LogControl {
    /// Install the global subscriber with a reloadable filter.
    pub fn init(filter: &str) -> Result<Self, LifecycleError> {
        let env_filter = EnvFilter::try_new(filter)
            .map_err(|e| LifecycleError::LogFilter(e.to_string()))?;
        let (layer, handle) = reload::Layer::new(env_filter);
        tracing_subscriber::registry()
            .with(layer)
            .with(tracing_subscriber::fmt::layer())
            .init();
        Ok(Self { handle, current: filter.to_string() })
    }

    pub fn get(&self) -> &str {
        &self.current
    }

    pub fn set(&mut self, filter: &str) -> Result<(), LifecycleError> {
        let env_filter = EnvFilter::try_new(filter)
            .map_err(|e| LifecycleError::LogFilter(e.to_string()))?;
        self.handle
            .reload(env_filter)
            .map_err(|e| LifecycleError::LogFilter(e.to_string()))?;
        self.current = filter.to_string();
        Ok(())
    }
}

/// The running daemon.
pub struct Daemon {
    pub supervisor: DaemonSupervisor,
    config: Config,
    conf: ConfDir,
    timers: Timers,
    signals: SignalStreams,
    control_rx: mpsc::Receiver<ControlMsg>,
    control_tx: mpsc::Sender<ControlMsg>,
    listener_task: JoinHandle<()>,
    log: LogControl,
}

/// Bring the daemon up: signals, configuration, control socket, and the
/// startup event.
pub fn startup(config: Config, log: LogControl) -> Result<Daemon, LifecycleError> {
    if !config.user_mode {
        crate::signals::install_crash_handler();
    }
    let signals = SignalStreams::install()?;

    let mut supervisor =
        Supervisor::new(UnixProcesses, SysPtracer::default(), SystemClock);

    let conf = ConfDir::new(&config.conf_dir);
    match conf.load() {
        Ok(classes) => {
            info!(count = classes.len(), dir = %config.conf_dir.display(), "job classes loaded");
            supervisor.apply_config(classes);
        }
        Err(error) => {
            warn!(%error, "starting with no job configuration");
        }
    }

    let (control_tx, control_rx) = mpsc::channel(64);
    let socket = listener::bind_socket(&config.socket_path)?;
    let listener_task = tokio::spawn(listener::run(socket, control_tx.clone()));

    if config.restart {
        info!("restarted; suppressing startup event");
    } else {
        supervisor.emit_startup();
    }

    Ok(Daemon {
        supervisor,
        config,
        conf,
        timers: Timers::new(),
        signals,
        control_rx,
        control_tx,
        listener_task,
        log,
    })
}

impl Daemon {
    /// The main loop. Runs until the control channel is torn down, which
    /// does not happen in normal operation; pid 1 does not exit.
    pub async fn run(mut self) {
        info!("vigil running");
        loop {
            tokio::select! {
                biased;

                signal = self.signals.recv() => self.on_signal(signal),

                Some(msg) = self.control_rx.recv() => self.on_control(msg),

                key = self.timers.expired() => match key {
                    TimerKey::Kill(handle) => self.supervisor.on_kill_timeout(&handle),
                },
            }

            self.supervisor.pump();
            for op in self.supervisor.take_timer_ops() {
                self.timers.apply(op);
            }
        }
    }

    fn on_signal(&mut self, signal: SupervisorSignal) {
        match signal {
            SupervisorSignal::Child => {
                for (pid, event) in reap() {
                    self.supervisor.on_child_event(pid, event);
                }
            }
            SupervisorSignal::ReconnectControl => self.rebind_control(),
            SupervisorSignal::Reload => {
                if let Some(name) = signal.event_name() {
                    self.supervisor.emit(EventSeed::new(name));
                }
                self.reload_config();
            }
            other => {
                if let Some(name) = other.event_name() {
                    info!(event = name, "signal mapped to event");
                    self.supervisor.emit(EventSeed::new(name));
                }
            }
        }
    }

    fn on_control(&mut self, msg: ControlMsg) {
        match self.supervisor.handle_control(msg.request, msg.reply) {
            ControlVerdict::Done => {}
            ControlVerdict::Reload(reply) => {
                self.reload_config();
                let _ = reply.send(Response::Ok);
            }
            ControlVerdict::GetLogPriority(reply) => {
                let _ = reply
                    .send(Response::LogPriority { priority: self.log.get().to_string() });
            }
            ControlVerdict::SetLogPriority(priority, reply) => {
                let response = match self.log.set(&priority) {
                    Ok(()) => Response::LogPriority { priority },
                    Err(error) => Response::error(error.to_string()),
                };
                let _ = reply.send(response);
            }
        }
    }

    fn reload_config(&mut self) {
        match self.conf.load() {
            Ok(classes) => {
                info!(count = classes.len(), "configuration reloaded");
                self.supervisor.apply_config(classes);
            }
            Err(error) => warn!(%error, "configuration reload failed"),
        }
    }

    /// `SIGUSR1`: tear the control socket down and bind it afresh.
    fn rebind_control(&mut self) {
        self.listener_task.abort();
        match listener::bind_socket(&self.config.socket_path) {
            Ok(socket) => {
                info!("control socket re-bound");
                self.listener_task =
                    tokio::spawn(listener::run(socket, self.control_tx.clone()));
            }
            Err(error) => warn!(%error, "failed to re-bind control socket"),
        }
    }
}
