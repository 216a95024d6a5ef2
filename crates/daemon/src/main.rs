// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! vigild: process-1 supervisor daemon.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use vigil_daemon::lifecycle::{self, Config, LogControl};

#[derive(Debug, Parser)]
#[command(name = "vigild", version, about = "vigil supervisor daemon")]
struct Args {
    /// Run as an unprivileged user daemon instead of init.
    #[arg(long)]
    user: bool,

    /// Re-exec path: suppress the startup event.
    #[arg(long)]
    restart: bool,

    /// Directory of job definitions.
    #[arg(long)]
    confdir: Option<PathBuf>,

    /// Control socket path.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Log filter (tracing syntax, e.g. "info" or "vigil_daemon=debug").
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            // clap would exit 2; init's contract is exit 1 on bad arguments.
            let _ = error.print();
            return ExitCode::from(1);
        }
    };

    let mut config = if args.user { Config::user() } else { Config::system() };
    config.restart = args.restart;
    if let Some(confdir) = args.confdir {
        config.conf_dir = confdir;
    }
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    if !config.user_mode {
        if !nix::unistd::Uid::effective().is_root() {
            eprintln!("vigild: must be run as root");
            return ExitCode::from(1);
        }
        if std::process::id() != 1 {
            eprintln!("vigild: not process 1; use --user for a test instance");
            return ExitCode::from(1);
        }
    }

    let log = match LogControl::init(&args.log) {
        Ok(log) => log,
        Err(error) => {
            eprintln!("vigild: {error}");
            return ExitCode::from(1);
        }
    };

    // One thread of control: every handler runs to completion before the
    // next stimulus is dispatched.
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("vigild: failed to start runtime: {error}");
            return ExitCode::from(1);
        }
    };

    runtime.block_on(async {
        match lifecycle::startup(config, log) {
            Ok(daemon) => {
                daemon.run().await;
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("vigild: {error}");
                ExitCode::from(1)
            }
        }
    })
}
