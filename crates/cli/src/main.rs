// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! vigilctl: control client for the vigil supervisor.

mod client;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "vigilctl", version, about = "Control the vigil supervisor")]
struct Cli {
    /// Daemon control socket (defaults to the system socket, or
    /// $VIGIL_SOCKET).
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a job.
    Start {
        job: String,
        /// Extra KEY=VALUE environment for the job.
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        /// Return immediately instead of waiting for the job to run.
        #[arg(long)]
        no_wait: bool,
    },

    /// Stop a job.
    Stop {
        job: String,
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        #[arg(long)]
        no_wait: bool,
    },

    /// Restart a job.
    Restart {
        job: String,
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        #[arg(long)]
        no_wait: bool,
    },

    /// Emit an event.
    Emit {
        event: String,
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,
        /// Wait for the event to be fully handled.
        #[arg(long)]
        wait: bool,
    },

    /// List known job instances.
    List,

    /// Show one job's configuration and instances.
    Status { job: String },

    /// Re-read the job configuration directory.
    ReloadConfiguration,

    /// Get or set the daemon log priority.
    LogPriority {
        /// New filter; omit to print the current one.
        priority: Option<String>,
    },

    /// Daemon version.
    Version,

    /// Check the daemon is responding.
    Ping,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut client = client::Client::connect(cli.socket).await?;
    commands::run(&mut client, cli.command).await
}
