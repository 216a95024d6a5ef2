// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Command dispatch and output rendering.

use crate::client::Client;
use crate::Command;
use anyhow::bail;
use vigil_daemon::protocol::{JobStatus, JobSummary, Request, Response};

pub async fn run(client: &mut Client, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Start { job, env, no_wait } => {
            client
                .expect_ok(Request::Start { name: job.clone(), env, wait: !no_wait })
                .await?;
            println!("{job} start");
            Ok(())
        }

        Command::Stop { job, env, no_wait } => {
            client
                .expect_ok(Request::Stop { name: job.clone(), env, wait: !no_wait })
                .await?;
            println!("{job} stop");
            Ok(())
        }

        Command::Restart { job, env, no_wait } => {
            client
                .expect_ok(Request::Restart { name: job.clone(), env, wait: !no_wait })
                .await?;
            println!("{job} restart");
            Ok(())
        }

        Command::Emit { event, env, wait } => {
            client.expect_ok(Request::Emit { name: event, env, wait }).await?;
            Ok(())
        }

        Command::List => {
            match client.expect_ok(Request::List).await? {
                Response::List { jobs } => {
                    for job in jobs {
                        println!("{}", summary_line(&job));
                    }
                }
                other => bail!("unexpected reply: {other:?}"),
            }
            Ok(())
        }

        Command::Status { job } => {
            match client.expect_ok(Request::Status { name: job }).await? {
                Response::Status { job } => print_status(&job),
                other => bail!("unexpected reply: {other:?}"),
            }
            Ok(())
        }

        Command::ReloadConfiguration => {
            client.expect_ok(Request::ReloadConfiguration).await?;
            Ok(())
        }

        Command::LogPriority { priority } => {
            let request = match priority {
                Some(priority) => Request::SetLogPriority { priority },
                None => Request::GetLogPriority,
            };
            match client.expect_ok(request).await? {
                Response::LogPriority { priority } => println!("{priority}"),
                other => bail!("unexpected reply: {other:?}"),
            }
            Ok(())
        }

        Command::Version => {
            match client.expect_ok(Request::Version).await? {
                Response::Version { version, protocol } => {
                    println!("vigil {version} (protocol {protocol})");
                }
                other => bail!("unexpected reply: {other:?}"),
            }
            Ok(())
        }

        Command::Ping => {
            client.expect_ok(Request::Ping).await?;
            println!("pong");
            Ok(())
        }
    }
}

/// `name (instance) goal/state, process pid` in initctl's flavour.
fn summary_line(job: &JobSummary) -> String {
    let mut line = job.class.clone();
    if !job.instance.is_empty() {
        line.push_str(&format!(" ({})", job.instance));
    }
    line.push_str(&format!(" {}/{}", job.goal, job.state));
    if let Some(pid) = job.pid {
        line.push_str(&format!(", process {pid}"));
    }
    line
}

fn print_status(job: &JobStatus) {
    println!("{}", job.class);
    if let Some(description) = &job.description {
        println!("  description: {description}");
    }
    if let Some(start_on) = &job.start_on {
        println!("  start on: {start_on}");
    }
    if let Some(stop_on) = &job.stop_on {
        println!("  stop on: {stop_on}");
    }
    if job.instances.is_empty() {
        println!("  stopped");
    }
    for inst in &job.instances {
        let name = if inst.instance.is_empty() { "(default)" } else { &inst.instance };
        let failed = if inst.failed { " [failed]" } else { "" };
        println!("  {name}: {}/{}{failed}", inst.goal, inst.state);
        for (process, pid) in &inst.pids {
            println!("    {process} process {pid}");
        }
    }
}
