// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Control-socket listener.
//!
//! Accepts connections on the daemon's Unix socket and relays requests into
//! the main loop over a channel; each request carries a oneshot for its
//! reply. Requests with `wait` set are answered only when the supervisor
//! resolves the registered waiter, so slow replies never block the loop or
//! other connections.

use crate::protocol::{self, Request, Response};
use std::path::Path;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// A request in flight from a connection to the main loop.
pub struct ControlMsg {
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

/// Bind the control socket, replacing any stale one.
pub fn bind_socket(path: &Path) -> std::io::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(path)?;
    info!(socket = %path.display(), "control socket bound");
    Ok(listener)
}

/// Accept connections until the listener is dropped.
pub async fn run(listener: UnixListener, requests: mpsc::Sender<ControlMsg>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let requests = requests.clone();
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(stream, requests).await {
                        match error {
                            protocol::ProtocolError::Closed => {
                                debug!("control connection closed");
                            }
                            other => debug!(error = %other, "control connection error"),
                        }
                    }
                });
            }
            Err(error) => {
                error!(%error, "control accept failed");
                return;
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    requests: mpsc::Sender<ControlMsg>,
) -> Result<(), protocol::ProtocolError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let request: Request = protocol::read_message(&mut reader).await?;
        debug!(?request, "control request");

        let (reply_tx, reply_rx) = oneshot::channel();
        if requests.send(ControlMsg { request, reply: reply_tx }).await.is_err() {
            // Main loop is gone; nothing sensible to answer.
            return Ok(());
        }

        let response = match reply_rx.await {
            Ok(response) => response,
            // The waiter was dropped without an answer (shutdown path).
            Err(_) => Response::error("request abandoned"),
        };
        protocol::write_message(&mut write_half, &response).await?;
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
