// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Connection to the daemon's control socket.

use anyhow::{bail, Context};
use std::path::PathBuf;
use tokio::io::BufReader;
use tokio::net::{unix, UnixStream};
use vigil_daemon::protocol::{read_message, write_message, Request, Response};

pub struct Client {
    reader: BufReader<unix::OwnedReadHalf>,
    writer: unix::OwnedWriteHalf,
}

impl Client {
    /// Connect, preferring an explicit path, then `$VIGIL_SOCKET`, then the
    /// system and per-user sockets.
    pub async fn connect(socket: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = socket
            .or_else(|| std::env::var_os("VIGIL_SOCKET").map(PathBuf::from))
            .or_else(default_socket)
            .context("no control socket path; is vigild running?")?;

        let stream = UnixStream::connect(&path)
            .await
            .with_context(|| format!("cannot connect to {}", path.display()))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self { reader: BufReader::new(read_half), writer: write_half })
    }

    /// One request/reply round trip. Protocol errors become failures;
    /// `Error` replies are surfaced to the caller to interpret.
    pub async fn request(&mut self, request: Request) -> anyhow::Result<Response> {
        write_message(&mut self.writer, &request).await?;
        let response = read_message(&mut self.reader).await?;
        Ok(response)
    }

    /// Round trip that treats an `Error` reply as failure.
    pub async fn expect_ok(&mut self, request: Request) -> anyhow::Result<Response> {
        match self.request(request).await? {
            Response::Error { message } => bail!("{message}"),
            response => Ok(response),
        }
    }
}

fn default_socket() -> Option<PathBuf> {
    let system = PathBuf::from("/run/vigil.sock");
    if system.exists() {
        return Some(system);
    }
    let user = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("vigil.sock");
    user.exists().then_some(user)
}
