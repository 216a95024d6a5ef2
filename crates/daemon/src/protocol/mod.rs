// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Control protocol: newline-delimited JSON over the daemon's Unix socket.

mod request;
mod response;

pub use request::Request;
pub use response::{InstanceStatus, JobStatus, JobSummary, Response};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Bumped whenever a request or response changes incompatibly.
pub const PROTOCOL_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    Closed,

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol version mismatch: daemon {daemon}, client {client}")]
    VersionMismatch { daemon: String, client: String },
}

/// Read one JSON message from a buffered reader.
pub async fn read_message<R, T>(reader: &mut BufReader<R>) -> Result<T, ProtocolError>
where
    R: tokio::io::AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ProtocolError::Closed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Write one JSON message followed by a newline.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
