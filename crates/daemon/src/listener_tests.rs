// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use tokio::io::BufReader;

#[tokio::test]
async fn requests_are_relayed_and_replies_returned() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("vigil.sock");
    let listener = bind_socket(&socket).unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    tokio::spawn(run(listener, tx));

    // A trivial "daemon": answer every request with Ok.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            assert_eq!(msg.request, Request::Ping);
            let _ = msg.reply.send(Response::Ok);
        }
    });

    let stream = UnixStream::connect(&socket).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    protocol::write_message(&mut write_half, &Request::Ping).await.unwrap();
    let response: Response = protocol::read_message(&mut reader).await.unwrap();
    assert_eq!(response, Response::Ok);

    // The connection stays usable for a second round trip.
    protocol::write_message(&mut write_half, &Request::Ping).await.unwrap();
    let response: Response = protocol::read_message(&mut reader).await.unwrap();
    assert_eq!(response, Response::Ok);
}

#[tokio::test]
async fn bind_replaces_stale_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("vigil.sock");
    std::fs::write(&socket, b"stale").unwrap();
    let _listener = bind_socket(&socket).unwrap();
    assert!(socket.exists());
}

#[tokio::test]
async fn abandoned_reply_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("vigil.sock");
    let listener = bind_socket(&socket).unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    tokio::spawn(run(listener, tx));

    // Drop the reply sender without answering.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            drop(msg.reply);
        }
    });

    let stream = UnixStream::connect(&socket).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    protocol::write_message(&mut write_half, &Request::Ping).await.unwrap();
    let response: Response = protocol::read_message(&mut reader).await.unwrap();
    assert!(response.is_error());
}
