// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use tokio::io::BufReader;

#[tokio::test]
async fn message_roundtrip_over_duplex() {
    let (client, server) = tokio::io::duplex(1024);
    let (server_read, _server_write) = tokio::io::split(server);
    let (_client_read, mut client_write) = tokio::io::split(client);

    write_message(&mut client_write, &Request::Ping).await.unwrap();
    let mut reader = BufReader::new(server_read);
    let request: Request = read_message(&mut reader).await.unwrap();
    assert_eq!(request, Request::Ping);
}

#[tokio::test]
async fn closed_connection_reports_closed() {
    let (client, server) = tokio::io::duplex(64);
    drop(client);
    let (server_read, _server_write) = tokio::io::split(server);
    let mut reader = BufReader::new(server_read);
    let result: Result<Request, _> = read_message(&mut reader).await;
    assert!(matches!(result, Err(ProtocolError::Closed)));
}

#[tokio::test]
async fn malformed_json_is_an_error() {
    let (client, server) = tokio::io::duplex(64);
    let (server_read, _sw) = tokio::io::split(server);
    let (_cr, mut client_write) = tokio::io::split(client);
    use tokio::io::AsyncWriteExt;
    client_write.write_all(b"not json\n").await.unwrap();
    let mut reader = BufReader::new(server_read);
    let result: Result<Request, _> = read_message(&mut reader).await;
    assert!(matches!(result, Err(ProtocolError::Malformed(_))));
}
