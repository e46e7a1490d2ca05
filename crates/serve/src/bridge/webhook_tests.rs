// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bridge::test_support::CollectingSink;
use tokio::io::AsyncReadExt;

async fn start_server(sink: Arc<CollectingSink>) -> (std::net::SocketAddr, CancellationToken) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = serve_on(listener, sink as Arc<dyn EnvelopeSink>, run_cancel).await;
    });
    (addr, cancel)
}

async fn send(addr: std::net::SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn post_events_accepts_envelopes() {
    let sink = CollectingSink::new();
    let (addr, cancel) = start_server(sink.clone()).await;

    let body = "{\"id\":\"e1\",\"source\":\"github\",\"type\":\"issues.opened\",\"at\":\"2026-01-01T00:00:00Z\"}";
    let request = format!(
        "POST /events HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    let response = send(addr, &request).await;
    assert!(response.starts_with("HTTP/1.1 202 Accepted"), "got: {response}");
    assert_eq!(sink.ids(), vec!["e1"]);
    cancel.cancel();
}

#[tokio::test]
async fn invalid_body_is_rejected() {
    let sink = CollectingSink::new();
    let (addr, cancel) = start_server(sink.clone()).await;

    let request =
        "POST /events HTTP/1.1\r\nHost: localhost\r\nContent-Length: 8\r\n\r\nnot-json";
    let response = send(addr, request).await;
    assert!(response.starts_with("HTTP/1.1 400"), "got: {response}");
    assert!(sink.ids().is_empty());
    cancel.cancel();
}

#[tokio::test]
async fn healthz_responds_ok() {
    let sink = CollectingSink::new();
    let (addr, cancel) = start_server(sink).await;
    let response = send(addr, "GET /healthz HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "got: {response}");
    cancel.cancel();
}

#[tokio::test]
async fn unknown_path_is_404() {
    let sink = CollectingSink::new();
    let (addr, cancel) = start_server(sink).await;
    let response = send(addr, "GET /nope HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"), "got: {response}");
    cancel.cancel();
}
