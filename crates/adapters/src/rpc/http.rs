// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the runtime's Unix socket API.
//!
//! Sends HTTP/1.1 requests over Unix domain sockets. Reads responses using
//! Content-Length framing (does not depend on connection close for EOF).

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use super::RpcError;

/// Raw HTTP response: status code and body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issue one request over the socket with a deadline covering connect,
/// write, and read. Prevents hangs when the runtime accepts the
/// connection but never responds.
pub async fn request(
    socket_path: &Path,
    method: &str,
    path: &str,
    body: Option<&str>,
    deadline: Duration,
) -> Result<HttpResponse, RpcError> {
    let raw = match body {
        Some(body) => format!(
            "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            method,
            path,
            body.len(),
            body
        ),
        None => format!("{} {} HTTP/1.1\r\nHost: localhost\r\n\r\n", method, path),
    };

    tokio::time::timeout(deadline, send_request(socket_path, &raw))
        .await
        .map_err(|_| RpcError::Timeout { elapsed: deadline })?
}

async fn send_request(socket_path: &Path, raw: &str) -> Result<HttpResponse, RpcError> {
    let mut stream =
        UnixStream::connect(socket_path).await.map_err(|e| RpcError::transport("connect", e))?;
    stream.write_all(raw.as_bytes()).await.map_err(|e| RpcError::transport("write", e))?;

    let mut reader = BufReader::new(&mut stream);
    read_http_response(&mut reader).await
}

/// Read and parse an HTTP/1.1 response from a buffered stream.
pub(crate) async fn read_http_response<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<HttpResponse, RpcError> {
    // Read status line
    let mut status_line = String::new();
    reader.read_line(&mut status_line).await.map_err(|e| RpcError::transport("read status", e))?;
    if status_line.is_empty() {
        return Err(RpcError::Protocol("empty response".into()));
    }

    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| RpcError::Protocol(format!("bad status line: {}", status_line.trim())))?;

    // Read headers, extract Content-Length (case-insensitive)
    let mut content_length: usize = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(|e| RpcError::transport("read header", e))?;
        if line == "\r\n" || line.is_empty() {
            break;
        }
        let line_lower = line.to_ascii_lowercase();
        if let Some(val) = line_lower.strip_prefix("content-length:") {
            content_length = val.trim().parse().unwrap_or(0);
        }
    }

    // Read body
    let body = if content_length > 0 {
        let mut buf = vec![0u8; content_length];
        reader.read_exact(&mut buf).await.map_err(|e| RpcError::transport("read body", e))?;
        String::from_utf8_lossy(&buf).into_owned()
    } else {
        String::new()
    };

    Ok(HttpResponse { status, body })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
