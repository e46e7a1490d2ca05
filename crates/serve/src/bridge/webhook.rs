// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Legacy webhook ingress: a plain HTTP listener accepting normalized
//! envelopes. Kept for backwards compatibility; signature verification and
//! payload normalization happen upstream, so the body here is already an
//! envelope.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use holon_core::envelope::EventEnvelope;

use super::{feed, BridgeError, EnvelopeSink, EnvelopeSource};

/// Plain HTTP listener on `127.0.0.1:<port>`.
pub struct WebhookSource {
    pub port: u16,
}

#[async_trait]
impl EnvelopeSource for WebhookSource {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn run(
        self: Box<Self>,
        sink: Arc<dyn EnvelopeSink>,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(|source| BridgeError::Bind { port: self.port, source })?;
        tracing::info!(port = self.port, "webhook listener up");
        serve_on(listener, sink, cancel).await
    }
}

/// Accept loop over an already-bound listener.
pub(crate) async fn serve_on(
    listener: TcpListener,
    sink: Arc<dyn EnvelopeSink>,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    loop {
        let (stream, _addr) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        if !handle_connection(stream, &sink).await {
            return Ok(());
        }
    }
}

/// Serve one connection; returns false when the sink is closed.
async fn handle_connection(mut stream: TcpStream, sink: &Arc<dyn EnvelopeSink>) -> bool {
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "bad webhook request");
            let _ = respond(&mut stream, 400, "{\"error\":\"bad request\"}").await;
            return true;
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/events") => match serde_json::from_str::<EventEnvelope>(&request.body) {
            Ok(envelope) => {
                let accepted = feed(sink, "webhook", envelope).await;
                let _ = respond(&mut stream, 202, "{\"status\":\"accepted\"}").await;
                accepted
            }
            Err(e) => {
                tracing::warn!(error = %e, "webhook body is not an envelope");
                let _ = respond(&mut stream, 400, "{\"error\":\"invalid envelope\"}").await;
                true
            }
        },
        ("GET", "/healthz") => {
            let _ = respond(&mut stream, 200, "{\"status\":\"ok\"}").await;
            true
        }
        _ => {
            let _ = respond(&mut stream, 404, "{\"error\":\"not found\"}").await;
            true
        }
    }
}

struct Request {
    method: String,
    path: String,
    body: String,
}

/// Minimal HTTP/1.1 request parse with Content-Length framing.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Request> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();
    if method.is_empty() || path.is_empty() {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "bad request line"));
    }

    let mut content_length: usize = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        if line == "\r\n" || line == "\n" || line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }

    let body = if content_length > 0 {
        let mut buf = vec![0u8; content_length];
        reader.read_exact(&mut buf).await?;
        String::from_utf8_lossy(&buf).into_owned()
    } else {
        String::new()
    };

    Ok(Request { method, path, body })
}

async fn respond(stream: &mut TcpStream, status: u16, body: &str) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
