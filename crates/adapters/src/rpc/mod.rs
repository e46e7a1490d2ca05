// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC channel to the in-container runtime.
//!
//! Transport is HTTP over a Unix-domain socket reflected on the host, with
//! an exec-based fallback for hosts where the socket bind mount goes stale
//! (see [`exec`]). The [`RuntimeClient`] trait is the seam the dispatcher
//! programs against; [`RpcClient`] is the production implementation.

pub(crate) mod exec;
pub(crate) mod http;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use holon_core::EventEnvelope;

/// Default deadline for a single RPC request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Cadence of readiness probes.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Per-probe deadline during readiness polling.
pub const READY_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// How often the readiness loop logs progress.
pub const READY_LOG_EVERY: Duration = Duration::from_secs(10);

/// Errors from the RPC channel.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{context} failed: {source}")]
    Transport {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("request canceled")]
    Canceled,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("bad response JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    pub(crate) fn transport(context: &str, source: std::io::Error) -> Self {
        Self::Transport { context: context.to_string(), source }
    }

    /// Whether this failure warrants a runtime reconnect.
    ///
    /// Transport-level connect failures (socket missing, refused, reset,
    /// broken pipe) always do. Cancels and deadlines count only when the
    /// outer caller's context is not itself cancelled: a cancelled caller
    /// is shutting down, not observing a sick runtime.
    pub fn is_retryable(&self, outer_cancelled: bool) -> bool {
        use std::io::ErrorKind;
        match self {
            Self::Transport { source, .. } => matches!(
                source.kind(),
                ErrorKind::NotFound
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::BrokenPipe
            ),
            Self::Timeout { .. } | Self::Canceled => !outer_cancelled,
            _ => false,
        }
    }

    /// True for the 404 responses the status/cancel endpoints use to say
    /// "no such event".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }
}

/// Response shape shared by every runtime endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl RuntimeResponse {
    fn from_body(body: &str) -> Result<Self, RpcError> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(body)?)
    }
}

/// Request body for `POST /v1/runtime/events`.
#[derive(Serialize)]
struct PostEventBody<'a> {
    event: &'a EventEnvelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_key: Option<&'a str>,
}

/// Channel the dispatcher uses to reach the runtime.
#[async_trait]
pub trait RuntimeClient: Send + Sync + 'static {
    /// Record the backing container id (enables transports with an
    /// exec fallback; others ignore it).
    fn set_container_id(&self, _id: Option<String>) {}

    /// `POST /v1/runtime/events`.
    async fn post_event(
        &self,
        envelope: &EventEnvelope,
        session_key: Option<&str>,
    ) -> Result<RuntimeResponse, RpcError>;

    /// `GET /v1/runtime/events/{event_id}`.
    async fn event_status(&self, event_id: &str) -> Result<RuntimeResponse, RpcError>;

    /// `DELETE /v1/runtime/events/{event_id}?reason=…`.
    async fn cancel_event(&self, event_id: &str, reason: &str)
        -> Result<RuntimeResponse, RpcError>;

    /// `GET /health`, bounded by the probe deadline.
    async fn health(&self) -> Result<(), RpcError>;
}

/// Production RPC client: Unix socket first, exec fallback second.
pub struct RpcClient {
    socket_path: PathBuf,
    /// Canonical socket path inside the container, used by the fallback.
    container_socket: String,
    container_id: Mutex<Option<String>>,
    request_timeout: Duration,
}

impl RpcClient {
    pub fn new(socket_path: PathBuf, container_socket: impl Into<String>) -> Self {
        Self {
            socket_path,
            container_socket: container_socket.into(),
            container_id: Mutex::new(None),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<&str>,
        deadline: Duration,
    ) -> Result<RuntimeResponse, RpcError> {
        let first = http::request(&self.socket_path, method, path, body, deadline).await;

        let response = match first {
            Ok(response) => response,
            Err(err) if err.is_retryable(false) => {
                let container_id = self.container_id.lock().clone();
                match container_id {
                    Some(id) if exec::is_valid_container_id(&id) => {
                        tracing::debug!(
                            error = %err,
                            container_id = holon_core::short(&id, 12),
                            "socket transport failed, replaying via exec fallback"
                        );
                        exec::exec_request(&id, &self.container_socket, method, path, body, deadline)
                            .await?
                    }
                    _ => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        if !response.is_success() {
            return Err(RpcError::Http { status: response.status, body: response.body });
        }
        RuntimeResponse::from_body(&response.body)
    }
}

#[async_trait]
impl RuntimeClient for RpcClient {
    fn set_container_id(&self, id: Option<String>) {
        *self.container_id.lock() = id;
    }

    async fn post_event(
        &self,
        envelope: &EventEnvelope,
        session_key: Option<&str>,
    ) -> Result<RuntimeResponse, RpcError> {
        let body = serde_json::to_string(&PostEventBody { event: envelope, session_key })?;
        self.request("POST", "/v1/runtime/events", Some(&body), self.request_timeout).await
    }

    async fn event_status(&self, event_id: &str) -> Result<RuntimeResponse, RpcError> {
        let path = format!("/v1/runtime/events/{}", event_id);
        self.request("GET", &path, None, self.request_timeout).await
    }

    async fn cancel_event(
        &self,
        event_id: &str,
        reason: &str,
    ) -> Result<RuntimeResponse, RpcError> {
        let path = format!("/v1/runtime/events/{}?reason={}", event_id, percent_encode(reason));
        self.request("DELETE", &path, None, self.request_timeout).await
    }

    async fn health(&self) -> Result<(), RpcError> {
        self.request("GET", "/health", None, READY_PROBE_TIMEOUT).await.map(|_| ())
    }
}

/// Poll the runtime's health endpoint until it responds, the budget runs
/// out, or the caller cancels. Logs elapsed time every 10 s so slow
/// bootstraps are visible.
pub async fn wait_ready(
    client: &dyn RuntimeClient,
    budget: Duration,
    cancel: &CancellationToken,
) -> Result<(), RpcError> {
    let started = tokio::time::Instant::now();
    let mut last_log = started;

    loop {
        if cancel.is_cancelled() {
            return Err(RpcError::Canceled);
        }
        match client.health().await {
            Ok(()) => {
                tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "runtime ready");
                return Ok(());
            }
            Err(err) => {
                if started.elapsed() >= budget {
                    tracing::warn!(error = %err, "runtime failed to become ready in time");
                    return Err(RpcError::Timeout { elapsed: budget });
                }
                if last_log.elapsed() >= READY_LOG_EVERY {
                    last_log = tokio::time::Instant::now();
                    tracing::info!(
                        elapsed_s = started.elapsed().as_secs(),
                        budget_s = budget.as_secs(),
                        "waiting for runtime readiness"
                    );
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(RpcError::Canceled),
            _ = tokio::time::sleep(READY_POLL_INTERVAL) => {}
        }
    }
}

/// Minimal percent-encoding for query string values.
fn percent_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
