// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exec-based RPC fallback.
//!
//! When the host-side socket client fails with a retryable transport error
//! but the container is known to be up, the same request is replayed by
//! executing a short inline script inside the container against the same
//! socket. This crosses host/container socket-propagation quirks (the bind
//! mount can go stale on some storage drivers while in-container access
//! still works). Request and response schema are reused verbatim.

use std::time::Duration;

use tokio::process::Command;

use super::http::HttpResponse;
use super::RpcError;

/// Container ids accepted by the fallback: lowercase hex, length 12–64.
/// Enforced before anything is passed to `docker exec`.
pub fn is_valid_container_id(id: &str) -> bool {
    (12..=64).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Replay a request inside the container via `docker exec`.
///
/// The inline script talks to the canonical in-container socket with curl
/// and appends the HTTP status code on a trailing line so the response can
/// be reframed into the same shape the socket client returns.
pub async fn exec_request(
    container_id: &str,
    socket_path_in_container: &str,
    method: &str,
    path: &str,
    body: Option<&str>,
    deadline: Duration,
) -> Result<HttpResponse, RpcError> {
    if !is_valid_container_id(container_id) {
        return Err(RpcError::Protocol(format!(
            "refusing exec fallback: invalid container id {:?}",
            holon_core::short(container_id, 16)
        )));
    }

    let script = format!(
        "curl -sS -X {method} --unix-socket {sock} -H 'Content-Type: application/json' \
         --data-binary @- -w '\\n%{{http_code}}' 'http://localhost{path}'",
        method = method,
        sock = socket_path_in_container,
        path = path,
    );

    let mut cmd = Command::new("docker");
    cmd.args(["exec", "-i", container_id, "sh", "-c", &script]);
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| RpcError::transport("docker exec spawn", e))?;
    if let Some(mut stdin) = child.stdin.take() {
        use tokio::io::AsyncWriteExt;
        let payload = body.unwrap_or("").as_bytes().to_vec();
        tokio::spawn(async move {
            let _ = stdin.write_all(&payload).await;
        });
    }

    let output = tokio::time::timeout(deadline, child.wait_with_output())
        .await
        .map_err(|_| RpcError::Timeout { elapsed: deadline })?
        .map_err(|e| RpcError::transport("docker exec", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RpcError::Protocol(format!("exec fallback failed: {}", stderr.trim())));
    }

    parse_exec_output(&String::from_utf8_lossy(&output.stdout))
}

/// Split curl's `-w '\n%{http_code}'` output into body and status.
pub(crate) fn parse_exec_output(raw: &str) -> Result<HttpResponse, RpcError> {
    let (body, status_line) = raw
        .rsplit_once('\n')
        .ok_or_else(|| RpcError::Protocol("exec fallback produced no status line".into()))?;
    let status: u16 = status_line
        .trim()
        .parse()
        .map_err(|_| RpcError::Protocol(format!("bad exec status line: {:?}", status_line.trim())))?;
    Ok(HttpResponse { status, body: body.to_string() })
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
