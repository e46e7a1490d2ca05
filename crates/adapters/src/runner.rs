// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session runner — runs the agent runtime in a sandboxed Docker container.
//!
//! The runner binds the agent home, workspace, input, output, and state
//! directories at canonical in-container paths, resolves and pulls the
//! runtime image when absent, and streams the container's demultiplexed
//! stdout/stderr to the host's. The Docker CLI is used for container
//! lifecycle (run, wait, inspect, stop, rm).

use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::Command;

use crate::subprocess::{self, DOCKER_PULL_TIMEOUT, DOCKER_QUERY_TIMEOUT, DOCKER_TIMEOUT};

/// Canonical in-container mount points.
pub const CONTAINER_HOME: &str = "/holon/home";
pub const CONTAINER_WORKSPACE: &str = "/holon/workspace";
pub const CONTAINER_INPUT: &str = "/holon/input";
pub const CONTAINER_OUTPUT: &str = "/holon/output";
pub const CONTAINER_STATE: &str = "/holon/state";

/// Canonical in-container RPC socket path (under the agent-home mount).
pub const CONTAINER_SOCKET: &str = "/holon/home/run/agent.sock";

/// Errors from session runner operations.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("image unavailable: {0}")]
    ImageUnavailable(String),
    #[error("start failed: {0}")]
    StartFailed(String),
    #[error("wait failed: {0}")]
    WaitFailed(String),
    #[error("stop failed: {0}")]
    StopFailed(String),
}

/// Configuration for starting a runtime session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Container name (deterministic per agent so stale containers can be
    /// found and removed).
    pub name: String,
    /// Runtime image reference.
    pub image: String,
    pub agent_home: PathBuf,
    pub workspace_dir: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub state_dir: PathBuf,
    /// Environment passed into the container.
    pub env: Vec<(String, String)>,
    /// Additional host→container binds (e.g. a dev agent source).
    pub extra_mounts: Vec<(PathBuf, String)>,
    /// Snapshot directory created by the runner itself; owned by the
    /// handle and removed in the cleanup path. Handler-provided
    /// workspaces are never removed.
    pub snapshot_dir: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>, image: impl Into<String>, agent_home: PathBuf) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            workspace_dir: agent_home.join("workspaces"),
            input_dir: agent_home.join("state/controller-runtime/input"),
            output_dir: agent_home.join("state/controller-runtime/output"),
            state_dir: agent_home.join("state/controller-state"),
            agent_home,
            env: Vec::new(),
            extra_mounts: Vec::new(),
            snapshot_dir: None,
        }
    }

    holon_core::setters! {
        set {
            workspace_dir: PathBuf,
            input_dir: PathBuf,
            output_dir: PathBuf,
            state_dir: PathBuf,
            env: Vec<(String, String)>,
            extra_mounts: Vec<(PathBuf, String)>,
        }
        option {
            snapshot_dir: PathBuf,
        }
    }
}

/// Structured exit information from a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerExit {
    pub exit_code: i64,
    pub oom_killed: bool,
    /// Container finish time as reported by the engine, when available.
    pub finished_at: Option<String>,
}

impl RunnerExit {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

impl std::fmt::Display for RunnerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exit code {}", self.exit_code)?;
        if self.oom_killed {
            write!(f, " (OOM killed)")?;
        }
        if let Some(ref at) = self.finished_at {
            write!(f, " at {}", at)?;
        }
        Ok(())
    }
}

/// Handle to a running session.
pub struct SessionHandle {
    pub container_id: String,
    pub name: String,
    snapshot_dir: Option<PathBuf>,
    logs: Mutex<Option<tokio::process::Child>>,
}

impl SessionHandle {
    /// Snapshot directory owned by this handle, if the runner created one.
    pub fn owned_snapshot(&self) -> Option<&PathBuf> {
        self.snapshot_dir.as_ref()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl SessionHandle {
    /// Construct a handle without a backing container (fakes).
    pub fn for_tests(container_id: String, name: String) -> Self {
        Self { container_id, name, snapshot_dir: None, logs: Mutex::new(None) }
    }
}

/// Starts, waits on, and stops sandboxed runtime sessions.
#[async_trait]
pub trait SessionRunner: Send + Sync + 'static {
    /// Start a session and return once the container is running.
    async fn start(&self, config: SessionConfig) -> Result<SessionHandle, RunnerError>;

    /// Block until the session exits, returning structured exit info
    /// (exit code plus OOM and finish-time diagnostics when available).
    async fn wait(&self, handle: &SessionHandle) -> Result<RunnerExit, RunnerError>;

    /// Graceful stop with a fixed timeout, then force-remove. Not-found
    /// errors on either step are tolerated.
    async fn stop(&self, handle: &SessionHandle) -> Result<(), RunnerError>;
}

/// Session runner backed by the Docker CLI.
#[derive(Clone, Default)]
pub struct DockerSessionRunner;

impl DockerSessionRunner {
    pub fn new() -> Self {
        Self
    }

    /// Pull the image if it is not already present locally.
    async fn ensure_image(&self, image: &str) -> Result<(), RunnerError> {
        if run_docker(&["image", "inspect", image], DOCKER_QUERY_TIMEOUT).await.is_ok() {
            return Ok(());
        }
        tracing::info!(%image, "runtime image absent, pulling");
        run_docker(&["pull", image], DOCKER_PULL_TIMEOUT)
            .await
            .map_err(RunnerError::ImageUnavailable)?;
        Ok(())
    }
}

#[async_trait]
impl SessionRunner for DockerSessionRunner {
    async fn start(&self, config: SessionConfig) -> Result<SessionHandle, RunnerError> {
        self.ensure_image(&config.image).await?;

        // A stale container with the same name blocks `docker run`.
        if let Err(e) = run_docker(&["rm", "-f", &config.name], DOCKER_TIMEOUT).await {
            if !is_not_found(&e) {
                tracing::debug!(name = %config.name, error = %e, "pre-start container cleanup");
            }
        }

        let args = docker_run_args(&config);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let container_id = run_docker(&arg_refs, DOCKER_TIMEOUT)
            .await
            .map_err(RunnerError::StartFailed)?;

        // `docker run -d` returns after create; confirm RUNNING before
        // handing the session back.
        let mut running = false;
        for _ in 0..50 {
            match run_docker(
                &["inspect", "-f", "{{.State.Running}}", &container_id],
                DOCKER_QUERY_TIMEOUT,
            )
            .await
            {
                Ok(state) if state == "true" => {
                    running = true;
                    break;
                }
                Ok(_) => tokio::time::sleep(std::time::Duration::from_millis(200)).await,
                Err(e) => return Err(RunnerError::StartFailed(e)),
            }
        }
        if !running {
            let _ = run_docker(&["rm", "-f", &container_id], DOCKER_TIMEOUT).await;
            return Err(RunnerError::StartFailed(format!(
                "container {} did not reach RUNNING",
                config.name
            )));
        }

        // Stream demultiplexed container output to the host's stdio.
        let mut logs_cmd = Command::new("docker");
        logs_cmd
            .args(["logs", "-f", &container_id])
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit());
        let logs = logs_cmd.spawn().ok();

        tracing::info!(
            name = %config.name,
            container_id = holon_core::short(&container_id, 12),
            "runtime session started"
        );

        Ok(SessionHandle {
            container_id,
            name: config.name,
            snapshot_dir: config.snapshot_dir,
            logs: Mutex::new(logs),
        })
    }

    async fn wait(&self, handle: &SessionHandle) -> Result<RunnerExit, RunnerError> {
        let mut cmd = Command::new("docker");
        cmd.args(["wait", &handle.container_id]);
        let output = cmd.output().await.map_err(|e| RunnerError::WaitFailed(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RunnerError::WaitFailed(stderr.trim().to_string()));
        }

        let exit_code: i64 =
            String::from_utf8_lossy(&output.stdout).trim().parse().unwrap_or(-1);

        // Best-effort diagnostics; the exit code alone is still useful.
        let (oom_killed, finished_at) = match run_docker(
            &["inspect", "-f", "{{.State.OOMKilled}} {{.State.FinishedAt}}", &handle.container_id],
            DOCKER_QUERY_TIMEOUT,
        )
        .await
        {
            Ok(raw) => parse_exit_diagnostics(&raw),
            Err(_) => (false, None),
        };

        Ok(RunnerExit { exit_code, oom_killed, finished_at })
    }

    async fn stop(&self, handle: &SessionHandle) -> Result<(), RunnerError> {
        if let Err(e) = run_docker(&["stop", "-t", "10", &handle.container_id], DOCKER_TIMEOUT).await
        {
            if !is_not_found(&e) {
                tracing::warn!(name = %handle.name, error = %e, "graceful stop failed");
            }
        }
        if let Err(e) = run_docker(&["rm", "-f", &handle.container_id], DOCKER_TIMEOUT).await {
            if !is_not_found(&e) {
                return Err(RunnerError::StopFailed(e));
            }
        }

        if let Some(mut logs) = handle.logs.lock().take() {
            let _ = logs.start_kill();
        }

        if let Some(ref snapshot) = handle.snapshot_dir {
            if let Err(e) = tokio::fs::remove_dir_all(snapshot).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %snapshot.display(), error = %e, "snapshot cleanup failed");
                }
            }
        }

        Ok(())
    }
}

/// Assemble the `docker run` argument list for a session.
fn docker_run_args(config: &SessionConfig) -> Vec<String> {
    let mut args: Vec<String> =
        vec!["run".into(), "-d".into(), "--name".into(), config.name.clone()];

    let mounts = [
        (&config.agent_home, CONTAINER_HOME),
        (&config.workspace_dir, CONTAINER_WORKSPACE),
        (&config.input_dir, CONTAINER_INPUT),
        (&config.output_dir, CONTAINER_OUTPUT),
        (&config.state_dir, CONTAINER_STATE),
    ];
    for (host, container) in mounts {
        args.push("-v".into());
        args.push(format!("{}:{}", host.display(), container));
    }
    for (host, container) in &config.extra_mounts {
        args.push("-v".into());
        args.push(format!("{}:{}", host.display(), container));
    }

    for (key, value) in &config.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }

    args.push("-w".into());
    args.push(CONTAINER_WORKSPACE.into());
    args.push(config.image.clone());
    args
}

/// Parse `docker inspect -f '{{.State.OOMKilled}} {{.State.FinishedAt}}'`.
fn parse_exit_diagnostics(raw: &str) -> (bool, Option<String>) {
    let mut parts = raw.split_whitespace();
    let oom = parts.next() == Some("true");
    let finished_at = parts.next().filter(|s| !s.starts_with("0001-")).map(str::to_string);
    (oom, finished_at)
}

/// Whether a docker error message is a tolerable "not found".
fn is_not_found(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("no such container") || lower.contains("no such object")
}

/// Run a docker CLI command and return trimmed stdout on success.
async fn run_docker(args: &[&str], timeout: std::time::Duration) -> Result<String, String> {
    let mut cmd = Command::new("docker");
    cmd.args(args);
    let description = format!("docker {}", args.first().unwrap_or(&""));
    let output = subprocess::run_with_timeout(cmd, timeout, &description).await?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("{} failed: {}", description, stderr.trim()))
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
