// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Controller lifecycle: keeps exactly one healthy runtime session alive.
//!
//! `ensure` is idempotent under a lock: a live handle is reused, an exited
//! one is discarded and rebuilt. Building stages the runtime input
//! directory via atomic rename, seeds the goal-state and permission
//! settings files, starts the session, and commits the handle only after
//! the runtime answers its health probe.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use holon_adapters::rpc::{self, RuntimeClient};
use holon_adapters::runner::{
    RunnerError, RunnerExit, SessionConfig, SessionHandle, SessionRunner, CONTAINER_HOME,
    CONTAINER_INPUT, CONTAINER_OUTPUT, CONTAINER_SOCKET, CONTAINER_STATE, CONTAINER_WORKSPACE,
};
use holon_core::{Clock, Role};

use crate::home::AgentHome;
use crate::storage::{ControllerSessionRecord, DurableSlot, GoalState, StorageError};

/// Trigger ref used for warmup, before any external event arrives.
pub const WARMUP_REF: &str = "local/rpc#0";

/// In-container mount point for a dev agent source tree.
pub const CONTAINER_AGENT_SRC: &str = "/holon/agent-src";

/// Which runtime flavor the controller boots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RuntimeMode {
    #[default]
    Prod,
    Dev,
}

holon_core::simple_display! {
    RuntimeMode {
        Prod => "prod",
        Dev => "dev",
    }
}

impl RuntimeMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prod" => Some(Self::Prod),
            "dev" => Some(Self::Dev),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("runtime not ready: {0}")]
    NotReady(holon_adapters::rpc::RpcError),

    #[error("state error: {0}")]
    Storage(#[from] StorageError),

    #[error("input staging failed: {0}")]
    Staging(std::io::Error),

    #[error("shutting down")]
    ShuttingDown,
}

/// Configuration fixed for the lifetime of the controller manager.
pub struct ControllerConfig {
    pub image: String,
    pub runtime_mode: RuntimeMode,
    pub dev_agent_source: Option<PathBuf>,
    pub role: Role,
    pub ready_timeout: Duration,
}

/// Builds an RPC client for a freshly started session.
pub type ClientFactory = Box<dyn Fn(&AgentHome) -> Arc<dyn RuntimeClient> + Send + Sync>;

/// A committed, health-checked runtime session.
pub struct ControllerHandle {
    pub session: SessionHandle,
    pub client: Arc<dyn RuntimeClient>,
    pub socket_path: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Becomes `Some(exit)` when the container exits.
    pub done: watch::Receiver<Option<RunnerExit>>,
}

impl ControllerHandle {
    /// Whether the session has produced an exit value.
    pub fn exited(&self) -> Option<RunnerExit> {
        self.done.borrow().clone()
    }
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("socket_path", &self.socket_path)
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

/// Owns the single runtime session for an agent home.
pub struct ControllerManager<C: Clock> {
    home: AgentHome,
    runner: Arc<dyn SessionRunner>,
    client_factory: ClientFactory,
    config: ControllerConfig,
    clock: C,
    state: tokio::sync::Mutex<Option<Arc<ControllerHandle>>>,
    restart_attempts: AtomicU32,
    session_slot: DurableSlot,
    shutdown: CancellationToken,
}

impl<C: Clock> ControllerManager<C> {
    pub fn new(
        home: AgentHome,
        runner: Arc<dyn SessionRunner>,
        client_factory: ClientFactory,
        config: ControllerConfig,
        clock: C,
        shutdown: CancellationToken,
    ) -> Self {
        let session_slot = DurableSlot::new(home.session_record_path());
        Self {
            home,
            runner,
            client_factory,
            config,
            clock,
            state: tokio::sync::Mutex::new(None),
            restart_attempts: AtomicU32::new(0),
            session_slot,
            shutdown,
        }
    }

    /// Successful session starts so far (warmup counts as the first).
    pub fn restart_attempts(&self) -> u32 {
        self.restart_attempts.load(Ordering::SeqCst)
    }

    /// Return the live handle, building one if absent or exited.
    pub async fn ensure(&self, trigger_ref: &str) -> Result<Arc<ControllerHandle>, ControllerError> {
        let mut state = self.state.lock().await;

        if let Some(handle) = state.as_ref() {
            match handle.exited() {
                None => return Ok(Arc::clone(handle)),
                Some(exit) => {
                    tracing::warn!(%exit, "runtime session exited unexpectedly, rebuilding");
                    *state = None;
                }
            }
        }

        if self.shutdown.is_cancelled() {
            return Err(ControllerError::ShuttingDown);
        }

        let handle = self.build(trigger_ref).await?;
        *state = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// The live handle, if one is committed and not exited.
    pub async fn current(&self) -> Option<Arc<ControllerHandle>> {
        let state = self.state.lock().await;
        state.as_ref().filter(|h| h.exited().is_none()).map(Arc::clone)
    }

    /// Tear down the current session (if any) and build a fresh one.
    /// Used after a retryable transport failure.
    pub async fn rebuild(&self, trigger_ref: &str) -> Result<Arc<ControllerHandle>, ControllerError> {
        {
            let mut state = self.state.lock().await;
            if let Some(handle) = state.take() {
                if let Err(e) = self.runner.stop(&handle.session).await {
                    tracing::warn!(error = %e, "failed to stop session during rebuild");
                }
            }
        }
        self.ensure(trigger_ref).await
    }

    /// Stop the current session, if any. Called on shutdown.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(handle) = state.take() {
            if let Err(e) = self.runner.stop(&handle.session).await {
                tracing::warn!(error = %e, "failed to stop runtime session");
            }
        }
    }

    /// Pre-warm the runtime so the first external event finds it hot.
    ///
    /// Best-effort mode logs the failure and continues; the next dispatch
    /// will retry the build. A failed warmup does not touch the restart
    /// counter (only committed handles do).
    pub async fn warmup(&self, budget: Duration, best_effort: bool) -> Result<(), ControllerError> {
        let outcome = tokio::time::timeout(budget, self.ensure(WARMUP_REF)).await;
        match outcome {
            Ok(Ok(_)) => {
                tracing::info!("runtime warmup complete");
                Ok(())
            }
            Ok(Err(e)) if best_effort => {
                tracing::warn!(error = %e, "runtime warmup failed (best-effort, continuing)");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) if best_effort => {
                tracing::warn!(budget_s = budget.as_secs(), "runtime warmup timed out (best-effort, continuing)");
                Ok(())
            }
            Err(_) => Err(ControllerError::NotReady(rpc::RpcError::Timeout { elapsed: budget })),
        }
    }

    async fn build(&self, trigger_ref: &str) -> Result<Arc<ControllerHandle>, ControllerError> {
        self.clear_stale_socket().await;
        self.seed_goal_state()?;
        self.write_permission_settings()?;
        let input_dir = self.stage_input(trigger_ref).map_err(ControllerError::Staging)?;
        let output_dir = self.home.runtime_output_dir();

        let session_config = SessionConfig::new(
            format!("holon-{}", self.home.agent_id),
            self.config.image.clone(),
            self.home.root().to_path_buf(),
        )
        .workspace_dir(self.home.workspaces_dir())
        .input_dir(input_dir.clone())
        .output_dir(output_dir.clone())
        .state_dir(self.home.controller_state_dir())
        .env(self.runtime_env())
        .extra_mounts(self.extra_mounts());

        let session = self.runner.start(session_config).await?;
        let client = (self.client_factory)(&self.home);
        client.set_container_id(Some(session.container_id.clone()));

        let (done_tx, done_rx) = watch::channel(None);
        let handle = Arc::new(ControllerHandle {
            session,
            client,
            socket_path: self.home.socket_path(),
            input_dir,
            output_dir,
            done: done_rx,
        });

        self.spawn_exit_waiter(Arc::clone(&handle), done_tx);

        if let Err(e) =
            rpc::wait_ready(handle.client.as_ref(), self.config.ready_timeout, &self.shutdown).await
        {
            if let Err(stop_err) = self.runner.stop(&handle.session).await {
                tracing::warn!(error = %stop_err, "failed to stop unready session");
            }
            return Err(ControllerError::NotReady(e));
        }

        let attempts = self.restart_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.session_slot.write(&ControllerSessionRecord {
            container_id: handle.session.container_id.clone(),
            container_name: handle.session.name.clone(),
            socket_path: self.home.socket_path().display().to_string(),
            restart_attempts: attempts,
            started_at: self.clock.utc_now().to_rfc3339(),
        })?;

        tracing::info!(
            trigger_ref,
            restart_attempts = attempts,
            container_id = holon_core::short(&handle.session.container_id, 12),
            "runtime session committed"
        );
        Ok(handle)
    }

    fn spawn_exit_waiter(&self, handle: Arc<ControllerHandle>, done_tx: watch::Sender<Option<RunnerExit>>) {
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            match runner.wait(&handle.session).await {
                Ok(exit) => {
                    if exit.is_success() {
                        tracing::info!(%exit, "runtime session finished");
                    } else {
                        tracing::warn!(%exit, "runtime session exited abnormally");
                    }
                    let _ = done_tx.send(Some(exit));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "runtime session wait failed");
                    let _ = done_tx.send(Some(RunnerExit {
                        exit_code: -1,
                        oom_killed: false,
                        finished_at: None,
                    }));
                }
            }
        });
    }

    /// A socket file left behind by a dead runtime blocks the new bind.
    /// Probe it with a short dial; remove it when nothing answers.
    async fn clear_stale_socket(&self) {
        let socket = self.home.socket_path();
        if !socket.exists() {
            return;
        }
        let alive = tokio::time::timeout(
            Duration::from_millis(500),
            tokio::net::UnixStream::connect(&socket),
        )
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
        if !alive {
            tracing::info!(path = %socket.display(), "removing stale runtime socket");
            if let Err(e) = std::fs::remove_file(&socket) {
                tracing::warn!(error = %e, "failed to remove stale socket");
            }
        }
    }

    /// Seed the goal-state file if absent.
    fn seed_goal_state(&self) -> Result<(), StorageError> {
        let slot = DurableSlot::new(self.home.goal_state_path());
        if slot.read::<GoalState>()?.is_none() {
            slot.write(&GoalState::initial(self.clock.utc_now().to_rfc3339()))?;
        }
        Ok(())
    }

    /// Permission settings: an allow-list of in-container tools with
    /// workspace-scoped globs.
    fn write_permission_settings(&self) -> Result<(), StorageError> {
        let slot = DurableSlot::new(self.home.claude_config_dir().join("settings.json"));
        slot.write(&serde_json::json!({
            "permissions": {
                "allow": [
                    format!("Read({}/**)", CONTAINER_WORKSPACE),
                    format!("Edit({}/**)", CONTAINER_WORKSPACE),
                    format!("Write({}/**)", CONTAINER_WORKSPACE),
                    format!("Read({}/**)", CONTAINER_INPUT),
                    format!("Write({}/**)", CONTAINER_OUTPUT),
                    "Bash(git:*)",
                    "Bash(gh:*)",
                ],
                "deny": [],
            }
        }))
    }

    fn runtime_env(&self) -> Vec<(String, String)> {
        vec![
            ("HOLON_HOME".into(), CONTAINER_HOME.into()),
            ("HOLON_WORKSPACE_ROOT".into(), CONTAINER_WORKSPACE.into()),
            ("HOLON_INPUT_DIR".into(), CONTAINER_INPUT.into()),
            ("HOLON_OUTPUT_DIR".into(), CONTAINER_OUTPUT.into()),
            ("HOLON_STATE_DIR".into(), CONTAINER_STATE.into()),
            ("HOLON_SOCKET_PATH".into(), CONTAINER_SOCKET.into()),
            ("HOLON_ROLE".into(), self.config.role.to_string()),
            ("HOLON_RUNTIME_MODE".into(), self.config.runtime_mode.to_string()),
        ]
    }

    fn extra_mounts(&self) -> Vec<(PathBuf, String)> {
        match (&self.config.runtime_mode, &self.config.dev_agent_source) {
            (RuntimeMode::Dev, Some(source)) => {
                vec![(source.clone(), CONTAINER_AGENT_SRC.to_string())]
            }
            _ => Vec::new(),
        }
    }

    /// Stage the runtime input directory under a `.tmp` sibling, then
    /// atomically rename it over `input`.
    fn stage_input(&self, trigger_ref: &str) -> std::io::Result<PathBuf> {
        let input = self.home.runtime_input_dir();
        let tmp = input.with_extension("tmp");

        if tmp.exists() {
            std::fs::remove_dir_all(&tmp)?;
        }
        std::fs::create_dir_all(tmp.join("prompts"))?;

        // Carry controller memory forward when present.
        let memory = self.home.controller_memory_path();
        if memory.exists() {
            std::fs::copy(&memory, tmp.join("controller-memory.md"))?;
        }

        let spec = SpecFile {
            agent: self.home.agent_id.clone(),
            role: self.config.role.to_string(),
            trigger_ref: trigger_ref.to_string(),
            workspace_root: CONTAINER_WORKSPACE.to_string(),
            socket_path: CONTAINER_SOCKET.to_string(),
        };
        let spec_yaml = serde_yaml::to_string(&spec).map_err(std::io::Error::other)?;
        std::fs::write(tmp.join("spec.yaml"), spec_yaml)?;

        std::fs::write(tmp.join("prompts/system.md"), system_prompt(&self.config.role))?;
        std::fs::write(tmp.join("prompts/user.md"), user_prompt(trigger_ref))?;

        let workflow = serde_json::json!({
            "trigger_ref": trigger_ref,
            "goal_hint": format!("respond to {}", trigger_ref),
        });
        std::fs::write(tmp.join("workflow.json"), serde_json::to_vec_pretty(&workflow)?)?;

        if input.exists() {
            std::fs::remove_dir_all(&input)?;
        }
        std::fs::rename(&tmp, &input)?;
        Ok(input)
    }
}

#[derive(Serialize)]
struct SpecFile {
    agent: String,
    role: String,
    trigger_ref: String,
    workspace_root: String,
    socket_path: String,
}

fn system_prompt(role: &Role) -> String {
    format!(
        "You are the {} controller for this agent home.\n\
         Work inside {} and write results to {}.\n",
        role, CONTAINER_WORKSPACE, CONTAINER_OUTPUT
    )
}

fn user_prompt(trigger_ref: &str) -> String {
    format!("Handle the pending work for {}.\n", trigger_ref)
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
