// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serve lifecycle: startup ordering, ingress selection, graceful shutdown.
//!
//! Startup order: lock the agent home, load the role, recover durable
//! state, start the pump, warm the runtime (unless lazy), write the
//! diagnostics snapshot, then open ingress. Shutdown drains the pump,
//! stops the runtime session, and releases the lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use holon_adapters::rpc::{RpcClient, RuntimeClient};
use holon_adapters::runner::{DockerSessionRunner, CONTAINER_SOCKET};
use holon_core::SystemClock;

pub use crate::controller::RuntimeMode;

use crate::bridge::stdin::StdinFileSource;
use crate::bridge::subscription::{load_subscriptions, SubscriptionSource};
use crate::bridge::tick::TickSource;
use crate::bridge::webhook::WebhookSource;
use crate::bridge::{BridgeError, EnvelopeSource};
use crate::controller::{ControllerConfig, ControllerError, ControllerManager};
use crate::diagnostics::{DevAgentSource, StartupDiagnostics};
use crate::dispatch::Dispatcher;
use crate::env;
use crate::handler::{spawn_sources, ServeHandler, TracingAckSink, TurnRegistry};
use crate::home::{AgentHome, HomeError};
use crate::ledger::{ActivityLedger, DesktopActivitySink};
use crate::scheduler::{run_pump, SessionScheduler};
use crate::storage::{DurableSlot, StorageError, TurnEventIndex};
use crate::workspaces::WorkspaceResolver;

/// Fatal serve errors. All map to a non-zero exit.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Home(#[from] HomeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The enumerated options record for `serve` (flag parsing is the CLI's
/// job; this is the contract it fills in).
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub agent_id: String,
    /// Agent home root; default `~/.holon/agents/<agent-id>`.
    pub agent_home: Option<PathBuf>,
    /// Repo hint recorded in diagnostics alongside subscriptions.
    pub repo: Option<String>,
    /// Stdin/file mode: `-` for stdin, otherwise a path.
    pub input: Option<String>,
    /// Name of the default session; `main` when unset.
    pub session: Option<String>,
    pub no_default_session: bool,
    /// Skip warmup; the first event boots the runtime.
    pub lazy_runtime: bool,
    pub runtime_warmup_timeout: Duration,
    pub runtime_warmup_best_effort: bool,
    pub max_events: Option<u64>,
    pub dry_run: bool,
    pub tick_interval: Option<Duration>,
    pub log_level: Option<String>,
    pub runtime_mode: RuntimeMode,
    pub runtime_dev_agent_source: Option<PathBuf>,
    pub webhook_port: Option<u16>,
    pub no_subscriptions: bool,
    /// Runtime image override; `HOLON_RUNTIME_IMAGE` or the default.
    pub runtime_image: Option<String>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            agent_id: "default".into(),
            agent_home: None,
            repo: None,
            input: None,
            session: None,
            no_default_session: false,
            lazy_runtime: false,
            runtime_warmup_timeout: Duration::from_secs(120),
            runtime_warmup_best_effort: false,
            max_events: None,
            dry_run: false,
            tick_interval: None,
            log_level: None,
            runtime_mode: RuntimeMode::Prod,
            runtime_dev_agent_source: None,
            webhook_port: None,
            no_subscriptions: false,
            runtime_image: None,
        }
    }
}

impl ServeOptions {
    pub fn home_root(&self) -> PathBuf {
        self.agent_home
            .clone()
            .unwrap_or_else(|| env::default_agent_root().join(&self.agent_id))
    }

    fn resolved_image(&self) -> String {
        self.runtime_image
            .clone()
            .or_else(env::runtime_image)
            .unwrap_or_else(|| "holon-runtime:latest".into())
    }

    fn input_mode(&self) -> &'static str {
        if self.input.is_some() {
            "stdin-file"
        } else if self.no_subscriptions {
            "webhook-legacy"
        } else {
            "subscription"
        }
    }
}

/// Run the serve controller to completion.
///
/// Returns `Ok(())` on clean shutdown; fatal initialization errors map to
/// a non-zero process exit in `main`.
pub async fn run(options: ServeOptions) -> Result<(), ServeError> {
    let home = AgentHome::open(options.agent_id.clone(), options.home_root())?;
    let lock = home.lock()?;
    let role = home.load_role()?;
    tracing::info!(
        agent_id = %home.agent_id,
        home = %home.root().display(),
        %role,
        "agent home locked"
    );

    let clock = SystemClock;
    let shutdown = CancellationToken::new();

    // Durable state recovered before any dispatch.
    let index = Arc::new(TurnEventIndex::load(home.turn_index_path())?);
    if !index.is_empty() {
        tracing::info!(entries = index.len(), "recovered turn-event index");
    }
    let ledger =
        Arc::new(ActivityLedger::new(home.ledger_path(), Arc::new(DesktopActivitySink)));

    // Scheduler and turn registry.
    let (scheduler, pump_rx) =
        SessionScheduler::new(clock.clone(), env::concurrency(), env::max_queued_turns());
    let registry = Arc::new(TurnRegistry::new(clock.clone(), Arc::new(TracingAckSink)));

    // Runtime adapters.
    let socket_path = home.socket_path();
    let controller = Arc::new(ControllerManager::new(
        home.clone(),
        Arc::new(DockerSessionRunner::new()),
        Box::new(move |_home: &AgentHome| {
            Arc::new(RpcClient::new(socket_path.clone(), CONTAINER_SOCKET)) as Arc<dyn RuntimeClient>
        }),
        ControllerConfig {
            image: options.resolved_image(),
            runtime_mode: options.runtime_mode,
            dev_agent_source: options.runtime_dev_agent_source.clone(),
            role,
            ready_timeout: env::rpc_ready_timeout(),
        },
        clock.clone(),
        shutdown.clone(),
    ));

    let workspaces = if options.dry_run {
        WorkspaceResolver::new(home.workspaces_dir()).without_dir_creation()
    } else {
        WorkspaceResolver::new(home.workspaces_dir())
    };
    let dispatcher = Arc::new(Dispatcher::new(
        clock.clone(),
        Arc::clone(&controller),
        workspaces,
        Arc::clone(&registry),
        Arc::clone(&index),
        Arc::clone(&ledger),
        options.dry_run,
        shutdown.clone(),
    ));

    let handler = ServeHandler::new(
        clock.clone(),
        scheduler,
        registry,
        dispatcher,
        index,
        Arc::clone(&ledger),
        env::followup_policy(),
    );

    // Start the pump before warmup so warmup-era events queue normally.
    let pump = {
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            run_pump(pump_rx, move |item| Arc::clone(&handler).work(item)).await;
        })
    };

    // Materialize the default session entry.
    if !options.no_default_session {
        let key = options.session.as_deref().unwrap_or("main");
        let mutex = handler.scheduler().checkout(key);
        drop(mutex);
        handler.scheduler().release(key);
        tracing::debug!(session = key, "default session ready");
    }

    // Warmup (skipped when lazy or dry-run).
    if !options.lazy_runtime && !options.dry_run {
        controller
            .warmup(options.runtime_warmup_timeout, options.runtime_warmup_best_effort)
            .await?;
    }

    // Diagnostics snapshot, then ingress.
    let diagnostics = build_diagnostics(&options, &home, role)?;
    diagnostics.write(&DurableSlot::new(home.diagnostics_path()))?;

    let sources = build_sources(&options, &home);
    let stdin_mode = options.input.is_some();
    // Ingress has its own cancel scope: closing intake must not abort
    // in-flight dispatches before the drain completes.
    let ingress_cancel = CancellationToken::new();
    let source_tasks = spawn_sources(&handler, sources, &ingress_cancel);

    let mut failure: Option<ServeError> = None;
    if stdin_mode {
        // The stdin/file source is primary: EOF (or max-events) ends the
        // service after a full drain. Auxiliary sources (ticks) are
        // cancelled once it finishes.
        let mut tasks = source_tasks.into_iter();
        if let Some(primary) = tasks.next() {
            match primary.await {
                Ok(Ok(name)) => tracing::info!(source = name, "source finished"),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "ingress source failed");
                    failure = Some(e.into());
                }
                Err(e) => tracing::error!(error = %e, "ingress task panicked"),
            }
        }
        ingress_cancel.cancel();
        for task in tasks {
            let _ = task.await;
        }
        if failure.is_none() {
            handler.wait_idle().await;
        }
    } else {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received, shutting down");
            }
            _ = terminate_signal() => {
                tracing::info!("terminate received, shutting down");
            }
            _ = shutdown.cancelled() => {}
        }
        ingress_cancel.cancel();
        for task in source_tasks {
            let _ = task.await;
        }
        handler.wait_idle().await;
    }

    // Graceful shutdown: stop intake, drain, stop the runtime, unlock.
    shutdown.cancel();
    handler.close();
    pump.await.ok();
    controller.stop().await;
    lock.release();
    match failure {
        Some(e) => Err(e),
        None => {
            tracing::info!("serve shutdown complete");
            Ok(())
        }
    }
}

/// Resolve when SIGTERM arrives (pends forever where unsupported).
async fn terminate_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}

fn build_sources(options: &ServeOptions, home: &AgentHome) -> Vec<Box<dyn EnvelopeSource>> {
    let mut sources: Vec<Box<dyn EnvelopeSource>> = Vec::new();

    if let Some(ref input) = options.input {
        let path = if input == "-" { None } else { Some(PathBuf::from(input)) };
        sources.push(Box::new(StdinFileSource { path, max_events: options.max_events }));
    } else if options.no_subscriptions {
        if let Some(port) = options.webhook_port {
            sources.push(Box::new(WebhookSource { port }));
        }
    } else {
        sources.push(Box::new(SubscriptionSource {
            agent_home: home.root().to_path_buf(),
            webhook_port: options.webhook_port,
        }));
    }

    if let Some(interval) = options.tick_interval {
        sources.push(Box::new(TickSource { interval }));
    }

    sources
}

fn build_diagnostics(
    options: &ServeOptions,
    home: &AgentHome,
    role: holon_core::Role,
) -> Result<StartupDiagnostics, ServeError> {
    let mut diagnostics = StartupDiagnostics {
        agent_id: home.agent_id.clone(),
        agent_home: home.root().display().to_string(),
        state_dir: home.state_dir().display().to_string(),
        workspace_root: home.workspaces_dir().display().to_string(),
        config_paths: vec![home.role_path().display().to_string()],
        role: role.to_string(),
        input_mode: options.input_mode().to_string(),
        subscription_reason: None,
        subscribed_repos: Vec::new(),
        tick_interval_s: options.tick_interval.map(|d| d.as_secs()),
        webhook_port: options.webhook_port,
        runtime_mode: options.runtime_mode.to_string(),
        dev_agent_source: options.runtime_dev_agent_source.as_ref().map(|path| DevAgentSource {
            path: path.display().to_string(),
            origin: "flag".into(),
        }),
        runtime_mounts: vec![
            format!("{} -> /holon/home", home.root().display()),
            format!("{} -> /holon/workspace", home.workspaces_dir().display()),
        ],
        preview: format!("serve {} ({})", home.agent_id, options.input_mode()),
        warnings: Vec::new(),
    };

    match options.input_mode() {
        "subscription" => {
            let subscriptions_path = home.root().join("subscriptions.json");
            diagnostics.config_paths.push(subscriptions_path.display().to_string());
            match load_subscriptions(home.root()) {
                Ok(subscriptions) => {
                    diagnostics.subscription_reason = subscriptions
                        .iter()
                        .map(|s| s.reason.clone())
                        .find(|reason| !reason.is_empty());
                    diagnostics.subscribed_repos =
                        subscriptions.into_iter().map(|s| s.repo).collect();
                }
                Err(e) => diagnostics.warn(format!("subscriptions unreadable: {}", e)),
            }
            if let Some(ref repo) = options.repo {
                if !diagnostics.subscribed_repos.contains(repo) {
                    diagnostics.subscribed_repos.push(repo.clone());
                }
            }
            if options.webhook_port.is_none() {
                diagnostics
                    .warn("subscription mode without a webhook port is passive (ticks only)");
            }
        }
        "webhook-legacy" => {
            diagnostics.warn("webhook legacy mode is deprecated; prefer subscriptions");
            if options.webhook_port.is_none() {
                diagnostics.warn("webhook legacy mode without --webhook-port receives nothing");
            }
        }
        _ => {}
    }

    if options.dry_run {
        diagnostics.warn("dry-run: events are routed and resolved but never dispatched");
    }
    if options.lazy_runtime {
        diagnostics.warn("lazy runtime: first event pays the warmup cost");
    }
    if let Some(ref source) = options.runtime_dev_agent_source {
        if options.runtime_mode != RuntimeMode::Dev {
            diagnostics.warn(format!(
                "dev agent source {} ignored outside --runtime-mode dev",
                source.display()
            ));
        }
    }

    Ok(diagnostics)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
