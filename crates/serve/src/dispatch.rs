// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-event dispatch: the turn state machine's runtime-facing half.
//!
//! Each event is enriched with its workspace, posted to the runtime, and
//! polled to a terminal status with progress acks along the way. Transport
//! failures get one reconnect (stop, rebuild, restart, re-wait) before
//! surfacing; every dispatched envelope ends in exactly one ledger record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use holon_adapters::rpc::{RpcError, RuntimeResponse};
use holon_core::envelope::EventEnvelope;
use holon_core::{detect_action, Clock, EventOutcomeRecord, OutcomeStatus, TurnStatus};

use crate::controller::{ControllerError, ControllerHandle, ControllerManager};
use crate::env;
use crate::handler::TurnRegistry;
use crate::ledger::ActivityLedger;
use crate::storage::{StorageError, TurnEventIndex};
use crate::workspaces::{ResolvedWorkspace, WorkspaceError, WorkspaceResolver};

/// Initial status poll delay; backs off ×1.5 up to the cap.
const POLL_INITIAL: Duration = Duration::from_millis(300);
const POLL_BACKOFF_FACTOR: f64 = 1.5;
const POLL_CAP: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed event that should not be retried (e.g. a non-numeric
    /// subject id on a non-synthetic source).
    #[error("skipping event: {0}")]
    Skip(String),

    #[error("event deadline exceeded")]
    DeadlineExceeded,

    #[error("dispatch canceled")]
    Canceled,

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("runtime reported failure: {0}")]
    RuntimeFailed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DispatchError {
    /// Ledger status for this failure.
    pub fn outcome_status(&self) -> OutcomeStatus {
        match self {
            Self::Skip(_) => OutcomeStatus::Skipped,
            Self::DeadlineExceeded | Self::Canceled => OutcomeStatus::Interrupted,
            _ => OutcomeStatus::Failed,
        }
    }
}

/// Seam between the handler's workers and the dispatch logic.
#[async_trait]
pub trait EventDispatcher: Send + Sync + 'static {
    /// Dispatch one envelope to its terminal outcome, recording it in the
    /// activity ledger. Never panics; failures are isolated per event.
    async fn dispatch(&self, envelope: EventEnvelope);

    /// DELETE the event on the runtime (interrupt protocol step 4).
    async fn cancel_on_runtime(
        &self,
        event_id: &str,
        reason: &str,
    ) -> Result<RuntimeResponse, RpcError>;
}

/// What a successful dispatch produced.
struct DispatchOutcome {
    status: OutcomeStatus,
    message: String,
    action: Option<String>,
}

/// Production dispatcher.
pub struct Dispatcher<C: Clock> {
    clock: C,
    controller: Arc<ControllerManager<C>>,
    workspaces: WorkspaceResolver,
    registry: Arc<TurnRegistry<C>>,
    index: Arc<TurnEventIndex>,
    ledger: Arc<ActivityLedger>,
    dry_run: bool,
    shutdown: CancellationToken,
}

impl<C: Clock> Dispatcher<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: C,
        controller: Arc<ControllerManager<C>>,
        workspaces: WorkspaceResolver,
        registry: Arc<TurnRegistry<C>>,
        index: Arc<TurnEventIndex>,
        ledger: Arc<ActivityLedger>,
        dry_run: bool,
        shutdown: CancellationToken,
    ) -> Self {
        Self { clock, controller, workspaces, registry, index, ledger, dry_run, shutdown }
    }

    async fn run(&self, envelope: &mut EventEnvelope) -> Result<DispatchOutcome, DispatchError> {
        let resolved = self.workspaces.resolve(envelope)?;
        let trigger_ref = build_trigger_ref(envelope, &resolved)?;
        let turn_id = envelope.turn_id().map(str::to_string);

        if self.dry_run {
            if let Some(ref turn_id) = turn_id {
                self.registry.ack_terminal(
                    turn_id,
                    TurnStatus::Completed,
                    "dry-run",
                    &envelope.scope.workspace_ref,
                    &envelope.scope.workspace_path,
                );
            }
            return Ok(DispatchOutcome {
                status: OutcomeStatus::Ok,
                message: "dry-run".into(),
                action: None,
            });
        }

        let deadline = env::event_timeout();
        let token = self.shutdown.child_token();
        if let Some(ref turn_id) = turn_id {
            self.registry.set_cancel_token(turn_id, token.clone());
        }

        let drive = self.drive(envelope, &trigger_ref, turn_id.as_deref());
        tokio::select! {
            _ = token.cancelled() => Err(DispatchError::Canceled),
            _ = tokio::time::sleep(deadline) => Err(DispatchError::DeadlineExceeded),
            result = drive => result,
        }
    }

    /// Post the event and poll it to a terminal status.
    async fn drive(
        &self,
        envelope: &EventEnvelope,
        trigger_ref: &str,
        turn_id: Option<&str>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let session_key = envelope.session_key();
        let mut reconnected = false;
        let mut handle = self.controller.ensure(trigger_ref).await?;

        let response = loop {
            match handle.client.post_event(envelope, Some(session_key.as_str())).await {
                Ok(response) => break response,
                Err(e) if !reconnected && e.is_retryable(self.shutdown.is_cancelled()) => {
                    tracing::warn!(
                        event_id = %envelope.id,
                        error = %e,
                        "post failed on retryable transport error, reconnecting runtime"
                    );
                    reconnected = true;
                    handle = self.controller.rebuild(trigger_ref).await?;
                }
                Err(e) => return Err(e.into()),
            }
        };

        // Terminal straight from POST (completed/failed/interrupted).
        // Anything else, including unknown statuses bucketed to waiting,
        // keeps the dispatcher polling.
        if TurnStatus::normalize(&response.status).is_terminal() {
            return self.finish(envelope, turn_id, &response);
        }

        // Pending: persist the correlation, ack initial progress, poll.
        let runtime_event_id = response.event_id.clone().unwrap_or_default();
        if let Some(turn_id) = turn_id {
            if !runtime_event_id.is_empty() {
                self.index.insert(turn_id, &runtime_event_id)?;
                self.registry.set_event_id(turn_id, &runtime_event_id);
            }
            let status = pending_status(&response.status);
            self.registry.ack_progress(turn_id, status, &progress_message(envelope, Duration::ZERO));
        }

        if runtime_event_id.is_empty() {
            return Err(DispatchError::RuntimeFailed(
                "runtime accepted the event without an event id".into(),
            ));
        }

        self.poll(envelope, trigger_ref, turn_id, &runtime_event_id, handle, reconnected).await
    }

    /// Poll for status with exponential backoff and heartbeat acks.
    async fn poll(
        &self,
        envelope: &EventEnvelope,
        trigger_ref: &str,
        turn_id: Option<&str>,
        event_id: &str,
        mut handle: Arc<ControllerHandle>,
        mut reconnected: bool,
    ) -> Result<DispatchOutcome, DispatchError> {
        let heartbeat = env::turn_progress_heartbeat();
        let started = tokio::time::Instant::now();
        let mut delay = POLL_INITIAL;
        let mut next_poll = started + delay;
        let mut last_ack = started;
        let mut last_status = TurnStatus::Accepted;

        loop {
            let wake = next_poll.min(last_ack + heartbeat);
            tokio::time::sleep_until(wake).await;

            // An interrupt that already acked terminal clears the state;
            // do not revive the dispatch.
            if let Some(turn_id) = turn_id {
                if !self.registry.contains(turn_id) {
                    return Ok(DispatchOutcome {
                        status: OutcomeStatus::Interrupted,
                        message: "interrupted".into(),
                        action: None,
                    });
                }
            }

            let now = tokio::time::Instant::now();
            if now >= next_poll {
                match handle.client.event_status(event_id).await {
                    Ok(response) => {
                        let status = TurnStatus::normalize(&response.status);
                        if status.is_terminal() {
                            return self.finish(envelope, turn_id, &response);
                        }
                        if status != last_status {
                            last_status = status;
                            last_ack = now;
                            if let Some(turn_id) = turn_id {
                                self.registry.ack_progress(
                                    turn_id,
                                    status,
                                    &progress_message(envelope, started.elapsed()),
                                );
                            }
                        }
                    }
                    Err(e) if e.is_not_found() => {
                        return Err(DispatchError::RuntimeFailed(format!(
                            "runtime lost event {}",
                            event_id
                        )));
                    }
                    Err(e) if !reconnected && e.is_retryable(self.shutdown.is_cancelled()) => {
                        tracing::warn!(
                            event_id = %envelope.id,
                            error = %e,
                            "status poll failed, reconnecting runtime and reposting"
                        );
                        reconnected = true;
                        handle = self.controller.rebuild(trigger_ref).await?;
                        // Repost on the new handle; the outcome stays
                        // attributed to the original correlation.
                        let response = handle
                            .client
                            .post_event(envelope, Some(envelope.session_key().as_str()))
                            .await?;
                        if TurnStatus::normalize(&response.status).is_terminal() {
                            return self.finish(envelope, turn_id, &response);
                        }
                    }
                    Err(e) => return Err(e.into()),
                }

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * POLL_BACKOFF_FACTOR).min(POLL_CAP.as_secs_f64()),
                );
                next_poll = now + delay;
            }

            if now.duration_since(last_ack) >= heartbeat {
                last_ack = now;
                if let Some(turn_id) = turn_id {
                    self.registry.ack_progress(
                        turn_id,
                        last_status,
                        &progress_message(envelope, started.elapsed()),
                    );
                }
            }
        }
    }

    /// Emit the terminal ack (for turns) and map the runtime response to
    /// a dispatch outcome.
    fn finish(
        &self,
        envelope: &EventEnvelope,
        turn_id: Option<&str>,
        response: &RuntimeResponse,
    ) -> Result<DispatchOutcome, DispatchError> {
        let status = TurnStatus::normalize(&response.status);
        let message = response.message.clone().unwrap_or_default();

        if status == TurnStatus::Failed {
            return Err(DispatchError::RuntimeFailed(if message.is_empty() {
                "unspecified runtime failure".into()
            } else {
                message
            }));
        }

        if let Some(turn_id) = turn_id {
            let terminal =
                if status.is_terminal() { status } else { TurnStatus::Completed };
            self.registry.ack_terminal(
                turn_id,
                terminal,
                &message,
                &envelope.scope.workspace_ref,
                &envelope.scope.workspace_path,
            );
            if let Err(e) = self.index.remove(turn_id) {
                tracing::warn!(error = %e, "failed to clear turn index entry");
            }
        }

        Ok(DispatchOutcome {
            status: if status == TurnStatus::Interrupted {
                OutcomeStatus::Interrupted
            } else {
                OutcomeStatus::Ok
            },
            message,
            action: response.action.clone(),
        })
    }

    fn record_outcome(&self, envelope: &EventEnvelope, result: &Result<DispatchOutcome, DispatchError>) {
        let (status, message, action) = match result {
            Ok(outcome) => (outcome.status, outcome.message.clone(), outcome.action.clone()),
            Err(e) => (e.outcome_status(), e.to_string(), None),
        };
        let (has_action, action_refs) = detect_action(action.as_deref(), &message);
        let record = EventOutcomeRecord {
            event_id: envelope.id.clone(),
            status,
            has_action,
            action_refs,
            message,
            completed_at: self.clock.utc_now().to_rfc3339(),
        };
        if let Err(e) = self.ledger.record(record) {
            tracing::warn!(error = %e, "failed to append activity ledger");
        }
    }
}

#[async_trait]
impl<C: Clock> EventDispatcher for Dispatcher<C> {
    async fn dispatch(&self, envelope: EventEnvelope) {
        let mut envelope = envelope;
        let turn_id = envelope.turn_id().map(str::to_string);

        let result = self.run(&mut envelope).await;

        if let Err(ref e) = result {
            tracing::warn!(event_id = %envelope.id, error = %e, "dispatch failed");
            // Turn-bearing events always get a terminal ack, even when
            // dispatch blows up. No-op if the turn already acked.
            if let Some(ref turn_id) = turn_id {
                let terminal = match e.outcome_status() {
                    OutcomeStatus::Interrupted => TurnStatus::Interrupted,
                    _ => TurnStatus::Failed,
                };
                self.registry.ack_terminal(
                    turn_id,
                    terminal,
                    &e.to_string(),
                    &envelope.scope.workspace_ref,
                    &envelope.scope.workspace_path,
                );
                if let Err(err) = self.index.remove(turn_id) {
                    tracing::warn!(error = %err, "failed to clear turn index entry");
                }
            }
        }

        self.record_outcome(&envelope, &result);
    }

    async fn cancel_on_runtime(
        &self,
        event_id: &str,
        reason: &str,
    ) -> Result<RuntimeResponse, RpcError> {
        match self.controller.current().await {
            Some(handle) => handle.client.cancel_event(event_id, reason).await,
            None => Err(RpcError::Protocol("no live runtime session".into())),
        }
    }
}

/// Build the trigger ref string: `<owner>/<repo>#<subject id>`.
///
/// Synthetic sources (rpc, timer, serve) use `#0`; a non-numeric subject
/// id on any other source is a skip.
fn build_trigger_ref(
    envelope: &EventEnvelope,
    resolved: &ResolvedWorkspace,
) -> Result<String, DispatchError> {
    let repo = format!("{}/{}", resolved.workspace_ref.owner, resolved.workspace_ref.repo);
    if envelope.is_synthetic() {
        return Ok(format!("{}#0", repo));
    }
    match envelope.numeric_subject_id() {
        Some(id) => Ok(format!("{}#{}", repo, id)),
        None => Err(DispatchError::Skip(format!(
            "subject id {:?} is not numeric for {} event {}",
            envelope.subject.id, envelope.source, envelope.id
        ))),
    }
}

fn pending_status(raw: &str) -> TurnStatus {
    if raw.trim().is_empty() {
        TurnStatus::Queued
    } else {
        TurnStatus::normalize(raw)
    }
}

/// Synthesize a progress message from the event's nature and elapsed time.
fn progress_message(envelope: &EventEnvelope, elapsed: Duration) -> String {
    if elapsed.is_zero() {
        format!("runtime accepted {}", envelope.event_type)
    } else {
        format!("{} in progress ({}s elapsed)", envelope.event_type, elapsed.as_secs())
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
