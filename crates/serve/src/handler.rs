// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serve handler: envelope enqueue, turn registry, acks, and interrupts.
//!
//! The handler fronts the scheduler. Enqueueing a turn registers its
//! dispatch state and emits the initial `queued` ack; workers drain the
//! pump, serialize per session, and hand envelopes to the dispatcher.
//! `interrupt_turn` drives the mid-flight cancellation protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use holon_core::envelope::{EventEnvelope, SessionKey};
use holon_core::{Clock, EventOutcomeRecord, FollowupPolicy, OutcomeStatus, TurnAck, TurnStatus};

use crate::bridge::{EnvelopeSink, EnvelopeSource};
use crate::dedupe::DedupeCache;
use crate::dispatch::EventDispatcher;
use crate::ledger::ActivityLedger;
use crate::scheduler::{EnqueueError, ScheduledItem, SessionScheduler};
use crate::storage::TurnEventIndex;

/// Receives turn acknowledgements for the caller.
pub trait AckSink: Send + Sync + 'static {
    fn emit(&self, ack: TurnAck);
}

/// Log-only ack sink.
pub struct TracingAckSink;

impl AckSink for TracingAckSink {
    fn emit(&self, ack: TurnAck) {
        tracing::info!(
            turn_id = %ack.turn_id,
            status = %ack.status,
            message = %ack.message,
            "turn ack"
        );
    }
}

/// Channel sink for tests and embedding callers.
pub struct ChannelAckSink(pub tokio::sync::mpsc::UnboundedSender<TurnAck>);

impl AckSink for ChannelAckSink {
    fn emit(&self, ack: TurnAck) {
        let _ = self.0.send(ack);
    }
}

/// In-memory dispatch state for one turn.
#[derive(Debug, Clone)]
pub struct TurnDispatchState {
    pub thread_id: String,
    pub session_key: String,
    pub event_id: Option<String>,
    pub status: TurnStatus,
    pub cancel_requested: bool,
    pub cancel_reason: String,
    pub last_updated_ms: u64,
    /// Cancels the dispatcher's wait for this turn.
    pub cancel: Option<CancellationToken>,
}

/// Registry of in-flight turns; emits acks through the sink.
///
/// Terminal acks clear the state; a second terminal ack for the same turn
/// is a silent no-op, which is what makes the "exactly one terminal ack"
/// invariant hold across racing cancel and dispatch paths.
pub struct TurnRegistry<C: Clock> {
    clock: C,
    turns: Mutex<HashMap<String, TurnDispatchState>>,
    sink: Arc<dyn AckSink>,
}

impl<C: Clock> TurnRegistry<C> {
    pub fn new(clock: C, sink: Arc<dyn AckSink>) -> Self {
        Self { clock, turns: Mutex::new(HashMap::new()), sink }
    }

    pub fn register(&self, turn_id: &str, thread_id: &str, session_key: &str) {
        let state = TurnDispatchState {
            thread_id: thread_id.to_string(),
            session_key: session_key.to_string(),
            event_id: None,
            status: TurnStatus::Queued,
            cancel_requested: false,
            cancel_reason: String::new(),
            last_updated_ms: self.clock.epoch_ms(),
            cancel: None,
        };
        self.turns.lock().insert(turn_id.to_string(), state);
    }

    pub fn contains(&self, turn_id: &str) -> bool {
        self.turns.lock().contains_key(turn_id)
    }

    pub fn get(&self, turn_id: &str) -> Option<TurnDispatchState> {
        self.turns.lock().get(turn_id).cloned()
    }

    pub fn set_event_id(&self, turn_id: &str, event_id: &str) {
        if let Some(state) = self.turns.lock().get_mut(turn_id) {
            state.event_id = Some(event_id.to_string());
        }
    }

    pub fn set_cancel_token(&self, turn_id: &str, token: CancellationToken) {
        if let Some(state) = self.turns.lock().get_mut(turn_id) {
            state.cancel = Some(token);
        }
    }

    /// Mark the turn cancel-requested, returning its state snapshot. The
    /// stored cancel token is fired so the dispatcher's wait aborts.
    pub fn mark_cancel_requested(&self, turn_id: &str, reason: &str) -> Option<TurnDispatchState> {
        let mut turns = self.turns.lock();
        let state = turns.get_mut(turn_id)?;
        state.cancel_requested = true;
        state.cancel_reason = reason.to_string();
        state.last_updated_ms = self.clock.epoch_ms();
        if let Some(token) = &state.cancel {
            token.cancel();
        }
        Some(state.clone())
    }

    pub fn is_cancel_requested(&self, turn_id: &str) -> bool {
        self.turns.lock().get(turn_id).map(|s| s.cancel_requested).unwrap_or(false)
    }

    /// Emit a progress (non-terminal) ack and update the stored status.
    pub fn ack_progress(&self, turn_id: &str, status: TurnStatus, message: &str) {
        let snapshot = {
            let mut turns = self.turns.lock();
            match turns.get_mut(turn_id) {
                Some(state) => {
                    state.status = status;
                    state.last_updated_ms = self.clock.epoch_ms();
                    state.clone()
                }
                None => return,
            }
        };
        self.sink.emit(
            TurnAck::new(turn_id, status, self.clock.epoch_ms())
                .thread_id(snapshot.thread_id)
                .session_key(snapshot.session_key)
                .message(message),
        );
    }

    /// Emit the terminal ack and clear the dispatch state. No-op if the
    /// turn was already cleared.
    pub fn ack_terminal(
        &self,
        turn_id: &str,
        status: TurnStatus,
        message: &str,
        workspace_ref: &str,
        workspace_path: &str,
    ) -> bool {
        debug_assert!(status.is_terminal());
        let snapshot = match self.turns.lock().remove(turn_id) {
            Some(state) => state,
            None => return false,
        };
        self.sink.emit(
            TurnAck::new(turn_id, status, self.clock.epoch_ms())
                .thread_id(snapshot.thread_id)
                .session_key(snapshot.session_key)
                .message(message)
                .workspace_ref(workspace_ref)
                .workspace_path(workspace_path),
        );
        true
    }

    /// Drop a dispatch state without acking (handler shutdown).
    pub fn clear(&self, turn_id: &str) {
        self.turns.lock().remove(turn_id);
    }

    pub fn len(&self) -> usize {
        self.turns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.lock().is_empty()
    }
}

/// The serve handler: the controller's front door for envelopes.
pub struct ServeHandler<C: Clock> {
    clock: C,
    scheduler: Arc<SessionScheduler<C>>,
    registry: Arc<TurnRegistry<C>>,
    dispatcher: Arc<dyn EventDispatcher>,
    index: Arc<TurnEventIndex>,
    ledger: Arc<ActivityLedger>,
    policy: FollowupPolicy,
    dedupe: DedupeCache<C>,
    in_flight: AtomicUsize,
    idle_notify: tokio::sync::Notify,
}

impl<C: Clock> ServeHandler<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: C,
        scheduler: Arc<SessionScheduler<C>>,
        registry: Arc<TurnRegistry<C>>,
        dispatcher: Arc<dyn EventDispatcher>,
        index: Arc<TurnEventIndex>,
        ledger: Arc<ActivityLedger>,
        policy: FollowupPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            dedupe: DedupeCache::new(clock.clone()),
            clock,
            scheduler,
            registry,
            dispatcher,
            index,
            ledger,
            policy,
            in_flight: AtomicUsize::new(0),
            idle_notify: tokio::sync::Notify::new(),
        })
    }

    pub fn registry(&self) -> &Arc<TurnRegistry<C>> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<SessionScheduler<C>> {
        &self.scheduler
    }

    /// Enqueue an envelope. Turn-bearing envelopes are registered and
    /// acked `queued`; hitting the session's queued-turn cap fails
    /// synchronously with no ack.
    pub async fn enqueue(&self, envelope: EventEnvelope) -> Result<(), EnqueueError> {
        // Redeliveries carry the same idempotency token; accept and drop.
        if self.dedupe.seen(&envelope.dedupe_key) {
            tracing::debug!(
                event_id = %envelope.id,
                dedupe_key = %envelope.dedupe_key,
                "dropping duplicate delivery"
            );
            return Ok(());
        }

        let session_key = envelope.session_key();
        let turn_id = envelope.turn_id().map(str::to_string);

        if let Some(ref turn_id) = turn_id {
            self.registry.register(
                turn_id,
                envelope.thread_id().unwrap_or_default(),
                session_key.as_str(),
            );
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.scheduler.enqueue(envelope, self.policy).await {
            Ok(()) => {
                if let Some(ref turn_id) = turn_id {
                    self.registry.ack_progress(turn_id, TurnStatus::Queued, "turn queued");
                }
                Ok(())
            }
            Err(e) => {
                self.task_done();
                if let Some(ref turn_id) = turn_id {
                    self.registry.clear(turn_id);
                }
                Err(e)
            }
        }
    }

    /// Worker body: serialize on the session, bound global parallelism,
    /// drop superseded items, dispatch the rest.
    pub async fn work(self: Arc<Self>, item: ScheduledItem) {
        let key = item.session_key.as_str().to_string();

        let session_mutex = self.scheduler.checkout(&key);
        let _session_guard = session_mutex.lock().await;
        let _permit = self.scheduler.acquire_permit().await;

        if let Some(turn_id) = item.envelope.turn_id() {
            self.scheduler.take_queued_turn(&key, turn_id);
        }

        if item.epoch < self.scheduler.current_epoch(&key) {
            self.drop_superseded(&item).await;
        } else {
            self.dispatcher.dispatch(item.envelope).await;
        }

        self.scheduler.release(&key);
        self.task_done();
    }

    /// A queued item invalidated by an epoch advance: ack turn-bearing
    /// items as interrupted with the epoch's reason and record the
    /// outcome; everything else is dropped quietly.
    async fn drop_superseded(&self, item: &ScheduledItem) {
        let key = item.session_key.as_str();
        let reason = {
            let reason = self.scheduler.epoch_reason(key);
            if reason.is_empty() {
                "superseded".to_string()
            } else {
                reason
            }
        };
        tracing::debug!(
            event_id = %item.envelope.id,
            session = %key,
            reason = %reason,
            "dropping superseded item"
        );

        if let Some(turn_id) = item.envelope.turn_id() {
            self.registry.ack_terminal(turn_id, TurnStatus::Interrupted, &reason, "", "");
            if let Err(e) = self.index.remove(turn_id) {
                tracing::warn!(error = %e, "failed to clear turn index entry");
            }
        }

        let record = EventOutcomeRecord {
            event_id: item.envelope.id.clone(),
            status: OutcomeStatus::Interrupted,
            has_action: false,
            action_refs: Vec::new(),
            message: reason,
            completed_at: self.clock.utc_now().to_rfc3339(),
        };
        if let Err(e) = self.ledger.record(record) {
            tracing::warn!(error = %e, "failed to record superseded outcome");
        }
    }

    /// Interrupt a turn: advance the epoch, signal the dispatcher, ack
    /// `cancel_requested`, and mirror the runtime's cancel response.
    pub async fn interrupt_turn(&self, turn_id: &str, thread_id: &str, reason: &str) {
        let session_key = match self.registry.get(turn_id) {
            Some(state) => state.session_key.clone(),
            None => SessionKey::normalize(thread_id).as_str().to_string(),
        };

        self.scheduler.advance_epoch(&session_key, reason);

        let state = self.registry.mark_cancel_requested(turn_id, reason);
        let known_event_id = state
            .as_ref()
            .and_then(|s| s.event_id.clone())
            .or_else(|| self.index.get(turn_id));

        if state.is_some() {
            self.registry.ack_progress(turn_id, TurnStatus::CancelRequested, reason);
        }

        let Some(event_id) = known_event_id else {
            // The turn never reached the runtime.
            self.registry.ack_terminal(turn_id, TurnStatus::Interrupted, reason, "", "");
            if let Err(e) = self.index.remove(turn_id) {
                tracing::warn!(error = %e, "failed to clear turn index entry");
            }
            return;
        };

        match self.dispatcher.cancel_on_runtime(&event_id, reason).await {
            Ok(response) => {
                let status = TurnStatus::normalize(&response.status);
                let message = response.message.unwrap_or_else(|| reason.to_string());
                if status == TurnStatus::CancelRequested {
                    // Runtime acknowledged; the dispatch poll will observe
                    // the terminal status and clear the state.
                    self.registry.ack_progress(turn_id, status, &message);
                } else {
                    let terminal = if status.is_terminal() { status } else { TurnStatus::Interrupted };
                    self.registry.ack_terminal(turn_id, terminal, &message, "", "");
                    if let Err(e) = self.index.remove(turn_id) {
                        tracing::warn!(error = %e, "failed to clear turn index entry");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(turn_id, event_id = %event_id, error = %e, "cancel request to runtime failed");
                self.registry.ack_terminal(turn_id, TurnStatus::Interrupted, reason, "", "");
                if let Err(err) = self.index.remove(turn_id) {
                    tracing::warn!(error = %err, "failed to clear turn index entry");
                }
            }
        }
    }

    /// Stop accepting new envelopes; queued items still drain.
    pub fn close(&self) {
        self.scheduler.close();
    }

    /// Wait until every accepted envelope has finished dispatching.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle_notify.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn task_done(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle_notify.notify_waiters();
        }
    }
}

#[async_trait::async_trait]
impl<C: Clock> EnvelopeSink for ServeHandler<C> {
    async fn accept(&self, envelope: EventEnvelope) -> Result<(), EnqueueError> {
        self.enqueue(envelope).await
    }
}

/// Spawn every configured source against this handler.
pub fn spawn_sources<C: Clock>(
    handler: &Arc<ServeHandler<C>>,
    sources: Vec<Box<dyn EnvelopeSource>>,
    cancel: &tokio_util::sync::CancellationToken,
) -> Vec<tokio::task::JoinHandle<Result<&'static str, crate::bridge::BridgeError>>> {
    sources
        .into_iter()
        .map(|source| {
            let name = source.name();
            let sink = Arc::clone(handler) as Arc<dyn EnvelopeSink>;
            let cancel = cancel.clone();
            tokio::spawn(async move {
                source.run(sink, cancel).await?;
                Ok(name)
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
