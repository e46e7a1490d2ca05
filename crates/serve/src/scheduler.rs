// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event pump and session-keyed scheduler.
//!
//! A bounded channel feeds a pump task that spawns one worker per event.
//! Within a session key, a dedicated async mutex serializes dispatch in
//! enqueue order; across sessions, a semaphore bounds parallelism. The
//! scheduler's own bookkeeping (lock entries, epochs, queued-turn lists)
//! sits behind one briefly-held mutex; workers never block while holding
//! it, only on the per-session mutex and the semaphore.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use holon_core::envelope::{EventEnvelope, SessionKey};
use holon_core::{Clock, FollowupPolicy};

/// Capacity of the pump's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Session lock entries are only reclaimed once the map exceeds this cap.
const SESSION_MAP_CAP: usize = 512;

/// Idle retention for session lock entries (epoch ms).
const SESSION_RETENTION_MS: u64 = 10 * 60 * 1000;

/// One scheduled unit of work.
#[derive(Debug)]
pub struct ScheduledItem {
    pub envelope: EventEnvelope,
    pub session_key: SessionKey,
    /// Session epoch captured at enqueue; compared at dequeue to detect
    /// superseded work.
    pub epoch: u64,
}

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("session {session} queue is full ({queued} queued turns)")]
    QueueFull { session: String, queued: usize },

    #[error("event channel closed")]
    Closed,
}

struct SessionLockEntry {
    mutex: Arc<tokio::sync::Mutex<()>>,
    active: usize,
    last_used_ms: u64,
}

#[derive(Default)]
struct EpochEntry {
    epoch: u64,
    reason: String,
}

#[derive(Default)]
struct SchedulerState {
    locks: HashMap<String, SessionLockEntry>,
    epochs: HashMap<String, EpochEntry>,
    queued_turns: HashMap<String, Vec<String>>,
}

/// Session-keyed scheduler shared by the handler and its workers.
pub struct SessionScheduler<C: Clock> {
    clock: C,
    state: Mutex<SchedulerState>,
    permits: Arc<Semaphore>,
    max_queued_turns: usize,
    /// Closable sender: `close()` drops it so the pump can drain and exit.
    tx: Mutex<Option<mpsc::Sender<ScheduledItem>>>,
}

impl<C: Clock> SessionScheduler<C> {
    /// Create the scheduler and the receiving end of its event channel.
    pub fn new(
        clock: C,
        max_concurrent: usize,
        max_queued_turns: usize,
    ) -> (Arc<Self>, mpsc::Receiver<ScheduledItem>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let scheduler = Arc::new(Self {
            clock,
            state: Mutex::new(SchedulerState::default()),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            max_queued_turns: max_queued_turns.max(1),
            tx: Mutex::new(Some(tx)),
        });
        (scheduler, rx)
    }

    /// Enqueue an envelope under its derived session key.
    ///
    /// Turn-bearing envelopes are subject to the follow-up policy and the
    /// queued-turn cap; hitting the cap fails synchronously (no phantom
    /// ack). Blocks only when the channel is full.
    pub async fn enqueue(
        &self,
        envelope: EventEnvelope,
        policy: FollowupPolicy,
    ) -> Result<(), EnqueueError> {
        let session_key = envelope.session_key();
        let key = session_key.as_str().to_string();

        let epoch = {
            let mut state = self.state.lock();

            if let Some(turn_id) = envelope.turn_id() {
                let has_queued =
                    state.queued_turns.get(&key).map(|q| !q.is_empty()).unwrap_or(false);
                if has_queued && policy.advances_epoch() {
                    let entry = state.epochs.entry(key.clone()).or_default();
                    entry.epoch += 1;
                    entry.reason = policy.supersede_reason().to_string();
                    tracing::debug!(
                        session = %key,
                        epoch = entry.epoch,
                        policy = %policy,
                        "advanced session epoch for follow-up"
                    );
                }

                let queued = state.queued_turns.entry(key.clone()).or_default();
                if queued.len() >= self.max_queued_turns {
                    return Err(EnqueueError::QueueFull { session: key, queued: queued.len() });
                }
                queued.push(turn_id.to_string());
            }

            state.epochs.get(&key).map(|e| e.epoch).unwrap_or(0)
        };

        let tx = self.tx.lock().clone().ok_or(EnqueueError::Closed)?;
        tx.send(ScheduledItem { envelope, session_key, epoch })
            .await
            .map_err(|_| EnqueueError::Closed)
    }

    /// Stop accepting new work. The pump drains remaining items and exits.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    /// Current epoch for a session key.
    pub fn current_epoch(&self, key: &str) -> u64 {
        self.state.lock().epochs.get(key).map(|e| e.epoch).unwrap_or(0)
    }

    /// Reason recorded on the last epoch advance.
    pub fn epoch_reason(&self, key: &str) -> String {
        self.state.lock().epochs.get(key).map(|e| e.reason.clone()).unwrap_or_default()
    }

    /// Advance the epoch, superseding queued work for the key.
    pub fn advance_epoch(&self, key: &str, reason: &str) -> u64 {
        let mut state = self.state.lock();
        let entry = state.epochs.entry(key.to_string()).or_default();
        entry.epoch += 1;
        entry.reason = reason.to_string();
        entry.epoch
    }

    /// Number of turns currently queued (not yet dispatched) for a key.
    pub fn queued_count(&self, key: &str) -> usize {
        self.state.lock().queued_turns.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Acquire the session entry's mutex handle, marking it active. The
    /// caller locks the returned mutex *after* releasing the scheduler
    /// state lock (inside this call), so state is never held across an
    /// await.
    pub(crate) fn checkout(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();
        let entry = state.locks.entry(key.to_string()).or_insert_with(|| SessionLockEntry {
            mutex: Arc::new(tokio::sync::Mutex::new(())),
            active: 0,
            last_used_ms: now,
        });
        entry.active += 1;
        entry.last_used_ms = now;
        Arc::clone(&entry.mutex)
    }

    /// Release a checked-out session entry, opportunistically reclaiming
    /// idle entries once the map exceeds its cap.
    pub(crate) fn release(&self, key: &str) {
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();
        if let Some(entry) = state.locks.get_mut(key) {
            entry.active = entry.active.saturating_sub(1);
            entry.last_used_ms = now;
        }
        if state.locks.len() > SESSION_MAP_CAP {
            state.locks.retain(|_, entry| {
                entry.active > 0 || now.saturating_sub(entry.last_used_ms) < SESSION_RETENTION_MS
            });
        }
        // Empty queued lists carry no information.
        state.queued_turns.retain(|_, queued| !queued.is_empty());
    }

    /// Remove a turn from the queued list at dequeue time.
    pub(crate) fn take_queued_turn(&self, key: &str, turn_id: &str) {
        let mut state = self.state.lock();
        if let Some(queued) = state.queued_turns.get_mut(key) {
            if let Some(pos) = queued.iter().position(|t| t == turn_id) {
                queued.remove(pos);
            }
        }
    }

    /// Acquire one global concurrency permit.
    pub(crate) async fn acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).acquire_owned().await.ok()
    }

    /// Number of lock entries currently tracked (test observability).
    #[cfg(test)]
    pub(crate) fn lock_entry_count(&self) -> usize {
        self.state.lock().locks.len()
    }
}

/// Run the pump: read scheduled items and spawn one worker per item.
///
/// Returns when the channel closes (all senders dropped) and every spawned
/// worker has finished.
pub async fn run_pump<F, Fut>(mut rx: mpsc::Receiver<ScheduledItem>, worker: F)
where
    F: Fn(ScheduledItem) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let mut tasks = tokio::task::JoinSet::new();
    while let Some(item) = rx.recv().await {
        tasks.spawn(worker(item));
        // Opportunistically reap finished workers so the set stays small.
        while tasks.try_join_next().is_some() {}
    }
    while tasks.join_next().await.is_some() {}
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
