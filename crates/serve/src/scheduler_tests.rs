// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use holon_core::FakeClock;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn turn_envelope(id: &str, turn_id: &str, session: &str) -> EventEnvelope {
    EventEnvelope::new(id, "rpc", "rpc.turn.input")
        .payload(json!({"turn_id": turn_id, "thread_id": session, "input": "hi"}))
}

fn scheduler(
    max_concurrent: usize,
    max_queued: usize,
) -> (Arc<SessionScheduler<FakeClock>>, mpsc::Receiver<ScheduledItem>, FakeClock) {
    let clock = FakeClock::new();
    let (scheduler, rx) = SessionScheduler::new(clock.clone(), max_concurrent, max_queued);
    (scheduler, rx, clock)
}

#[tokio::test]
async fn enqueue_routes_to_session_key() {
    let (scheduler, mut rx, _) = scheduler(4, 8);
    scheduler.enqueue(turn_envelope("e1", "t1", "main"), FollowupPolicy::Followup).await.unwrap();

    let item = rx.recv().await.unwrap();
    assert_eq!(item.session_key.as_str(), "main");
    assert_eq!(item.epoch, 0);
}

#[tokio::test]
async fn queue_full_fails_synchronously_with_exact_message() {
    let (scheduler, _rx, _) = scheduler(4, 2);
    scheduler.enqueue(turn_envelope("e1", "t1", "main"), FollowupPolicy::Followup).await.unwrap();
    scheduler.enqueue(turn_envelope("e2", "t2", "main"), FollowupPolicy::Followup).await.unwrap();

    let err = scheduler
        .enqueue(turn_envelope("e3", "t3", "main"), FollowupPolicy::Followup)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "session main queue is full (2 queued turns)");
}

#[tokio::test]
async fn non_turn_envelopes_are_not_capped() {
    let (scheduler, _rx, _) = scheduler(4, 1);
    for i in 0..5 {
        let mut env = EventEnvelope::new(format!("e{i}"), "github", "issues.opened");
        env.scope.repo = "acme/widgets".into();
        scheduler.enqueue(env, FollowupPolicy::Followup).await.unwrap();
    }
}

#[tokio::test]
async fn interrupt_policy_advances_epoch_when_work_is_queued() {
    let (scheduler, mut rx, _) = scheduler(4, 8);
    scheduler.enqueue(turn_envelope("e1", "t1", "main"), FollowupPolicy::Interrupt).await.unwrap();
    // Nothing queued yet when t1 arrived, so no epoch bump.
    assert_eq!(scheduler.current_epoch("main"), 0);

    scheduler.enqueue(turn_envelope("e2", "t2", "main"), FollowupPolicy::Interrupt).await.unwrap();
    assert_eq!(scheduler.current_epoch("main"), 1);
    assert_eq!(scheduler.epoch_reason("main"), "superseded by interrupt");

    // The superseded item carries the old epoch; the new one the current.
    assert_eq!(rx.recv().await.unwrap().epoch, 0);
    assert_eq!(rx.recv().await.unwrap().epoch, 1);
}

#[tokio::test]
async fn collect_policy_records_distinct_reason() {
    let (scheduler, _rx, _) = scheduler(4, 8);
    scheduler.enqueue(turn_envelope("e1", "t1", "main"), FollowupPolicy::Collect).await.unwrap();
    scheduler.enqueue(turn_envelope("e2", "t2", "main"), FollowupPolicy::Collect).await.unwrap();
    assert_eq!(scheduler.epoch_reason("main"), "superseded by collected follow-up");
}

#[tokio::test]
async fn followup_policy_never_advances_epoch() {
    let (scheduler, _rx, _) = scheduler(4, 8);
    for i in 0..4 {
        scheduler
            .enqueue(turn_envelope(&format!("e{i}"), &format!("t{i}"), "main"), FollowupPolicy::Followup)
            .await
            .unwrap();
    }
    assert_eq!(scheduler.current_epoch("main"), 0);
}

#[tokio::test]
async fn take_queued_turn_shrinks_queue() {
    let (scheduler, _rx, _) = scheduler(4, 8);
    scheduler.enqueue(turn_envelope("e1", "t1", "main"), FollowupPolicy::Followup).await.unwrap();
    scheduler.enqueue(turn_envelope("e2", "t2", "main"), FollowupPolicy::Followup).await.unwrap();
    assert_eq!(scheduler.queued_count("main"), 2);

    scheduler.take_queued_turn("main", "t1");
    assert_eq!(scheduler.queued_count("main"), 1);

    // Unknown turn ids are a no-op.
    scheduler.take_queued_turn("main", "t9");
    assert_eq!(scheduler.queued_count("main"), 1);
}

#[tokio::test]
async fn session_entries_reclaimed_only_when_idle_old_and_over_cap() {
    let (scheduler, _rx, clock) = scheduler(4, 8);

    // Fill past the cap with idle entries.
    for i in 0..600 {
        let key = format!("s{i}");
        let mutex = scheduler.checkout(&key);
        drop(mutex);
        scheduler.release(&key);
    }
    // Map exceeded the cap but nothing is old enough yet.
    assert_eq!(scheduler.lock_entry_count(), 600);

    clock.advance(Duration::from_secs(11 * 60));
    let mutex = scheduler.checkout("fresh");
    drop(mutex);
    scheduler.release("fresh");
    // All idle-and-old entries vanish; the fresh one stays.
    assert_eq!(scheduler.lock_entry_count(), 1);
}

#[tokio::test]
async fn active_entries_survive_reclamation() {
    let (scheduler, _rx, clock) = scheduler(4, 8);

    let held = scheduler.checkout("held");
    let _guard = held.lock().await;

    for i in 0..600 {
        let key = format!("s{i}");
        let mutex = scheduler.checkout(&key);
        drop(mutex);
        scheduler.release(&key);
    }
    clock.advance(Duration::from_secs(11 * 60));
    scheduler.release("other");
    // "held" has active == 1 even though it is old.
    let state_count = scheduler.lock_entry_count();
    assert!(state_count >= 1);
    let remutex = scheduler.checkout("held");
    assert!(remutex.try_lock().is_err(), "same mutex instance must still be held");
}

#[tokio::test]
async fn pump_runs_workers_concurrently_per_item() {
    let (scheduler, rx, _) = scheduler(4, 8);
    let seen = Arc::new(AtomicUsize::new(0));

    for i in 0..5 {
        let mut env = EventEnvelope::new(format!("e{i}"), "github", "x");
        env.scope.repo = format!("r{i}");
        scheduler.enqueue(env, FollowupPolicy::Followup).await.unwrap();
    }

    let worker_seen = Arc::clone(&seen);
    let pump = tokio::spawn(async move {
        run_pump(rx, move |_item| {
            let seen = Arc::clone(&worker_seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
    });

    scheduler.close();
    pump.await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 5);
}
