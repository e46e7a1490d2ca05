// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::sync::mpsc;

fn record(event_id: &str, status: OutcomeStatus, has_action: bool) -> EventOutcomeRecord {
    EventOutcomeRecord {
        event_id: event_id.into(),
        status,
        has_action,
        action_refs: vec![],
        message: String::new(),
        completed_at: "2026-01-01T00:00:00Z".into(),
    }
}

fn ledger(dir: &tempfile::TempDir) -> (ActivityLedger, mpsc::UnboundedReceiver<EventOutcomeRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ledger = ActivityLedger::new(
        dir.path().join("activity-ledger.ndjson"),
        Arc::new(ChannelActivitySink(tx)),
    );
    (ledger, rx)
}

#[test]
fn appends_grow_monotonically() {
    let dir = tempfile::tempdir().unwrap();
    let (ledger, _rx) = ledger(&dir);

    ledger.record(record("e1", OutcomeStatus::Ok, false)).unwrap();
    ledger.record(record("e2", OutcomeStatus::Failed, false)).unwrap();
    ledger.record(record("e3", OutcomeStatus::Skipped, false)).unwrap();

    let all = ledger.read_all();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].event_id, "e1");
    assert_eq!(all[2].event_id, "e3");
    assert_eq!(ledger.count_with_status(OutcomeStatus::Failed), 1);
}

#[test]
fn gate_emits_failures_and_actions_only() {
    let dir = tempfile::tempdir().unwrap();
    let (ledger, rx) = ledger(&dir);

    ledger.record(record("quiet-ok", OutcomeStatus::Ok, false)).unwrap();
    ledger.record(record("action-ok", OutcomeStatus::Ok, true)).unwrap();
    ledger.record(record("failed", OutcomeStatus::Failed, false)).unwrap();
    ledger.record(record("interrupted", OutcomeStatus::Interrupted, false)).unwrap();
    ledger.record(record("skipped", OutcomeStatus::Skipped, false)).unwrap();

    let mut emitted = Vec::new();
    let mut rx = rx;
    while let Ok(record) = rx.try_recv() {
        emitted.push(record.event_id);
    }
    assert_eq!(emitted, vec!["action-ok", "failed", "interrupted"]);
}

#[test]
fn partial_tail_line_is_skipped_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let (ledger, _rx) = ledger(&dir);
    ledger.record(record("e1", OutcomeStatus::Ok, false)).unwrap();

    // Simulate a crash mid-append.
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(dir.path().join("activity-ledger.ndjson"))
        .unwrap();
    write!(file, "{{\"event_id\":\"e2\",\"stat").unwrap();

    let all = ledger.read_all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].event_id, "e1");
}

#[test]
fn read_all_on_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (ledger, _rx) = ledger(&dir);
    assert!(ledger.read_all().is_empty());
}
