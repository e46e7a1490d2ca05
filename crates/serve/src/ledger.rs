// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Activity ledger: append-only NDJSON outcome log plus the emission gate.
//!
//! Every terminal outcome is appended; the gate decides whether it also
//! surfaces as a user-visible activity item through the configured
//! [`ActivitySink`]. Suppressed outcomes get a single debug record.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use holon_core::{EventOutcomeRecord, OutcomeStatus};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger append failed: {0}")]
    Append(#[from] std::io::Error),
}

/// Receives gated (user-visible) activity items.
pub trait ActivitySink: Send + Sync + 'static {
    fn notify(&self, record: &EventOutcomeRecord);
}

/// Desktop notification sink.
pub struct DesktopActivitySink;

impl ActivitySink for DesktopActivitySink {
    fn notify(&self, record: &EventOutcomeRecord) {
        let summary = format!("holon: event {}", record.status);
        let body = if record.message.is_empty() {
            record.event_id.clone()
        } else {
            format!("{}: {}", record.event_id, record.message)
        };
        // Notification display can block on the session bus; keep it off
        // the async runtime.
        std::thread::spawn(move || {
            if let Err(e) = notify_rust::Notification::new().summary(&summary).body(&body).show() {
                tracing::debug!(error = %e, "desktop notification failed");
            }
        });
    }
}

/// Log-only sink for headless hosts.
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn notify(&self, record: &EventOutcomeRecord) {
        tracing::info!(
            event_id = %record.event_id,
            status = %record.status,
            has_action = record.has_action,
            message = %record.message,
            "activity"
        );
    }
}

/// Channel sink for tests and embedding callers.
pub struct ChannelActivitySink(pub tokio::sync::mpsc::UnboundedSender<EventOutcomeRecord>);

impl ActivitySink for ChannelActivitySink {
    fn notify(&self, record: &EventOutcomeRecord) {
        let _ = self.0.send(record.clone());
    }
}

/// Append-only NDJSON ledger of event outcomes.
pub struct ActivityLedger {
    path: PathBuf,
    append_lock: Mutex<()>,
    sink: Arc<dyn ActivitySink>,
}

impl ActivityLedger {
    pub fn new(path: PathBuf, sink: Arc<dyn ActivitySink>) -> Self {
        Self { path, append_lock: Mutex::new(()), sink }
    }

    /// Append one outcome record and run the emission gate.
    pub fn record(&self, record: EventOutcomeRecord) -> Result<(), LedgerError> {
        let line = serde_json::to_string(&record)
            .map_err(|e| LedgerError::Append(std::io::Error::other(e)))?;
        {
            let _guard = self.append_lock.lock();
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file =
                std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
            writeln!(file, "{}", line)?;
        }

        if record.should_emit() {
            self.sink.notify(&record);
        } else {
            tracing::debug!(
                event_id = %record.event_id,
                status = %record.status,
                "activity suppressed by gate"
            );
        }
        Ok(())
    }

    /// Read all records, skipping unparseable lines (a partial tail line
    /// after a crash is expected and harmless).
    pub fn read_all(&self) -> Vec<EventOutcomeRecord> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        raw.lines().filter_map(|line| serde_json::from_str(line).ok()).collect()
    }

    /// Count records with the given status (diagnostics helper).
    pub fn count_with_status(&self, status: OutcomeStatus) -> usize {
        self.read_all().iter().filter(|r| r.status == status).count()
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
