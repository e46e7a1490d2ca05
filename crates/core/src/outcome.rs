// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event outcome records and activity gating.
//!
//! Every dispatched envelope ends in exactly one outcome record appended to
//! the activity ledger. The gate decides whether that outcome additionally
//! becomes a user-visible activity item: failures and interruptions always
//! surface, quiet successes only surface when the runtime took an action.

use serde::{Deserialize, Serialize};

/// Message substrings that mark a user-visible runtime action.
const ACTION_MARKERS: &[&str] = &["opened PR", "posted review", "updated branch", "commented"];

/// Terminal disposition of a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    Skipped,
    Interrupted,
    Failed,
}

crate::simple_display! {
    OutcomeStatus {
        Ok => "ok",
        Skipped => "skipped",
        Interrupted => "interrupted",
        Failed => "failed",
    }
}

/// One appended line of the activity ledger (NDJSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOutcomeRecord {
    pub event_id: String,
    pub status: OutcomeStatus,
    pub has_action: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// RFC 3339 completion timestamp.
    pub completed_at: String,
}

impl EventOutcomeRecord {
    /// Emission gate: surface the outcome as an activity item when it
    /// failed or was interrupted, or when the runtime took an action.
    pub fn should_emit(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed | OutcomeStatus::Interrupted) || self.has_action
    }
}

/// Inspect the runtime's `action` field and message for action markers.
///
/// Returns `(has_action, action_refs)`. A non-empty action field is itself
/// a ref; matched message markers are appended.
pub fn detect_action(action: Option<&str>, message: &str) -> (bool, Vec<String>) {
    let mut refs = Vec::new();
    if let Some(action) = action {
        if !action.trim().is_empty() && action.trim() != "none" {
            refs.push(action.trim().to_string());
        }
    }
    for marker in ACTION_MARKERS {
        if message.contains(marker) {
            refs.push((*marker).to_string());
        }
    }
    (!refs.is_empty(), refs)
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
