// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turn status, acks, and follow-up policy.
//!
//! A turn is a single user-initiated exchange, identified by `turn_id` and
//! correlated to a runtime `event_id`. Status strings coming back from the
//! runtime are normalized case-insensitively; unknown values bucket to
//! `Waiting`.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a turn as reported by the runtime.
///
/// `queued → accepted → running → {completed | failed | interrupted}`,
/// with `cancel_requested` orthogonal to the pending states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Queued,
    Accepted,
    Running,
    CancelRequested,
    Completed,
    Failed,
    Interrupted,
    /// Bucket for unknown status strings.
    Waiting,
}

crate::simple_display! {
    TurnStatus {
        Queued => "queued",
        Accepted => "accepted",
        Running => "running",
        CancelRequested => "cancel_requested",
        Completed => "completed",
        Failed => "failed",
        Interrupted => "interrupted",
        Waiting => "waiting",
    }
}

impl TurnStatus {
    /// Normalize a raw status string (case-insensitive; unknowns → Waiting).
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => Self::Queued,
            "accepted" => Self::Accepted,
            "running" => Self::Running,
            "cancel_requested" => Self::CancelRequested,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "interrupted" => Self::Interrupted,
            _ => Self::Waiting,
        }
    }

    /// Terminal statuses end the turn's dispatch state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Interrupted)
    }

    /// Pending statuses keep the dispatcher polling. An empty status string
    /// from the runtime also counts as pending.
    pub fn is_pending(raw: &str) -> bool {
        raw.trim().is_empty()
            || matches!(
                Self::normalize(raw),
                Self::Queued | Self::Accepted | Self::Running | Self::CancelRequested
            )
    }
}

/// Progress or terminal acknowledgement surfaced to the turn's caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnAck {
    pub turn_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_key: String,
    pub status: TurnStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace_ref: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace_path: String,
    /// Epoch milliseconds when the ack was emitted.
    pub at_ms: u64,
}

impl TurnAck {
    pub fn new(turn_id: impl Into<String>, status: TurnStatus, at_ms: u64) -> Self {
        Self {
            turn_id: turn_id.into(),
            thread_id: String::new(),
            session_key: String::new(),
            status,
            message: String::new(),
            workspace_ref: String::new(),
            workspace_path: String::new(),
            at_ms,
        }
    }

    crate::setters! {
        into {
            thread_id: String,
            session_key: String,
            message: String,
            workspace_ref: String,
            workspace_path: String,
        }
    }
}

/// Policy applied when a turn is enqueued while queued work already exists
/// for the same session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowupPolicy {
    /// Queue normally, up to the queued-turn cap.
    #[default]
    Followup,
    /// Advance the session epoch so older queued items drop at dequeue.
    Interrupt,
    /// Same epoch bump, recording coalescing intent.
    Collect,
}

crate::simple_display! {
    FollowupPolicy {
        Followup => "followup",
        Interrupt => "interrupt",
        Collect => "collect",
    }
}

impl FollowupPolicy {
    /// Parse a policy string; `None` for unrecognized values (the caller
    /// logs and falls back to the default).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "followup" => Some(Self::Followup),
            "interrupt" => Some(Self::Interrupt),
            "collect" => Some(Self::Collect),
            _ => None,
        }
    }

    /// Whether enqueueing under this policy supersedes queued work.
    pub fn advances_epoch(&self) -> bool {
        matches!(self, Self::Interrupt | Self::Collect)
    }

    /// Reason string recorded on the epoch advance.
    pub fn supersede_reason(&self) -> &'static str {
        match self {
            Self::Followup => "",
            Self::Interrupt => "superseded by interrupt",
            Self::Collect => "superseded by collected follow-up",
        }
    }
}

#[cfg(test)]
#[path = "turn_tests.rs"]
mod tests;
