// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Normalized event envelope and session-key routing.
//!
//! Every ingress source (webhook deliveries, timer ticks, interactive turn
//! requests) is normalized into an [`EventEnvelope`] before it reaches the
//! scheduler. Routing derives the session key that partitions dispatch
//! ordering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The default session every unrouted event lands on.
pub const MAIN_SESSION: &str = "main";

/// Scheduling partition key. Serializes work within a conversational session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Normalize a raw key: empty input collapses to `main`.
    pub fn normalize(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Self(MAIN_SESSION.to_string())
        } else {
            Self(raw.to_string())
        }
    }

    pub fn main() -> Self {
        Self(MAIN_SESSION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self::normalize(s)
    }
}

/// Repository/partition scope of an envelope.
///
/// `workspace_ref` and `workspace_path` start empty and are filled in by the
/// workspace resolver during dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventScope {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace_ref: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace_path: String,
}

/// Subject the envelope is about (issue, pull request, …).
///
/// `id` must be numeric for repository-scoped subjects; synthetic sources
/// (rpc, timer, serve) use `0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSubject {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
}

/// Normalized input record consumed by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique per source delivery.
    pub id: String,
    /// Origin, e.g. `github`, `timer`, `rpc`, `serve`.
    pub source: String,
    /// Dotted event type, e.g. `rpc.turn.input`, `timer.tick`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Delivery timestamp (UTC).
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub scope: EventScope,
    #[serde(default)]
    pub subject: EventSubject,
    /// Caller-provided idempotency token.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dedupe_key: String,
    /// Opaque payload; may carry session_key, thread_id, turn_id, input,
    /// extended_context, and pull-request head SHA.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(id: impl Into<String>, source: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            event_type: event_type.into(),
            at: Utc::now(),
            scope: EventScope::default(),
            subject: EventSubject::default(),
            dedupe_key: String::new(),
            payload: Value::Null,
        }
    }

    crate::setters! {
        into {
            dedupe_key: String,
        }
        set {
            scope: EventScope,
            subject: EventSubject,
            payload: Value,
        }
    }

    fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Explicit session key from the payload.
    pub fn payload_session_key(&self) -> Option<&str> {
        self.payload_str("session_key")
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.payload_str("thread_id")
    }

    pub fn turn_id(&self) -> Option<&str> {
        self.payload_str("turn_id")
    }

    pub fn input(&self) -> Option<&str> {
        self.payload_str("input")
    }

    pub fn extended_context(&self) -> Option<&str> {
        self.payload_str("extended_context")
    }

    /// Pull-request head SHA, either nested under `pull_request.head.sha`
    /// or flattened as `head_sha`.
    pub fn pull_request_head_sha(&self) -> Option<&str> {
        self.payload
            .get("pull_request")
            .and_then(|pr| pr.get("head"))
            .and_then(|h| h.get("sha"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| self.payload_str("head_sha"))
    }

    /// Head ref name, `pull_request.head.ref` or flattened `head_ref`.
    pub fn head_ref(&self) -> Option<&str> {
        self.payload
            .get("pull_request")
            .and_then(|pr| pr.get("head"))
            .and_then(|h| h.get("ref"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| self.payload_str("head_ref"))
    }

    /// Repo hint carried in the payload (used when the scope is empty).
    pub fn payload_repo(&self) -> Option<&str> {
        self.payload_str("repo")
    }

    /// Synthetic sources fabricate their own subjects and are exempt from
    /// the numeric-subject-id requirement.
    pub fn is_synthetic(&self) -> bool {
        matches!(self.source.as_str(), "rpc" | "timer" | "serve")
    }

    /// Numeric subject id, when present and parseable.
    pub fn numeric_subject_id(&self) -> Option<u64> {
        self.subject.id.parse().ok()
    }

    /// Derive the session key for this envelope.
    ///
    /// Rules, in order: payload `session_key` or `thread_id`; scope
    /// partition (prefixed `event:`); scope repo (prefixed `event:`);
    /// source + subject or source + type (prefixed `event:`); `main`.
    pub fn session_key(&self) -> SessionKey {
        if let Some(key) = self.payload_session_key().or_else(|| self.thread_id()) {
            return SessionKey::normalize(key);
        }
        if !self.scope.partition.is_empty() {
            return SessionKey::normalize(&format!("event:{}", self.scope.partition));
        }
        if !self.scope.repo.is_empty() {
            return SessionKey::normalize(&format!("event:{}", self.scope.repo));
        }
        if !self.subject.kind.is_empty() && !self.subject.id.is_empty() {
            return SessionKey::normalize(&format!(
                "event:{}:{}:{}",
                self.source, self.subject.kind, self.subject.id
            ));
        }
        if !self.event_type.is_empty() {
            return SessionKey::normalize(&format!("event:{}:{}", self.source, self.event_type));
        }
        SessionKey::main()
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
