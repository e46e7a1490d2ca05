// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment knob access for the serve controller.
//!
//! Knobs are read at first use. Invalid values log a warning and fall back
//! to the documented defaults.

use std::path::PathBuf;
use std::time::Duration;

use holon_core::FollowupPolicy;

/// Default bound on concurrent dispatches across sessions.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default cap on queued turns per session.
pub const DEFAULT_MAX_QUEUED_TURNS: usize = 8;

/// Default budget for runtime readiness after a session start.
pub const DEFAULT_RPC_READY_TIMEOUT: Duration = Duration::from_secs(120);

/// Default per-event dispatch deadline.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default cadence of progress acks while a turn is pending.
pub const DEFAULT_TURN_PROGRESS_HEARTBEAT: Duration = Duration::from_secs(3);

/// `HOLON_SERVE_CONCURRENCY` (int > 0).
pub fn concurrency() -> usize {
    positive_int("HOLON_SERVE_CONCURRENCY", DEFAULT_CONCURRENCY)
}

/// `HOLON_SERVE_MAX_QUEUED_TURNS` (int > 0).
pub fn max_queued_turns() -> usize {
    positive_int("HOLON_SERVE_MAX_QUEUED_TURNS", DEFAULT_MAX_QUEUED_TURNS)
}

/// `HOLON_SERVE_FOLLOWUP_POLICY` (`followup|interrupt|collect`).
pub fn followup_policy() -> FollowupPolicy {
    let raw = match std::env::var("HOLON_SERVE_FOLLOWUP_POLICY") {
        Ok(raw) => raw,
        Err(_) => return FollowupPolicy::default(),
    };
    match FollowupPolicy::parse(&raw) {
        Some(policy) => policy,
        None => {
            tracing::warn!(
                value = %raw,
                "invalid HOLON_SERVE_FOLLOWUP_POLICY, using default"
            );
            FollowupPolicy::default()
        }
    }
}

/// `HOLON_SERVE_RPC_READY_TIMEOUT` (duration, e.g. `2m`, `90s`).
pub fn rpc_ready_timeout() -> Duration {
    duration("HOLON_SERVE_RPC_READY_TIMEOUT", DEFAULT_RPC_READY_TIMEOUT)
}

/// `HOLON_SERVE_EVENT_TIMEOUT` (duration).
pub fn event_timeout() -> Duration {
    duration("HOLON_SERVE_EVENT_TIMEOUT", DEFAULT_EVENT_TIMEOUT)
}

/// `HOLON_SERVE_TURN_PROGRESS_HEARTBEAT` (duration).
pub fn turn_progress_heartbeat() -> Duration {
    duration("HOLON_SERVE_TURN_PROGRESS_HEARTBEAT", DEFAULT_TURN_PROGRESS_HEARTBEAT)
}

/// `HOLON_RUNTIME_IMAGE` override for the runtime image reference.
pub fn runtime_image() -> Option<String> {
    std::env::var("HOLON_RUNTIME_IMAGE").ok().filter(|s| !s.is_empty())
}

/// Default agent home root: `~/.holon/agents`.
pub fn default_agent_root() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".holon/agents")
}

fn positive_int(name: &str, default: usize) -> usize {
    let raw = match std::env::var(name) {
        Ok(raw) => raw,
        Err(_) => return default,
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
            tracing::warn!(knob = name, value = %raw, "invalid integer knob, using default");
            default
        }
    }
}

fn duration(name: &str, default: Duration) -> Duration {
    let raw = match std::env::var(name) {
        Ok(raw) => raw,
        Err(_) => return default,
    };
    match parse_duration(&raw) {
        Some(d) => d,
        None => {
            tracing::warn!(knob = name, value = %raw, "invalid duration knob, using default");
            default
        }
    }
}

/// Parse a duration string of `h`/`m`/`s`/`ms` segments, e.g. `1h30m`,
/// `90s`, `300ms`. A bare integer is rejected (ambiguous).
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut chars = raw.chars().peekable();
    let mut matched_any = false;

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return None;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'h' => Duration::from_secs(value * 3600),
            'm' => {
                if chars.peek() == Some(&'s') {
                    chars.next();
                    Duration::from_millis(value)
                } else {
                    Duration::from_secs(value * 60)
                }
            }
            's' => Duration::from_secs(value),
            _ => return None,
        };
        total += unit;
        matched_any = true;
    }

    if !digits.is_empty() || !matched_any {
        return None;
    }
    Some(total)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
