// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use yare::parameterized;

#[parameterized(
    seconds = { "90s", Some(Duration::from_secs(90)) },
    minutes = { "2m", Some(Duration::from_secs(120)) },
    hours = { "1h", Some(Duration::from_secs(3600)) },
    millis = { "300ms", Some(Duration::from_millis(300)) },
    combined = { "1h30m", Some(Duration::from_secs(5400)) },
    bare_int = { "90", None },
    empty = { "", None },
    garbage = { "soon", None },
    trailing = { "5sx", None },
)]
fn duration_parsing(raw: &str, expected: Option<Duration>) {
    assert_eq!(parse_duration(raw), expected);
}

#[test]
#[serial]
fn concurrency_default_and_override() {
    std::env::remove_var("HOLON_SERVE_CONCURRENCY");
    assert_eq!(concurrency(), DEFAULT_CONCURRENCY);

    std::env::set_var("HOLON_SERVE_CONCURRENCY", "9");
    assert_eq!(concurrency(), 9);

    std::env::set_var("HOLON_SERVE_CONCURRENCY", "0");
    assert_eq!(concurrency(), DEFAULT_CONCURRENCY);

    std::env::set_var("HOLON_SERVE_CONCURRENCY", "lots");
    assert_eq!(concurrency(), DEFAULT_CONCURRENCY);

    std::env::remove_var("HOLON_SERVE_CONCURRENCY");
}

#[test]
#[serial]
fn followup_policy_default_and_override() {
    std::env::remove_var("HOLON_SERVE_FOLLOWUP_POLICY");
    assert_eq!(followup_policy(), FollowupPolicy::Followup);

    std::env::set_var("HOLON_SERVE_FOLLOWUP_POLICY", "collect");
    assert_eq!(followup_policy(), FollowupPolicy::Collect);

    std::env::set_var("HOLON_SERVE_FOLLOWUP_POLICY", "bogus");
    assert_eq!(followup_policy(), FollowupPolicy::Followup);

    std::env::remove_var("HOLON_SERVE_FOLLOWUP_POLICY");
}

#[test]
#[serial]
fn event_timeout_parses_duration() {
    std::env::set_var("HOLON_SERVE_EVENT_TIMEOUT", "5m");
    assert_eq!(event_timeout(), Duration::from_secs(300));
    std::env::remove_var("HOLON_SERVE_EVENT_TIMEOUT");
    assert_eq!(event_timeout(), DEFAULT_EVENT_TIMEOUT);
}
