// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    short_id = { "abc123def456", true },
    full_id = { "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef", true },
    too_short = { "abc123", false },
    too_long = { "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef0", false },
    uppercase = { "ABC123DEF456", false },
    non_hex = { "abc123def45g", false },
    shell_metachars = { "abc;rm -rf /x", false },
    empty = { "", false },
)]
fn container_id_validation(id: &str, expected: bool) {
    assert_eq!(is_valid_container_id(id), expected);
}

#[test]
fn parse_exec_output_splits_body_and_status() {
    let resp = parse_exec_output("{\"status\":\"completed\"}\n200").unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, "{\"status\":\"completed\"}");
}

#[test]
fn parse_exec_output_handles_multiline_body() {
    let resp = parse_exec_output("line1\nline2\n202").unwrap();
    assert_eq!(resp.status, 202);
    assert_eq!(resp.body, "line1\nline2");
}

#[test]
fn parse_exec_output_rejects_missing_status() {
    assert!(parse_exec_output("no newline here").is_err());
    assert!(parse_exec_output("body\nnot-a-code").is_err());
}

#[tokio::test]
async fn exec_request_refuses_invalid_container_id() {
    let err = exec_request(
        "not hex!",
        "/holon/home/run/agent.sock",
        "GET",
        "/health",
        None,
        std::time::Duration::from_secs(1),
    )
    .await
    .unwrap_err();
    assert!(!err.is_retryable(false));
    assert!(err.to_string().contains("invalid container id"), "got: {err}");
}
