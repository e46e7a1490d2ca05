// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn args(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

#[test]
fn parses_full_flag_set() {
    let options = parse_args(&args(&[
        "serve",
        "--agent-id",
        "astro",
        "--agent-home",
        "/data/agents/astro",
        "--repo",
        "acme/widgets",
        "--input",
        "-",
        "--session",
        "ops",
        "--no-default-session",
        "--lazy-runtime",
        "--runtime-warmup-timeout",
        "90s",
        "--runtime-warmup-best-effort",
        "--max-events",
        "25",
        "--dry-run",
        "--tick-interval",
        "5m",
        "--log-level",
        "debug",
        "--runtime-mode",
        "dev",
        "--runtime-dev-agent-source",
        "/src/agent",
        "--webhook-port",
        "9900",
        "--no-subscriptions",
    ]))
    .unwrap();

    assert_eq!(options.agent_id, "astro");
    assert_eq!(options.agent_home, Some(PathBuf::from("/data/agents/astro")));
    assert_eq!(options.repo.as_deref(), Some("acme/widgets"));
    assert_eq!(options.input.as_deref(), Some("-"));
    assert_eq!(options.session.as_deref(), Some("ops"));
    assert!(options.no_default_session);
    assert!(options.lazy_runtime);
    assert_eq!(options.runtime_warmup_timeout, Duration::from_secs(90));
    assert!(options.runtime_warmup_best_effort);
    assert_eq!(options.max_events, Some(25));
    assert!(options.dry_run);
    assert_eq!(options.tick_interval, Some(Duration::from_secs(300)));
    assert_eq!(options.log_level.as_deref(), Some("debug"));
    assert_eq!(options.runtime_mode, RuntimeMode::Dev);
    assert_eq!(options.runtime_dev_agent_source, Some(PathBuf::from("/src/agent")));
    assert_eq!(options.webhook_port, Some(9900));
    assert!(options.no_subscriptions);
}

#[test]
fn defaults_without_flags() {
    let options = parse_args(&[]).unwrap();
    assert_eq!(options.agent_id, "default");
    assert_eq!(options.runtime_warmup_timeout, Duration::from_secs(120));
    assert!(!options.dry_run);
    assert_eq!(options.runtime_mode, RuntimeMode::Prod);
}

#[test]
fn rejects_unknown_flags_and_bad_values() {
    assert!(parse_args(&args(&["--frobnicate"])).is_err());
    assert!(parse_args(&args(&["--max-events", "many"])).is_err());
    assert!(parse_args(&args(&["--webhook-port", "99999"])).is_err());
    assert!(parse_args(&args(&["--runtime-mode", "staging"])).is_err());
    assert!(parse_args(&args(&["--tick-interval", "soon"])).is_err());
    assert!(parse_args(&args(&["--input"])).is_err(), "missing value");
}
