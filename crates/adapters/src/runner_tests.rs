// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn config() -> SessionConfig {
    SessionConfig::new("holon-agent-a1", "holon-runtime:latest", PathBuf::from("/data/agents/a1"))
        .env(vec![("HOLON_ROLE".into(), "pm".into())])
}

#[test]
fn run_args_bind_canonical_mounts() {
    let args = docker_run_args(&config());
    let joined = args.join(" ");
    assert!(joined.starts_with("run -d --name holon-agent-a1"));
    assert!(joined.contains("/data/agents/a1:/holon/home"));
    assert!(joined.contains("/data/agents/a1/workspaces:/holon/workspace"));
    assert!(joined.contains("/data/agents/a1/state/controller-runtime/input:/holon/input"));
    assert!(joined.contains("/data/agents/a1/state/controller-runtime/output:/holon/output"));
    assert!(joined.contains("/data/agents/a1/state/controller-state:/holon/state"));
    assert!(joined.contains("-e HOLON_ROLE=pm"));
    assert!(joined.ends_with("-w /holon/workspace holon-runtime:latest"));
}

#[test]
fn run_args_include_extra_mounts() {
    let cfg = config().extra_mounts(vec![(PathBuf::from("/src/agent"), "/holon/agent-src".into())]);
    let args = docker_run_args(&cfg);
    assert!(args.join(" ").contains("/src/agent:/holon/agent-src"));
}

#[test]
fn run_args_respect_dir_overrides() {
    let cfg = config().input_dir(PathBuf::from("/tmp/staged-input"));
    let args = docker_run_args(&cfg);
    assert!(args.join(" ").contains("/tmp/staged-input:/holon/input"));
}

#[test]
fn exit_diagnostics_parse_oom_and_time() {
    let (oom, at) = parse_exit_diagnostics("true 2026-05-01T10:00:00.000Z");
    assert!(oom);
    assert_eq!(at.as_deref(), Some("2026-05-01T10:00:00.000Z"));
}

#[test]
fn exit_diagnostics_ignore_zero_time() {
    let (oom, at) = parse_exit_diagnostics("false 0001-01-01T00:00:00Z");
    assert!(!oom);
    assert_eq!(at, None);
}

#[test]
fn not_found_detection() {
    assert!(is_not_found("Error response from daemon: No such container: x"));
    assert!(is_not_found("error: no such object: abc"));
    assert!(!is_not_found("permission denied"));
}

#[test]
fn runner_exit_display() {
    let exit = RunnerExit { exit_code: 137, oom_killed: true, finished_at: None };
    assert_eq!(exit.to_string(), "exit code 137 (OOM killed)");
    assert!(!exit.is_success());
    assert!(RunnerExit { exit_code: 0, oom_killed: false, finished_at: None }.is_success());
}

#[test]
fn handle_reports_owned_snapshot() {
    let handle = SessionHandle {
        container_id: "abc123def456".into(),
        name: "holon-agent-a1".into(),
        snapshot_dir: Some(PathBuf::from("/tmp/snap")),
        logs: parking_lot::Mutex::new(None),
    };
    assert_eq!(handle.owned_snapshot(), Some(&PathBuf::from("/tmp/snap")));
}
