// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::envelope::EventScope;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    plain = { "widgets", "widgets" },
    slashes = { "feature/login", "feature_login" },
    backslash = { "a\\b", "a_b" },
    colon = { "a:b", "a_b" },
    spaces = { "a b", "a_b" },
    trim = { "/edge/", "edge" },
    empty = { "", "default" },
    only_separators = { "///", "default" },
)]
fn sanitize(raw: &str, expected: &str) {
    assert_eq!(sanitize_segment(raw), expected);
}

#[test]
fn ref_from_parts_splits_owner() {
    let r = WorkspaceRef::from_parts("acme/widgets", "main");
    assert_eq!(r.to_string(), "acme/widgets@main");
    assert_eq!(r.rel_path(), std::path::PathBuf::from("repos/acme/widgets/main"));
}

#[test]
fn ref_without_owner_defaults_to_local() {
    let r = WorkspaceRef::from_parts("rpc", "default");
    assert_eq!(r.to_string(), "local/rpc@default");
}

#[test]
fn envelope_ref_prefers_head_sha() {
    let mut env = EventEnvelope::new("d1", "github", "pull_request.opened")
        .payload(json!({"pull_request": {"head": {"sha": "abc123", "ref": "feature/x"}}}));
    env.scope = EventScope { repo: "acme/widgets".into(), ..Default::default() };
    let r = WorkspaceRef::for_envelope(&env);
    assert_eq!(r.to_string(), "acme/widgets@abc123");
}

#[test]
fn envelope_ref_falls_back_to_head_ref() {
    let mut env = EventEnvelope::new("d1", "github", "push")
        .payload(json!({"head_ref": "feature/login"}));
    env.scope = EventScope { repo: "acme/widgets".into(), ..Default::default() };
    assert_eq!(WorkspaceRef::for_envelope(&env).to_string(), "acme/widgets@feature_login");
}

#[test]
fn envelope_ref_defaults() {
    let env = EventEnvelope::new("d1", "rpc", "rpc.turn.input");
    assert_eq!(WorkspaceRef::for_envelope(&env).to_string(), "local/rpc@default");
}

#[test]
fn envelope_ref_uses_payload_repo_hint() {
    let env = EventEnvelope::new("d1", "rpc", "rpc.turn.input")
        .payload(json!({"repo": "acme/widgets"}));
    assert_eq!(WorkspaceRef::for_envelope(&env).to_string(), "acme/widgets@default");
}

#[test]
fn manifest_deserializes_with_defaults() {
    let m: WorkspaceManifest =
        serde_json::from_value(json!({"source": "git", "ref": "main", "head_sha": "abc"})).unwrap();
    assert_eq!(m.r#ref, "main");
    assert!(!m.is_shallow);
    assert!(m.notes.is_empty());
}
