// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn missing_subscriptions_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_subscriptions(dir.path()).unwrap().is_empty());
}

#[test]
fn subscriptions_parse_with_optional_reason() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("subscriptions.json"),
        r#"[{"repo":"acme/widgets","reason":"owner"},{"repo":"acme/docs"}]"#,
    )
    .unwrap();

    let subs = load_subscriptions(dir.path()).unwrap();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0], Subscription { repo: "acme/widgets".into(), reason: "owner".into() });
    assert_eq!(subs[1].reason, "");
}

#[test]
fn malformed_subscriptions_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("subscriptions.json"), "{broken").unwrap();
    assert!(load_subscriptions(dir.path()).is_err());
}
