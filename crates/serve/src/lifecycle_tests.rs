// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn home(dir: &tempfile::TempDir) -> AgentHome {
    AgentHome::open("a1", dir.path().join("a1")).unwrap()
}

#[test]
fn input_mode_selection() {
    let mut options = ServeOptions::default();
    assert_eq!(options.input_mode(), "subscription");

    options.no_subscriptions = true;
    assert_eq!(options.input_mode(), "webhook-legacy");

    options.input = Some("-".into());
    assert_eq!(options.input_mode(), "stdin-file");
}

#[test]
fn home_root_defaults_under_agent_id() {
    let options = ServeOptions { agent_id: "astro".into(), ..Default::default() };
    assert!(options.home_root().ends_with(".holon/agents/astro"));

    let explicit = ServeOptions {
        agent_home: Some(PathBuf::from("/data/agents/astro")),
        ..Default::default()
    };
    assert_eq!(explicit.home_root(), PathBuf::from("/data/agents/astro"));
}

#[test]
#[serial_test::serial]
fn image_resolution_order() {
    std::env::remove_var("HOLON_RUNTIME_IMAGE");
    let mut options = ServeOptions::default();
    assert_eq!(options.resolved_image(), "holon-runtime:latest");

    std::env::set_var("HOLON_RUNTIME_IMAGE", "holon-runtime:nightly");
    assert_eq!(options.resolved_image(), "holon-runtime:nightly");

    options.runtime_image = Some("holon-runtime:pinned".into());
    assert_eq!(options.resolved_image(), "holon-runtime:pinned");

    std::env::remove_var("HOLON_RUNTIME_IMAGE");
}

#[test]
fn stdin_mode_builds_file_source_plus_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    let options = ServeOptions {
        input: Some("/tmp/events.ndjson".into()),
        tick_interval: Some(Duration::from_secs(60)),
        ..Default::default()
    };
    let sources = build_sources(&options, &home);
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].name(), "stdin-file");
    assert_eq!(sources[1].name(), "timer");
}

#[test]
fn webhook_legacy_without_port_has_no_sources() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    let options = ServeOptions { no_subscriptions: true, ..Default::default() };
    assert!(build_sources(&options, &home).is_empty());

    let with_port = ServeOptions {
        no_subscriptions: true,
        webhook_port: Some(9900),
        ..Default::default()
    };
    let sources = build_sources(&with_port, &home);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name(), "webhook");
}

#[test]
fn subscription_mode_uses_manager_source() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    let sources = build_sources(&ServeOptions::default(), &home);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name(), "subscription");
}

#[test]
fn diagnostics_capture_mode_and_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    std::fs::write(
        home.root().join("subscriptions.json"),
        r#"[{"repo":"acme/widgets","reason":"owner"}]"#,
    )
    .unwrap();

    let options = ServeOptions { repo: Some("acme/extra".into()), ..Default::default() };
    let diagnostics = build_diagnostics(&options, &home, holon_core::Role::Pm).unwrap();

    assert_eq!(diagnostics.input_mode, "subscription");
    assert_eq!(diagnostics.subscription_reason.as_deref(), Some("owner"));
    assert_eq!(diagnostics.subscribed_repos, vec!["acme/widgets", "acme/extra"]);
    assert!(diagnostics
        .warnings
        .iter()
        .any(|w| w.contains("passive")), "warnings: {:?}", diagnostics.warnings);
}

#[test]
fn diagnostics_flag_deprecated_webhook_mode() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    let options = ServeOptions {
        no_subscriptions: true,
        webhook_port: Some(9900),
        dry_run: true,
        ..Default::default()
    };
    let diagnostics = build_diagnostics(&options, &home, holon_core::Role::Dev).unwrap();
    assert_eq!(diagnostics.input_mode, "webhook-legacy");
    assert_eq!(diagnostics.role, "dev");
    assert!(diagnostics.warnings.iter().any(|w| w.contains("deprecated")));
    assert!(diagnostics.warnings.iter().any(|w| w.contains("dry-run")));
}

#[test]
fn diagnostics_flag_misplaced_dev_source() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    let options = ServeOptions {
        runtime_dev_agent_source: Some(PathBuf::from("/src/agent")),
        runtime_mode: RuntimeMode::Prod,
        ..Default::default()
    };
    let diagnostics = build_diagnostics(&options, &home, holon_core::Role::Pm).unwrap();
    assert!(diagnostics.warnings.iter().any(|w| w.contains("ignored outside")));
    assert_eq!(
        diagnostics.dev_agent_source,
        Some(DevAgentSource { path: "/src/agent".into(), origin: "flag".into() })
    );
}
