// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn home(dir: &tempfile::TempDir) -> AgentHome {
    AgentHome::open("a1", dir.path().join("a1")).unwrap()
}

#[test]
fn open_materializes_layout() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    assert!(home.run_dir().is_dir());
    assert!(home.workspaces_dir().join("run").is_dir());
    assert!(home.controller_state_dir().is_dir());
    assert!(home.runtime_input_dir().is_dir());
    assert!(home.runtime_output_dir().is_dir());
}

#[test]
fn lock_writes_own_pid() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    let lock = home.lock().unwrap();
    let recorded = std::fs::read_to_string(home.lock_path()).unwrap();
    assert_eq!(recorded.trim(), std::process::id().to_string());
    drop(lock);
    assert!(!home.lock_path().exists());
}

#[test]
fn lock_held_by_live_pid_fails() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    // Our own PID is certainly alive.
    std::fs::write(home.lock_path(), format!("{}\n", std::process::id())).unwrap();
    match home.lock() {
        Err(HomeError::LockHeld { pid }) => assert_eq!(pid, std::process::id() as i32),
        other => panic!("expected LockHeld, got {other:?}"),
    }
}

#[test]
fn stale_lock_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    // PID 1 is alive but unkillable by us (EPERM → conservative alive), so
    // use an absurdly high PID that cannot exist.
    std::fs::write(home.lock_path(), "1073741823\n").unwrap();
    let _lock = home.lock().unwrap();
    let recorded = std::fs::read_to_string(home.lock_path()).unwrap();
    assert_eq!(recorded.trim(), std::process::id().to_string());
}

#[test]
fn garbage_lock_content_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    std::fs::write(home.lock_path(), "not-a-pid\n").unwrap();
    assert!(home.lock().is_ok());
}

#[test]
fn missing_role_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    assert!(matches!(home.load_role(), Err(HomeError::RoleMissing(_))));
}

#[test]
fn empty_role_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    std::fs::write(home.role_path(), "  \n").unwrap();
    assert!(matches!(home.load_role(), Err(HomeError::RoleEmpty(_))));
}

#[test]
fn role_is_inferred_from_content() {
    let dir = tempfile::tempdir().unwrap();
    let home = home(&dir);
    std::fs::write(home.role_path(), "---\nrole: dev\n---\nBuild things.\n").unwrap();
    assert_eq!(home.load_role().unwrap(), holon_core::Role::Dev);
}
