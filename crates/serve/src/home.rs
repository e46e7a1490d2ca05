// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent home: the durable directory holding an agent's identity, role,
//! workspaces, and state, plus the exclusive PID lock guarding it.
//!
//! Layout under the home root:
//!
//! ```text
//! agent.lock                                  exclusive PID file
//! ROLE.md                                     role definition (required)
//! run/agent.sock                              runtime RPC socket
//! workspaces/{run,repos,…}                    workspace roots
//! state/controller-state/…                    ledger, index, goal state
//! state/controller-runtime/{input,output}     staged runtime dirs
//! state/serve-startup-diagnostics.json        boot snapshot
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use holon_core::Role;

/// Errors from agent home operations. All are fatal at startup.
#[derive(Debug, Error)]
pub enum HomeError {
    #[error("agent home not creatable at {path}: {source}")]
    NotCreatable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("agent home is locked by live pid {pid}")]
    LockHeld { pid: i32 },

    #[error("role file missing at {0}")]
    RoleMissing(PathBuf),

    #[error("role file is empty at {0}")]
    RoleEmpty(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to an agent's home directory. Creating one materializes the
/// directory layout; it does not acquire the lock.
#[derive(Debug, Clone)]
pub struct AgentHome {
    pub agent_id: String,
    root: PathBuf,
}

impl AgentHome {
    /// Open (creating if needed) the home layout for an agent.
    pub fn open(agent_id: impl Into<String>, root: PathBuf) -> Result<Self, HomeError> {
        let home = Self { agent_id: agent_id.into(), root };
        for dir in [
            home.root.clone(),
            home.run_dir(),
            home.workspaces_dir(),
            home.workspaces_dir().join("run"),
            home.controller_state_dir(),
            home.runtime_input_dir(),
            home.runtime_output_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| HomeError::NotCreatable { path: dir.clone(), source })?;
        }
        Ok(home)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("agent.lock")
    }

    pub fn role_path(&self) -> PathBuf {
        self.root.join("ROLE.md")
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join("run")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.run_dir().join("agent.sock")
    }

    pub fn workspaces_dir(&self) -> PathBuf {
        self.root.join("workspaces")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn controller_state_dir(&self) -> PathBuf {
        self.state_dir().join("controller-state")
    }

    pub fn runtime_input_dir(&self) -> PathBuf {
        self.state_dir().join("controller-runtime/input")
    }

    pub fn runtime_output_dir(&self) -> PathBuf {
        self.state_dir().join("controller-runtime/output")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.controller_state_dir().join("activity-ledger.ndjson")
    }

    pub fn turn_index_path(&self) -> PathBuf {
        self.controller_state_dir().join("turn-event-index.json")
    }

    pub fn goal_state_path(&self) -> PathBuf {
        self.controller_state_dir().join("goal-state.json")
    }

    pub fn session_record_path(&self) -> PathBuf {
        self.controller_state_dir().join("controller-session.json")
    }

    pub fn claude_config_dir(&self) -> PathBuf {
        self.controller_state_dir().join("claude-config")
    }

    pub fn controller_memory_path(&self) -> PathBuf {
        self.controller_state_dir().join("controller-memory.md")
    }

    pub fn diagnostics_path(&self) -> PathBuf {
        self.state_dir().join("serve-startup-diagnostics.json")
    }

    pub fn serve_log_path(&self) -> PathBuf {
        self.state_dir().join("serve.log")
    }

    /// Acquire the exclusive per-home lock.
    ///
    /// The lock file holds the owning PID. If the file already exists and
    /// its PID is dead, the stale file is reclaimed and creation retried
    /// once.
    pub fn lock(&self) -> Result<HomeLock, HomeError> {
        let path = self.lock_path();
        match try_create_lock(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = read_lock_pid(&path);
                match holder {
                    Some(pid) if pid_alive(pid) => Err(HomeError::LockHeld { pid }),
                    _ => {
                        tracing::warn!(
                            path = %path.display(),
                            stale_pid = holder,
                            "reclaiming stale agent home lock"
                        );
                        std::fs::remove_file(&path)?;
                        match try_create_lock(&path) {
                            Ok(lock) => Ok(lock),
                            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                                Err(HomeError::LockHeld { pid: read_lock_pid(&path).unwrap_or(-1) })
                            }
                            Err(e) => Err(e.into()),
                        }
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load and interpret ROLE.md. Absence and emptiness are hard errors.
    pub fn load_role(&self) -> Result<Role, HomeError> {
        let path = self.role_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HomeError::RoleMissing(path))
            }
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Err(HomeError::RoleEmpty(path));
        }
        Ok(Role::infer(&content))
    }
}

/// Held lock on an agent home. Released (file removed) on drop.
#[derive(Debug)]
pub struct HomeLock {
    path: PathBuf,
}

impl HomeLock {
    /// Explicit release; drop does the same best-effort.
    pub fn release(self) {
        // Drop impl removes the file.
    }
}

impl Drop for HomeLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }
    }
}

/// Atomic exclusive create of the lock file containing our PID.
fn try_create_lock(path: &Path) -> std::io::Result<HomeLock> {
    let mut file = std::fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(HomeLock { path: path.to_path_buf() })
}

fn read_lock_pid(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Probe PID liveness with signal 0. Platforms without `ESRCH`/`EPERM`
/// semantics answer a conservative TRUE.
#[cfg(unix)]
fn pid_alive(pid: i32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        // EPERM: the process exists but belongs to someone else.
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn pid_alive(_pid: i32) -> bool {
    true
}

#[cfg(test)]
#[path = "home_tests.rs"]
mod tests;
