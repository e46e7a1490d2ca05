// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable state files for the serve controller.
//!
//! Everything here is a small JSON artifact replaced atomically via
//! write-temp-then-rename ([`DurableSlot`]): a reader always observes the
//! old or the new full file, never a partial one. Nothing fsyncs; the
//! system tolerates losing the last write on host crash.

mod slot;

pub use slot::DurableSlot;

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from durable state operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted `turn_id → event_id` map.
///
/// Reloaded on boot so cancel requests survive process restarts. Flushed
/// atomically after every mutation; mutations are serialized by an
/// internal mutex.
pub struct TurnEventIndex {
    slot: DurableSlot,
    map: Mutex<HashMap<String, String>>,
}

impl TurnEventIndex {
    /// Load the index from disk (missing file → empty map).
    pub fn load(path: PathBuf) -> Result<Self, StorageError> {
        let slot = DurableSlot::new(path);
        let map: HashMap<String, String> = slot.read()?.unwrap_or_default();
        Ok(Self { slot, map: Mutex::new(map) })
    }

    pub fn get(&self, turn_id: &str) -> Option<String> {
        self.map.lock().get(turn_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Record a correlation and flush.
    pub fn insert(&self, turn_id: &str, event_id: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock();
        map.insert(turn_id.to_string(), event_id.to_string());
        self.slot.write(&*map)
    }

    /// Remove a correlation and flush. Removing an absent key is a no-op
    /// (idempotent to double-clears).
    pub fn remove(&self, turn_id: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock();
        if map.remove(turn_id).is_none() {
            return Ok(());
        }
        self.slot.write(&*map)
    }
}

/// Goal-state file seeded on first controller build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalState {
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub milestones: Vec<String>,
    #[serde(default)]
    pub active_issues: Vec<String>,
    /// RFC 3339 timestamp of the last update.
    pub updated_at: String,
}

impl GoalState {
    pub fn initial(updated_at: impl Into<String>) -> Self {
        Self {
            goal: String::new(),
            milestones: Vec::new(),
            active_issues: Vec::new(),
            updated_at: updated_at.into(),
        }
    }
}

/// Last-known controller session, persisted so the exec fallback and
/// cancel-by-index keep working across serve restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerSessionRecord {
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub socket_path: String,
    #[serde(default)]
    pub restart_attempts: u32,
    #[serde(default)]
    pub started_at: String,
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
