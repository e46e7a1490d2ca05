// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup diagnostics snapshot.
//!
//! One JSON document per boot, written atomically, capturing identity,
//! ingress mode, runtime configuration, and the warnings that explain
//! passive behaviors and deprecated modes.

use serde::{Deserialize, Serialize};

use crate::storage::{DurableSlot, StorageError};

/// Where a dev agent source came from (flag, env, or config file).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DevAgentSource {
    pub path: String,
    pub origin: String,
}

/// Snapshot written to `state/serve-startup-diagnostics.json` on boot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartupDiagnostics {
    pub agent_id: String,
    pub agent_home: String,
    pub state_dir: String,
    pub workspace_root: String,
    #[serde(default)]
    pub config_paths: Vec<String>,
    pub role: String,
    /// `subscription`, `webhook-legacy`, or `stdin-file`.
    pub input_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_reason: Option<String>,
    #[serde(default)]
    pub subscribed_repos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_interval_s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_port: Option<u16>,
    pub runtime_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_agent_source: Option<DevAgentSource>,
    #[serde(default)]
    pub runtime_mounts: Vec<String>,
    /// Human label shown by the log viewer.
    pub preview: String,
    /// Accumulated explanations of passive behaviors and deprecations.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StartupDiagnostics {
    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!(%warning, "startup");
        self.warnings.push(warning);
    }

    /// Write the snapshot atomically.
    pub fn write(&self, slot: &DurableSlot) -> Result<(), StorageError> {
        slot.write(self)
    }
}

#[cfg(test)]
#[path = "diagnostics_tests.rs"]
mod tests;
