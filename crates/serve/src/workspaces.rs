// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace resolution: envelope → host/container checkout paths.
//!
//! The resolver enriches each envelope's scope with the workspace ref and
//! the path the runtime will see in-container, creating the host directory
//! on first reference.

use std::path::{Path, PathBuf};

use thiserror::Error;

use holon_adapters::runner::CONTAINER_WORKSPACE;
use holon_core::envelope::EventEnvelope;
use holon_core::workspace::{WorkspaceManifest, WorkspaceRef};

/// Manifest file the external workspace preparer leaves in a checkout.
const MANIFEST_FILE: &str = "workspace-manifest.json";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace not creatable at {path}: {source}")]
    NotCreatable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A resolved checkout root for one envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWorkspace {
    pub workspace_ref: WorkspaceRef,
    pub host_path: PathBuf,
    /// Path under the canonical in-container workspace root.
    pub container_path: String,
}

impl ResolvedWorkspace {
    /// Manifest left by the workspace preparer, when present.
    pub fn manifest(&self) -> Option<WorkspaceManifest> {
        let raw = std::fs::read_to_string(self.host_path.join(MANIFEST_FILE)).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

/// Maps `(repo, ref)` to workspace paths under the agent home.
#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
    host_root: PathBuf,
    /// When false (dry-run), host directories are not created.
    create_dirs: bool,
}

impl WorkspaceResolver {
    pub fn new(host_root: PathBuf) -> Self {
        Self { host_root, create_dirs: true }
    }

    pub fn without_dir_creation(mut self) -> Self {
        self.create_dirs = false;
        self
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    /// Resolve the workspace for an envelope and enrich its scope with
    /// `workspace_ref` and the in-container `workspace_path`.
    pub fn resolve(
        &self,
        envelope: &mut EventEnvelope,
    ) -> Result<ResolvedWorkspace, WorkspaceError> {
        let workspace_ref = WorkspaceRef::for_envelope(envelope);
        let rel = workspace_ref.rel_path();
        let host_path = self.host_root.join(&rel);
        if self.create_dirs {
            std::fs::create_dir_all(&host_path)
                .map_err(|source| WorkspaceError::NotCreatable { path: host_path.clone(), source })?;
        }

        let container_path = format!("{}/{}", CONTAINER_WORKSPACE, rel.display());

        envelope.scope.workspace_ref = workspace_ref.to_string();
        envelope.scope.workspace_path = container_path.clone();

        Ok(ResolvedWorkspace { workspace_ref, host_path, container_path })
    }
}

#[cfg(test)]
#[path = "workspaces_tests.rs"]
mod tests;
