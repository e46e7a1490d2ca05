// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace reference handling: `<owner>/<repo>@<track>`.
//!
//! A workspace ref names the checkout root an envelope dispatches into.
//! Path segments are sanitized so repo names, branch refs, and commit SHAs
//! are always safe directory names.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::envelope::EventEnvelope;

/// Fixed track used when an envelope carries no ref information.
pub const DEFAULT_TRACK: &str = "default";

/// Fallback repo for envelopes with no repository scope (RPC, timers).
pub const LOCAL_REPO: &str = "local/rpc";

/// Sanitize one path segment: `/ \ : space` become `_`, separator runs are
/// trimmed from both ends, and an empty result collapses to `default`.
pub fn sanitize_segment(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | ' ') { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        DEFAULT_TRACK.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Identifier for a checkout root: `<owner>/<repo>@<track>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    pub owner: String,
    pub repo: String,
    pub track: String,
}

impl WorkspaceRef {
    /// Build a ref from a repo string (`owner/name`, owner defaulting to
    /// `local`) and a raw track. All segments are sanitized.
    pub fn from_parts(repo: &str, track: &str) -> Self {
        let (owner, name) = match repo.split_once('/') {
            Some((owner, name)) => (owner, name),
            None => ("local", repo),
        };
        Self {
            owner: sanitize_segment(owner),
            repo: sanitize_segment(name),
            track: sanitize_segment(track),
        }
    }

    /// Deduce the ref for an envelope: repo from the scope, then the
    /// payload hint, then `local/rpc`; track from the pull-request head
    /// SHA, then the head ref, then the fixed default track.
    pub fn for_envelope(envelope: &EventEnvelope) -> Self {
        let repo = if !envelope.scope.repo.is_empty() {
            envelope.scope.repo.clone()
        } else if let Some(hint) = envelope.payload_repo() {
            hint.to_string()
        } else {
            LOCAL_REPO.to_string()
        };

        let track = envelope
            .pull_request_head_sha()
            .or_else(|| envelope.head_ref())
            .unwrap_or(DEFAULT_TRACK);

        Self::from_parts(&repo, track)
    }

    /// Path relative to a workspace root: `repos/<owner>/<repo>/<track>`.
    pub fn rel_path(&self) -> PathBuf {
        PathBuf::from("repos").join(&self.owner).join(&self.repo).join(&self.track)
    }
}

impl std::fmt::Display for WorkspaceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.track)
    }
}

/// Manifest left behind by the workspace preparer, read to reconstruct a
/// clean publish workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceManifest {
    #[serde(default)]
    pub source: String,
    #[serde(default, rename = "ref")]
    pub r#ref: String,
    #[serde(default)]
    pub head_sha: String,
    #[serde(default)]
    pub is_shallow: bool,
    #[serde(default)]
    pub has_history: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
