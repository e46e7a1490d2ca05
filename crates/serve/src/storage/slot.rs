// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable file slot: atomic JSON replacement.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::StorageError;

/// A single JSON file replaced atomically on every write.
///
/// `write` lands the payload in a `.tmp` sibling and renames it over the
/// slot, so a concurrent reader sees either the previous or the new
/// content in full.
#[derive(Debug, Clone)]
pub struct DurableSlot {
    path: PathBuf,
}

impl DurableSlot {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and deserialize the slot. Missing file → `None`.
    pub fn read<T: DeserializeOwned>(&self) -> Result<Option<T>, StorageError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Serialize and atomically replace the slot content.
    pub fn write<T: Serialize>(&self, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_vec_pretty(value)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io { path: self.path.clone(), source }
    }
}
