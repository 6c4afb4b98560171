// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! State store management and manipulation.
//!
//! Oxilay records every file system object it creates inside the target tree
//! into a __registry__. The registry is the sole source of truth for what
//! Oxilay owns. Anything in the target tree that is not listed in the
//! registry is custom content that must never be touched.
//!
//! # Registry Layout
//!
//! The registry is persisted as a JSON document next to the target tree:
//!
//! ```json
//! {
//!   "managed_files": [
//!     { "path": "library/x.txt", "linkMode": "symlink", "source": "src/lib/x.txt" }
//!   ]
//! }
//! ```
//!
//! A missing registry file is the same as an empty registry. A registry file
//! that exists but cannot be parsed is a hard error, because guessing at what
//! Oxilay owns could destroy custom content. The same goes for entries whose
//! paths are absolute or climb out of their tree.

use crate::{config::LinkMode, path::validate};

use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

/// One file system object that Oxilay is responsible for.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ManagedEntry {
    /// Path relative to target tree. Unique key of the registry.
    pub path: PathBuf,

    /// Link mode used to create the entry.
    #[serde(rename = "linkMode")]
    pub link_mode: LinkMode,

    /// Path relative to source tree.
    pub source: PathBuf,
}

/// Ordered collection of managed entries.
///
/// # Invariant
///
/// - At most one entry exists per path.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Registry {
    #[serde(rename = "managed_files", default)]
    entries: Vec<ManagedEntry>,
}

impl Registry {
    /// Construct new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace or insert entry by path.
    ///
    /// A replaced entry loses its old position, and the new entry is placed
    /// at the end.
    pub fn upsert(
        &mut self,
        path: impl Into<PathBuf>,
        link_mode: LinkMode,
        source: impl Into<PathBuf>,
    ) {
        let path = path.into();
        self.entries.retain(|entry| entry.path != path);
        self.entries.push(ManagedEntry {
            path,
            link_mode,
            source: source.into(),
        });
    }

    /// Remove entry by path.
    ///
    /// Does nothing if no entry exists for the path.
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        self.entries.retain(|entry| entry.path != path.as_ref());
    }

    /// Get entry by path.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&ManagedEntry> {
        self.entries.iter().find(|entry| entry.path == path.as_ref())
    }

    /// Check if path is managed.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).is_some()
    }

    /// All entries whose path equals `dir` or is nested anywhere below it.
    pub fn entries_under(&self, dir: impl AsRef<Path>) -> Vec<&ManagedEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.path.starts_with(dir.as_ref()))
            .collect()
    }

    /// Iterate through entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ManagedEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry persistence at a fixed file path.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_path: PathBuf,
}

impl StateStore {
    /// Construct new state store for registry file at target path.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    /// Path to registry file.
    pub fn path(&self) -> &Path {
        self.state_path.as_path()
    }

    /// Load registry.
    ///
    /// Returns an empty registry if the registry file does not exist yet.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Read`] if registry file cannot be read.
    /// - Return [`StoreError::CorruptState`] if registry file cannot be
    ///   parsed.
    /// - Return [`StoreError::EscapingEntry`] if an entry is absolute or
    ///   leaves its tree.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self) -> Result<Registry> {
        let data = match fs::read(&self.state_path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no registry at {:?}, start empty", self.state_path.display());
                return Ok(Registry::new());
            }
            Err(err) => {
                return Err(StoreError::Read {
                    source: err,
                    state_path: self.state_path.clone(),
                })
            }
        };

        let registry: Registry =
            serde_json::from_slice(&data).map_err(|err| StoreError::CorruptState {
                source: err,
                state_path: self.state_path.clone(),
            })?;

        for entry in registry.iter() {
            for path in [&entry.path, &entry.source] {
                validate("", path).map_err(|err| StoreError::EscapingEntry {
                    source: err,
                    state_path: self.state_path.clone(),
                })?;
            }
        }

        Ok(registry)
    }

    /// Save registry.
    ///
    /// Writes to a sibling temporary file first, then renames it over the
    /// registry file so readers never observe a half written registry.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Serialize`] if registry cannot be serialized.
    /// - Return [`StoreError::Write`] if registry file cannot be written.
    #[instrument(skip(self, registry), level = "debug")]
    pub fn save(&self, registry: &Registry) -> Result<()> {
        let data = serde_json::to_vec_pretty(registry).map_err(StoreError::Serialize)?;
        let write_err = |err: std::io::Error| StoreError::Write {
            source: err,
            state_path: self.state_path.clone(),
        };

        let mut staging = self.state_path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, data).map_err(write_err)?;
        fs::rename(&staging, &self.state_path).map_err(write_err)?;
        debug!(
            "saved {} managed entries to {:?}",
            registry.len(),
            self.state_path.display()
        );

        Ok(())
    }
}

/// State store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Registry file exists but cannot be parsed.
    #[error("corrupt registry at {:?}", state_path.display())]
    CorruptState {
        #[source]
        source: serde_json::Error,
        state_path: PathBuf,
    },

    /// Registry entry is absolute or leaves its tree.
    #[error("registry at {:?} holds an escaping entry", state_path.display())]
    EscapingEntry {
        #[source]
        source: crate::path::EscapeError,
        state_path: PathBuf,
    },

    /// Registry file cannot be read from.
    #[error("failed to read registry at {:?}", state_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        state_path: PathBuf,
    },

    /// Registry file cannot be written to.
    #[error("failed to write registry at {:?}", state_path.display())]
    Write {
        #[source]
        source: std::io::Error,
        state_path: PathBuf,
    },

    /// Registry cannot be serialized.
    #[error(transparent)]
    Serialize(serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
