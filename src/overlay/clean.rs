// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed entry removal.
//!
//! Removes everything the registry lists from the target tree, deepest path
//! first, so children are always handled before their ancestors. A managed
//! directory is only removed when everything inside it is managed as well.
//! Afterwards, every directory left empty below the target root is pruned.

use crate::{
    overlay::{Layout, OverlayError, Result},
    path::{depth, validate},
    store::Registry,
};

use std::{
    collections::HashSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Cleanup engine.
///
/// Holds the registry only for the duration of one invocation.
#[derive(Debug)]
pub struct Cleaner<'a> {
    layout: &'a Layout,
    registry: &'a mut Registry,
}

impl<'a> Cleaner<'a> {
    /// Construct new cleaner over project layout and loaded registry.
    pub fn new(layout: &'a Layout, registry: &'a mut Registry) -> Self {
        Self { layout, registry }
    }

    /// Remove all managed entries, then prune empty directories.
    ///
    /// Returns number of removed files, links, and directories. Every path
    /// that was managed at the start is dropped from the registry, whether
    /// or not it could be removed.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::Escape`] if a managed path is absolute or
    ///   leaves the target tree. Nothing is removed in that case.
    /// - Return [`OverlayError::ReadDir`] if a directory cannot be listed.
    /// - Return [`OverlayError::Remove`] if a path cannot be removed.
    #[instrument(skip(self), level = "debug")]
    pub fn run(&mut self) -> Result<usize> {
        let target_root = self.layout.target_root();

        // INVARIANT: Every managed path is checked before the first removal.
        for entry in self.registry.iter() {
            validate(&target_root, &entry.path)?;
        }

        let managed = self
            .registry
            .iter()
            .map(|entry| entry.path.clone())
            .collect::<HashSet<_>>();

        let mut ordered = managed.iter().collect::<Vec<_>>();
        ordered.sort_by(|lhs, rhs| depth(rhs).cmp(&depth(lhs)).then_with(|| rhs.cmp(lhs)));

        let mut removed = 0;
        for path in ordered {
            let full_path = target_root.join(path);
            let metadata = match fs::symlink_metadata(&full_path) {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("{:?} already gone", path.display());
                    self.registry.remove(path);
                    continue;
                }
                Err(err) => {
                    return Err(OverlayError::ReadDir {
                        source: err,
                        path: full_path,
                    })
                }
            };

            if !metadata.is_dir() {
                fs::remove_file(&full_path).map_err(|err| OverlayError::Remove {
                    source: err,
                    path: full_path.clone(),
                })?;
                debug!("removed {:?}", path.display());
                removed += 1;
                self.registry.remove(path);
                continue;
            }

            if is_fully_managed(&full_path, path, &managed)? {
                fs::remove_dir_all(&full_path).map_err(|err| OverlayError::Remove {
                    source: err,
                    path: full_path.clone(),
                })?;
                debug!("removed directory {:?}", path.display());
                removed += 1;
                self.registry.remove(path);
            } else {
                let inner = self.registry.entries_under(path).len().saturating_sub(1);
                warn!(
                    "keep {:?}: custom content alongside {inner} managed entries",
                    path.display()
                );
            }
        }

        // INVARIANT: Never carry dangling entries into the next run.
        for path in &managed {
            self.registry.remove(path);
        }

        prune_empty_dirs(&target_root, true)?;

        Ok(removed)
    }
}

/// Check that every entry inside a directory is managed, recursively.
///
/// `relative` is the path of `dir` relative to the target tree.
fn is_fully_managed(dir: &Path, relative: &Path, managed: &HashSet<PathBuf>) -> Result<bool> {
    let entries = fs::read_dir(dir).map_err(|err| OverlayError::ReadDir {
        source: err,
        path: dir.to_path_buf(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|err| OverlayError::ReadDir {
            source: err,
            path: dir.to_path_buf(),
        })?;
        let child = relative.join(entry.file_name());
        if !managed.contains(&child) {
            return Ok(false);
        }

        let is_dir = entry
            .file_type()
            .map_err(|err| OverlayError::ReadDir {
                source: err,
                path: entry.path(),
            })?
            .is_dir();
        if is_dir && !is_fully_managed(&entry.path(), &child, managed)? {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Remove directories left empty, bottom-up.
///
/// The directory passed in as root is never removed itself.
fn prune_empty_dirs(dir: &Path, is_root: bool) -> Result<()> {
    let read_err = |err: std::io::Error| OverlayError::ReadDir {
        source: err,
        path: dir.to_path_buf(),
    };

    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if entry.file_type().map_err(read_err)?.is_dir() {
            prune_empty_dirs(&entry.path(), false)?;
        }
    }

    // INVARIANT: Re-read after children had their chance to go away.
    let is_empty = fs::read_dir(dir).map_err(read_err)?.next().is_none();
    if is_empty && !is_root {
        fs::remove_dir(dir).map_err(|err| OverlayError::Remove {
            source: err,
            path: dir.to_path_buf(),
        })?;
        debug!("pruned empty directory {:?}", dir.display());
    }

    Ok(())
}
