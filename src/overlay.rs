// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Managed link lifecycle.
//!
//! An __overlay__ exposes a managed set of files from a pinned upstream
//! source tree inside a working directory called the target tree. Each file
//! is exposed through a symbolic link, a hard link, or a plain copy. Oxilay
//! remembers everything it created in a registry so that it can later undo
//! exactly that overlay without disturbing custom content that the user
//! placed in the target tree by hand.
//!
//! # Project Layout
//!
//! All paths are derived from one project root:
//!
//! - `<root>/.upstream` is the source tree.
//! - `<root>/overlay` is the target tree.
//! - `<root>/.oxilay-state.json` is the registry.
//! - `<root>/.gitignore` holds a managed block listing every managed path.
//!
//! # Lifecycle
//!
//! Every mutating operation loads the registry, mutates it in memory, and
//! saves it at the end. Concurrent invocations against the same project are
//! not guarded, so callers must run one at a time.
//!
//! # See Also
//!
//! 1. [`link`] for materialization.
//! 2. [`clean`] for removal.
//! 3. [`block`] for the ignore file block.

pub mod block;
pub mod clean;
pub mod link;

use crate::{
    config::{LinkMode, MappingSpec},
    overlay::{block::IgnoreFile, clean::Cleaner, link::Materializer},
    path::{normalize, validate},
    store::{Registry, StateStore},
};

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use tracing::{error, info, instrument};

/// Directory name of source tree under project root.
pub const SOURCE_DIR: &str = ".upstream";

/// Directory name of target tree under project root.
pub const TARGET_DIR: &str = "overlay";

/// File name of registry under project root.
pub const STATE_FILE: &str = ".oxilay-state.json";

/// File name of ignore rules file under project root.
pub const IGNORE_FILE: &str = ".gitignore";

/// Fixed locations of an overlay project.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Construct new layout rooted at target project directory.
    ///
    /// The root is lexically normalized, so every derived path shares the
    /// same frame of reference when relative symlinks are computed.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = normalize(root);
        let root = if root.as_os_str().is_empty() {
            PathBuf::from(Component::CurDir.as_os_str())
        } else {
            root
        };

        Self { root }
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    pub fn source_root(&self) -> PathBuf {
        self.root.join(SOURCE_DIR)
    }

    pub fn target_root(&self) -> PathBuf {
        self.root.join(TARGET_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn ignore_path(&self) -> PathBuf {
        self.root.join(IGNORE_FILE)
    }
}

/// Overlay of a source tree onto a target tree.
///
/// Provides the three entry points of the lifecycle: [`Overlay::materialize`],
/// [`Overlay::clean`], and [`Overlay::validate`]. Everything an operation
/// needs is passed in explicitly.
#[derive(Debug, Clone)]
pub struct Overlay {
    layout: Layout,
    store: StateStore,
    ignore: IgnoreFile,
}

impl Overlay {
    /// Construct new overlay for project layout.
    pub fn new(layout: Layout) -> Self {
        let store = StateStore::new(layout.state_path());
        let ignore = IgnoreFile::new(layout.ignore_path());

        Self {
            layout,
            store,
            ignore,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Validate path relative to target tree.
    ///
    /// Returns normalized form of path relative to the target tree.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::Escape`] if path is absolute or leaves the
    ///   target tree.
    pub fn validate(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        Ok(validate(self.layout.target_root(), path)?)
    }

    /// Current registry of managed entries.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::Store`] if registry cannot be loaded.
    pub fn registry(&self) -> Result<Registry> {
        Ok(self.store.load()?)
    }

    /// Materialize mappings from source tree into target tree.
    ///
    /// Returns every created path relative to the target tree, in creation
    /// order. Entries created before a failure stay recorded in the registry,
    /// so a retry with `force` set completes the overlay.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::SourceNotFound`] if a mapping has no source.
    /// - Return [`OverlayError::Escape`] if a target leaves the target tree.
    /// - Return [`OverlayError::TargetExists`] if a target exists and `force`
    ///   is not set.
    /// - Return [`OverlayError::Store`] if registry cannot be loaded or saved.
    /// - Return any of the I/O variants of [`OverlayError`] on file system
    ///   failure.
    #[instrument(skip(self, mappings), level = "debug")]
    pub fn materialize(
        &self,
        mappings: &[MappingSpec],
        link_mode: LinkMode,
        force: bool,
    ) -> Result<Vec<PathBuf>> {
        let mut registry = self.store.load()?;
        let outcome =
            Materializer::new(&self.layout, &mut registry).run(mappings, link_mode, force);

        let created = match outcome {
            Ok(created) => created,
            Err(err) => {
                // INVARIANT: Partial progress is recorded, never rolled back.
                if let Err(persist_err) = self.persist(&registry) {
                    error!("registry may be stale after failed materialize: {persist_err}");
                }
                return Err(err);
            }
        };

        self.persist(&registry)?;
        info!("materialized {} managed entries", created.len());

        Ok(created)
    }

    /// Remove every managed entry from target tree.
    ///
    /// Returns number of removed files, links, and directories. Custom
    /// content is never touched, while directories left empty are pruned.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::TargetRootMissing`] if target tree does not
    ///   exist.
    /// - Return [`OverlayError::Escape`] if a managed path leaves the target
    ///   tree.
    /// - Return [`OverlayError::Store`] if registry cannot be loaded or saved.
    /// - Return any of the I/O variants of [`OverlayError`] on file system
    ///   failure.
    #[instrument(skip(self), level = "debug")]
    pub fn clean(&self) -> Result<usize> {
        let target_root = self.layout.target_root();
        // INVARIANT: A symlinked target tree counts when it leads to a directory.
        match std::fs::metadata(&target_root) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(OverlayError::TargetRootMissing { path: target_root }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(OverlayError::TargetRootMissing { path: target_root })
            }
            Err(err) => {
                return Err(OverlayError::ReadDir {
                    source: err,
                    path: target_root,
                })
            }
        }

        let mut registry = self.store.load()?;
        let removed = Cleaner::new(&self.layout, &mut registry).run()?;
        self.persist(&registry)?;
        info!("removed {removed} managed files and directories");

        Ok(removed)
    }

    fn persist(&self, registry: &Registry) -> Result<()> {
        self.store.save(registry)?;
        let rules = registry
            .iter()
            .map(|entry| ignore_rule(Path::new(TARGET_DIR).join(&entry.path)))
            .collect::<Vec<_>>();
        self.ignore.refresh(rules)?;

        Ok(())
    }
}

/// Render path as ignore rule with forward slashes.
fn ignore_rule(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Overlay lifecycle error types.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// Target path leaves the target tree.
    #[error(transparent)]
    Escape(#[from] crate::path::EscapeError),

    /// Registry cannot be loaded or saved.
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    /// Ignore file block cannot be refreshed.
    #[error(transparent)]
    Ignore(#[from] crate::overlay::block::IgnoreError),

    /// Mapping source does not exist in source tree.
    #[error("source does not exist: {:?}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Target already exists and force was not requested.
    #[error("target already exists: {:?}", path.display())]
    TargetExists { path: PathBuf },

    /// Target tree does not exist.
    #[error("target tree does not exist: {:?}", path.display())]
    TargetRootMissing { path: PathBuf },

    /// Mapping source pattern is malformed.
    #[error("invalid source pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Source tree cannot be walked.
    #[error("failed to walk source directory {:?}", path.display())]
    Walk {
        #[source]
        source: ignore::Error,
        path: PathBuf,
    },

    /// Source cannot be inspected.
    #[error("failed to read source {:?}", path.display())]
    ReadSource {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Directory cannot be listed or inspected.
    #[error("failed to read directory {:?}", path.display())]
    ReadDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Parent directories of a target cannot be created.
    #[error("failed to create directory for {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Link, hard link, or copy cannot be created.
    #[error("failed to {mode} {:?} to {:?}", source_path.display(), target_path.display())]
    CreateLink {
        #[source]
        source: std::io::Error,
        mode: LinkMode,
        source_path: PathBuf,
        target_path: PathBuf,
    },

    /// Existing or managed path cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = OverlayError> = std::result::Result<T, E>;
