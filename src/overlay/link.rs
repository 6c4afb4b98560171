// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link materialization.
//!
//! Materialization happens in two passes for each mapping. The enumeration
//! pass, [`plan_mapping`], only reads the source tree and produces a list of
//! [`LinkPlan`] pairs. The mutation pass then validates each target, clears
//! the way when forced, creates the link, and records it in the registry.
//!
//! Only leaf files are ever materialized. Directories of the source tree
//! are recreated as plain directories in the target tree as needed, which
//! keeps hard links and copies restricted to files.
//!
//! # Ignore File Exception
//!
//! A target whose name ends in `.gitignore` is always copied no matter
//! which link mode was requested. Version control only honors ignore files
//! that are real files.

use crate::{
    config::{LinkMode, MappingSpec},
    overlay::{Layout, OverlayError, Result},
    path::{normalize, relative_path, validate},
    store::Registry,
};

use ignore::WalkBuilder;
use std::{
    fs::{self, Metadata},
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Reserved ignore file name that must never be linked.
pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// One source file to expose at one target path.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct LinkPlan {
    /// Path relative to source tree.
    pub source: PathBuf,

    /// Path relative to target tree.
    pub target: PathBuf,
}

/// Enumerate every (source, target) pair of a mapping.
///
/// A directory source yields one pair per file beneath it, preserving the
/// directory structure under the mapping target. A single file source maps
/// onto the target directly. A source pattern with glob metacharacters is
/// expanded first, and each match is treated as its own source.
///
/// Reads the source tree, but never mutates anything.
///
/// # Errors
///
/// - Return [`OverlayError::Escape`] if the source is absolute or leaves the
///   source tree.
/// - Return [`OverlayError::SourceNotFound`] if the source does not exist,
///   or a pattern matches nothing.
/// - Return [`OverlayError::Pattern`] if a pattern is malformed.
/// - Return [`OverlayError::Walk`] if a source directory cannot be walked.
pub fn plan_mapping(source_root: &Path, mapping: &MappingSpec) -> Result<Vec<LinkPlan>> {
    validate(source_root, mapping.source())?;
    if !is_pattern(mapping.source()) {
        return plan_source(source_root, &normalize(mapping.source()), mapping.target());
    }

    let matches = expand_pattern(source_root, mapping.source())?;
    if matches.is_empty() {
        return Err(OverlayError::SourceNotFound {
            path: source_root.join(mapping.source()),
        });
    }

    let prefix = literal_prefix(mapping.source());
    let mut plans = Vec::new();
    for source in matches {
        let target = if mapping.has_distinct_target() {
            let rest = source.strip_prefix(&prefix).unwrap_or(source.as_path());
            mapping.target().join(rest)
        } else {
            source.clone()
        };
        plans.extend(plan_source(source_root, &source, &target)?);
    }

    Ok(plans)
}

fn plan_source(source_root: &Path, source: &Path, target: &Path) -> Result<Vec<LinkPlan>> {
    let full_path = source_root.join(source);
    let metadata = fs::metadata(&full_path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => OverlayError::SourceNotFound {
            path: full_path.clone(),
        },
        _ => OverlayError::ReadSource {
            source: err,
            path: full_path.clone(),
        },
    })?;

    if !metadata.is_dir() {
        return Ok(vec![LinkPlan {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
        }]);
    }

    let mut plans = Vec::new();
    let walker = WalkBuilder::new(&full_path)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|lhs, rhs| lhs.cmp(rhs))
        .build();

    for entry in walker {
        let entry = entry.map_err(|err| OverlayError::Walk {
            source: err,
            path: full_path.clone(),
        })?;

        // INVARIANT: Directories themselves are never linked, only leaf files.
        if entry.file_type().is_some_and(|kind| kind.is_dir()) {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(&full_path) else {
            continue;
        };
        plans.push(LinkPlan {
            source: source.join(relative),
            target: target.join(relative),
        });
    }

    Ok(plans)
}

fn is_pattern(path: &Path) -> bool {
    path.to_string_lossy().contains(['*', '?', '['])
}

fn literal_prefix(pattern: &Path) -> PathBuf {
    normalize(pattern)
        .components()
        .take_while(|component| !is_pattern(Path::new(component.as_os_str())))
        .collect()
}

fn expand_pattern(source_root: &Path, pattern: &Path) -> Result<Vec<PathBuf>> {
    let root = glob::Pattern::escape(source_root.to_string_lossy().as_ref());
    let full_pattern = format!("{root}/{}", pattern.to_string_lossy());
    let paths = glob::glob(&full_pattern).map_err(|err| OverlayError::Pattern {
        source: err,
        pattern: pattern.to_string_lossy().into_owned(),
    })?;

    let mut matches = Vec::new();
    for path in paths {
        let path = path.map_err(|err| OverlayError::ReadSource {
            path: err.path().to_path_buf(),
            source: err.into_error(),
        })?;

        if let Ok(relative) = path.strip_prefix(source_root) {
            matches.push(normalize(relative));
        }
    }

    Ok(matches)
}

/// Link materializer.
///
/// Holds the registry only for the duration of one invocation.
#[derive(Debug)]
pub struct Materializer<'a> {
    layout: &'a Layout,
    registry: &'a mut Registry,
}

impl<'a> Materializer<'a> {
    /// Construct new materializer over project layout and loaded registry.
    pub fn new(layout: &'a Layout, registry: &'a mut Registry) -> Self {
        Self { layout, registry }
    }

    /// Materialize all mappings in order.
    ///
    /// Stops at the first failure. Entries recorded before the failure stay
    /// in the registry.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError`] of the first mapping that fails.
    pub fn run(
        &mut self,
        mappings: &[MappingSpec],
        link_mode: LinkMode,
        force: bool,
    ) -> Result<Vec<PathBuf>> {
        let source_root = self.layout.source_root();
        let mut created = Vec::new();

        for mapping in mappings {
            debug!("materialize {:?}", mapping.source().display());
            for plan in plan_mapping(&source_root, mapping)? {
                created.push(self.apply(&plan, link_mode, force)?);
            }
        }

        Ok(created)
    }

    /// Materialize one planned pair.
    ///
    /// Returns target path relative to target tree.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::Escape`] if target leaves target tree.
    /// - Return [`OverlayError::TargetExists`] if target exists and `force`
    ///   is not set.
    /// - Return [`OverlayError::CreateDir`], [`OverlayError::Remove`], or
    ///   [`OverlayError::CreateLink`] on file system failure.
    #[instrument(skip(self), level = "debug")]
    pub fn apply(
        &mut self,
        plan: &LinkPlan,
        link_mode: LinkMode,
        force: bool,
    ) -> Result<PathBuf> {
        let target_root = self.layout.target_root();
        let target = validate(&target_root, &plan.target)?;
        let source = normalize(&plan.source);
        let source_path = normalize(self.layout.source_root().join(&source));
        let target_path = normalize(target_root.join(&target));

        if let Some(parent) = target_path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| OverlayError::CreateDir {
                source: err,
                path: target_path.clone(),
            })?;
        }

        match fs::symlink_metadata(&target_path) {
            Ok(metadata) => {
                if !force {
                    return Err(OverlayError::TargetExists { path: target_path });
                }
                remove_existing(&target_path, &metadata)?;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(OverlayError::ReadDir {
                    source: err,
                    path: target_path,
                })
            }
        }

        let link_mode = if is_ignore_file(&target) {
            warn!("{:?} is being copied for compatibility", target.display());
            LinkMode::Copy
        } else {
            link_mode
        };

        create_link(&source_path, &target_path, link_mode)?;
        debug!(
            "{link_mode} {:?} -> {:?}",
            target_path.display(),
            source_path.display()
        );
        self.registry.upsert(target.clone(), link_mode, source);

        Ok(target)
    }
}

fn is_ignore_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(IGNORE_FILE_NAME))
}

fn remove_existing(path: &Path, metadata: &Metadata) -> Result<()> {
    debug!("remove existing target {:?}", path.display());
    let result = if metadata.is_dir() {
        // INVARIANT: Only empty directories give way, never custom content.
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| OverlayError::Remove {
        source: err,
        path: path.to_path_buf(),
    })
}

fn create_link(source: &Path, target: &Path, link_mode: LinkMode) -> Result<()> {
    let result = match link_mode {
        LinkMode::Symlink => {
            // INVARIANT: Symlinks are relative to the target's parent so the
            // project stays relocatable.
            let parent = target
                .parent()
                .unwrap_or(Path::new(Component::CurDir.as_os_str()));
            symlink(&relative_path(parent, source), target)
        }
        LinkMode::Hardlink => fs::hard_link(source, target),
        LinkMode::Copy => fs::copy(source, target).map(|_| ()),
    };

    result.map_err(|err| OverlayError::CreateLink {
        source: err,
        mode: link_mode,
        source_path: source.to_path_buf(),
        target_path: target.to_path_buf(),
    })
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}
