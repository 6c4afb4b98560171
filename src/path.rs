// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path validation and lexical path utilities.
//!
//! Every target path that Oxilay is about to touch goes through [`validate`]
//! first. Validation is purely lexical: no file system access is performed,
//! so a path is judged by its components alone. Symbolic links that already
//! exist inside the base directory are not followed.

use std::path::{Component, Path, PathBuf};

/// Validate that a relative path stays inside its base directory.
///
/// Joins `path` onto `base`, resolves `.` and `..` segments, collapses
/// repeated separators, and requires the result to remain lexically inside
/// `base`. Returns the normalized form of `path` relative to `base` on
/// success.
///
/// # Errors
///
/// - Return [`EscapeError::Absolute`] if `path` is absolute.
/// - Return [`EscapeError::Escapes`] if the resolved path leaves `base`.
pub fn validate(base: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let (base, path) = (base.as_ref(), path.as_ref());
    if path.is_absolute() || path.has_root() {
        return Err(EscapeError::Absolute {
            path: path.to_path_buf(),
        });
    }

    let clean_base = normalize(base);
    let clean_path = normalize(base.join(path));
    let escapes = || EscapeError::Escapes {
        base: base.to_path_buf(),
        path: path.to_path_buf(),
    };

    let relative = clean_path
        .strip_prefix(&clean_base)
        .map_err(|_| escapes())?;

    // INVARIANT: Base "" or ".." can still strip cleanly, so check the head.
    if matches!(relative.components().next(), Some(Component::ParentDir)) {
        return Err(escapes());
    }

    Ok(relative.to_path_buf())
}

/// Lexically normalize a path.
///
/// Drops `.` segments, resolves `..` against the preceding normal segment,
/// and collapses repeated separators. Leading `..` segments of a relative
/// path are kept, while `..` directly under a root is discarded, following
/// POSIX path joining semantics. An input that resolves to nothing yields an
/// empty path.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => continue,
                _ => parts.push(component),
            },
            _ => parts.push(component),
        }
    }

    parts.iter().collect()
}

/// Compute lexical relative path from directory `from` to path `to`.
///
/// Both paths should be normalized and of the same kind, i.e., both
/// absolute or both relative to the same directory.
pub fn relative_path(from: impl AsRef<Path>, to: impl AsRef<Path>) -> PathBuf {
    let from = from.as_ref().components().collect::<Vec<_>>();
    let to = to.as_ref().components().collect::<Vec<_>>();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(lhs, rhs)| lhs == rhs)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push(Component::ParentDir);
    }
    for component in &to[common..] {
        relative.push(component);
    }

    relative
}

/// Tree depth of a relative path.
///
/// Counts normal segments only, so trailing separators and `.` segments do
/// not change the result.
pub fn depth(path: impl AsRef<Path>) -> usize {
    path.as_ref()
        .components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .count()
}

/// Path escapes its base directory.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EscapeError {
    /// Absolute paths are never accepted.
    #[error("absolute paths are not allowed: {:?}", path.display())]
    Absolute { path: PathBuf },

    /// Path resolves outside of its base.
    #[error("path {:?} escapes base directory {:?}", path.display(), base.display())]
    Escapes { base: PathBuf, path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = EscapeError> = std::result::Result<T, E>;
