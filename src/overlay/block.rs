// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Ignore file managed block.
//!
//! Managed paths should never be committed into the project repository, so
//! Oxilay keeps a delimited block inside the project's ignore file that lists
//! every path it currently manages. Only the lines between the begin and end
//! markers belong to Oxilay. Everything around the block is user content,
//! and is kept as is, in its original order.
//!
//! # Block Layout
//!
//! ```text
//! # BEGIN OXILAY MANAGED BLOCK - DO NOT EDIT
//! overlay/library/x.txt
//! overlay/test.txt
//! # END OXILAY MANAGED BLOCK
//! ```
//!
//! Rules inside the block are kept sorted without duplicates. A begin marker
//! without a matching end marker claims the rest of the file.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::debug;

/// First line of managed block.
pub const BEGIN_MARKER: &str = "# BEGIN OXILAY MANAGED BLOCK - DO NOT EDIT";

/// Last line of managed block.
pub const END_MARKER: &str = "# END OXILAY MANAGED BLOCK";

/// Manage the block of an ignore file.
#[derive(Debug, Clone)]
pub struct IgnoreFile {
    ignore_path: PathBuf,
}

impl IgnoreFile {
    /// Construct new ignore file manager for file at target path.
    pub fn new(ignore_path: impl Into<PathBuf>) -> Self {
        Self {
            ignore_path: ignore_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        self.ignore_path.as_path()
    }

    /// Edit managed block.
    ///
    /// Read current ignore file into [`IgnoreBlockEdit`] instance, and
    /// directly edit the block before writing the results back. A missing
    /// ignore file is treated as empty. Nothing is written when the edit did
    /// not change anything.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::ReadIgnoreFile`] if ignore file cannot be read.
    /// - Return [`IgnoreError::WriteIgnoreFile`] if ignore file cannot be
    ///   written.
    pub fn edit<E>(&self, editor: E) -> Result<()>
    where
        E: FnOnce(&mut IgnoreBlockEdit),
    {
        let content = match read_to_string(&self.ignore_path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(IgnoreError::ReadIgnoreFile {
                    source: err,
                    ignore_path: self.ignore_path.clone(),
                })
            }
        };

        let mut block = IgnoreBlockEdit::from(content);
        editor(&mut block);

        if !block.changed {
            return Ok(());
        }

        write(&self.ignore_path, block.to_string().as_bytes()).map_err(|err| {
            IgnoreError::WriteIgnoreFile {
                source: err,
                ignore_path: self.ignore_path.clone(),
            }
        })?;
        debug!("refreshed managed block of {:?}", self.ignore_path.display());

        Ok(())
    }

    /// Replace rules of managed block.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError`] if ignore file cannot be read or written.
    pub fn refresh(&self, rules: impl IntoIterator<Item = impl Into<String>>) -> Result<()> {
        self.edit(|block| block.replace_rules(rules))
    }

    /// List rules of managed block.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::ReadIgnoreFile`] if ignore file cannot be read.
    pub fn current_rules(&self) -> Result<Vec<String>> {
        match read_to_string(&self.ignore_path) {
            Ok(content) => Ok(IgnoreBlockEdit::from(content).rules.into_iter().collect()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(IgnoreError::ReadIgnoreFile {
                source: err,
                ignore_path: self.ignore_path.clone(),
            }),
        }
    }
}

/// Managed block editor.
///
/// # Invariant
///
/// - No duplicate rules.
/// - User lines before and after the block keep their order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IgnoreBlockEdit {
    before: Vec<String>,
    rules: BTreeSet<String>,
    after: Vec<String>,
    has_block: bool,
    changed: bool,
}

impl IgnoreBlockEdit {
    /// Construct new editor for empty ignore file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all rules of managed block.
    ///
    /// Appends a fresh block at the end if the file had none.
    pub fn replace_rules(&mut self, rules: impl IntoIterator<Item = impl Into<String>>) {
        let rules = rules.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        if self.has_block && self.rules == rules {
            return;
        }

        if !self.has_block {
            // INVARIANT: Keep a blank line between user content and new block.
            if self.before.last().is_some_and(|line| !line.is_empty()) {
                self.before.push(String::new());
            }
            self.before.append(&mut self.after);
            self.has_block = true;
        }

        self.rules = rules;
        self.changed = true;
    }

    /// Clear all rules while keeping the block in place.
    pub fn clear_rules(&mut self) {
        self.replace_rules(std::iter::empty::<String>());
    }
}

impl Display for IgnoreBlockEdit {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        let mut out = String::new();
        for line in &self.before {
            out.push_str(line);
            out.push('\n');
        }

        if self.has_block {
            out.push_str(BEGIN_MARKER);
            out.push('\n');
            for rule in &self.rules {
                out.push_str(rule);
                out.push('\n');
            }
            out.push_str(END_MARKER);
            out.push('\n');
        }

        for line in &self.after {
            out.push_str(line);
            out.push('\n');
        }

        write!(fmt, "{out}")
    }
}

impl From<&str> for IgnoreBlockEdit {
    fn from(content: &str) -> Self {
        let mut edit = Self::default();
        let mut in_block = false;
        for line in content.lines() {
            if line == BEGIN_MARKER && !edit.has_block {
                edit.has_block = true;
                in_block = true;
            } else if line == END_MARKER && in_block {
                in_block = false;
            } else if in_block {
                edit.rules.insert(line.to_owned());
            } else if edit.has_block {
                edit.after.push(line.to_owned());
            } else {
                edit.before.push(line.to_owned());
            }
        }

        edit
    }
}

impl From<String> for IgnoreBlockEdit {
    fn from(content: String) -> Self {
        Self::from(content.as_str())
    }
}

/// Ignore file management error types.
#[derive(Debug, thiserror::Error)]
pub enum IgnoreError {
    /// Ignore file cannot be read from.
    #[error("failed to read from ignore file at {:?}", ignore_path.display())]
    ReadIgnoreFile {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },

    /// Ignore file cannot be written to.
    #[error("failed to write to ignore file at {:?}", ignore_path.display())]
    WriteIgnoreFile {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = IgnoreError> = std::result::Result<T, E>;
