// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the overlay configuration file to simplify the
//! process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! # General Layout
//!
//! ```toml
//! link_mode = "symlink"
//! links = ["test.txt", { from = "src/lib", to = "library" }]
//!
//! [upstream]
//! url = "https://blah.org/upstream.git"
//! ref = "main"
//! ```

use crate::path::validate;

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Overlay configuration file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct OverlayConfig {
    /// Link mode to use when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_mode: Option<LinkMode>,

    /// Declared overlay rules.
    #[serde(default)]
    pub links: Vec<MappingSpec>,

    /// Upstream source tree to overlay.
    pub upstream: UpstreamSettings,
}

impl FromStr for OverlayConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: OverlayConfig = toml::de::from_str(data)?;

        // INVARIANT: Perform shell expansion on upstream URL.
        config.upstream.url = shellexpand::full(config.upstream.url.as_str())?.into_owned();

        if config.upstream.url.is_empty() {
            return Err(ConfigError::MissingField("upstream.url"));
        }

        if config.upstream.reference.is_empty() {
            return Err(ConfigError::MissingField("upstream.ref"));
        }

        for mapping in &config.links {
            mapping.check()?;
        }

        Ok(config)
    }
}

impl Display for OverlayConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Upstream source tree settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct UpstreamSettings {
    /// Remote URL or local path to clone upstream from.
    pub url: String,

    /// Branch, tag, or commit hash to pin upstream to.
    #[serde(rename = "ref")]
    pub reference: String,
}

/// One declared overlay rule.
///
/// Maps a pattern relative to the source tree onto a path relative to the
/// target tree. Without a distinct target, the source pattern doubles as
/// the target path.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(from = "MappingDecl", into = "MappingDecl")]
pub struct MappingSpec {
    source: PathBuf,
    target: Option<PathBuf>,
}

impl MappingSpec {
    /// Construct mapping where target equals source.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: None,
        }
    }

    /// Construct mapping with a distinct target path.
    pub fn with_target(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: Some(target.into()),
        }
    }

    /// Source pattern relative to source tree.
    pub fn source(&self) -> &Path {
        self.source.as_path()
    }

    /// Target path relative to target tree.
    pub fn target(&self) -> &Path {
        self.target.as_deref().unwrap_or(self.source.as_path())
    }

    /// Check whether the mapping has a distinct target path.
    pub fn has_distinct_target(&self) -> bool {
        self.target.is_some()
    }

    /// Check that both fields are relative and never climb out of their
    /// trees.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::InvalidMapping`] if either field escapes.
    pub fn check(&self) -> Result<()> {
        validate("", self.source()).map_err(|err| ConfigError::InvalidMapping {
            source: err,
            mapping: self.source.clone(),
        })?;
        validate("", self.target()).map_err(|err| ConfigError::InvalidMapping {
            source: err,
            mapping: self.target().to_path_buf(),
        })?;

        Ok(())
    }
}

/// Mapping declaration as written in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum MappingDecl {
    Bare(PathBuf),
    Pair {
        from: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<PathBuf>,
    },
}

impl From<MappingDecl> for MappingSpec {
    fn from(decl: MappingDecl) -> Self {
        match decl {
            MappingDecl::Bare(source) => Self::new(source),
            MappingDecl::Pair { from, to } => Self {
                source: from,
                target: to,
            },
        }
    }
}

impl From<MappingSpec> for MappingDecl {
    fn from(spec: MappingSpec) -> Self {
        match spec.target {
            Some(to) => MappingDecl::Pair {
                from: spec.source,
                to: Some(to),
            },
            None => MappingDecl::Bare(spec.source),
        }
    }
}

/// Mechanism used to expose a source file at a target path.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Symbolic link relative to the target's parent directory.
    #[default]
    Symlink,

    /// Hard link to the source file.
    Hardlink,

    /// Byte copy of the source file with its permission bits.
    Copy,
}

impl LinkMode {
    /// Name of link mode as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symlink => "symlink",
            Self::Hardlink => "hardlink",
            Self::Copy => "copy",
        }
    }
}

impl FromStr for LinkMode {
    type Err = ConfigError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "symlink" => Ok(Self::Symlink),
            "hardlink" => Ok(Self::Hardlink),
            "copy" => Ok(Self::Copy),
            other => Err(ConfigError::UnsupportedLinkMode(other.into())),
        }
    }
}

impl Display for LinkMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Required field is empty or missing.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Mapping is absolute or escapes its tree.
    #[error("invalid mapping {:?}", mapping.display())]
    InvalidMapping {
        #[source]
        source: crate::path::EscapeError,
        mapping: PathBuf,
    },

    /// Link mode is not one of symlink, hardlink, or copy.
    #[error("unsupported link mode: {0:?}")]
    UnsupportedLinkMode(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
