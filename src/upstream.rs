// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Upstream source tree retrieval.
//!
//! The source tree of an overlay is a plain clone of an upstream Git
//! repository, pinned to one branch, tag, or commit. Oxilay clones it once,
//! and afterwards fetches and checks out the configured reference whenever
//! the overlay is synchronized. The clone always ends up with a detached
//! `HEAD` at the pinned commit.
//!
//! # Reference Resolution
//!
//! A reference is looked up as a remote branch of `origin` first, then as a
//! tag, and finally as anything Git itself can parse as a revision, e.g., a
//! full or abbreviated commit hash.

use auth_git2::{GitAuthenticator, Prompter};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Commit, Config, FetchOptions, Oid, RemoteCallbacks, Repository,
};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{fs, path::Path, time};
use tracing::{debug, info, instrument};

/// Refspecs fetched from `origin` on every checkout.
const FETCH_REFSPECS: [&str; 2] = [
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

/// Layer of indirection for upstream access.
pub trait UpstreamAccess {
    /// Clone upstream into path, replacing whatever was there.
    fn clone_into(&self, url: &str, path: &Path) -> Result<()>;

    /// Fetch and check out reference in existing clone.
    fn checkout(&self, path: &Path, reference: &str) -> Result<Oid>;
}

/// Upstream access through libgit2.
#[derive(Debug, Clone)]
pub struct Git2Upstream {
    bar: ProgressBar,
}

impl Git2Upstream {
    /// Construct new upstream access that reports through progress bar.
    pub fn new(bar: ProgressBar) -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        bar.set_style(style);

        Ok(Self { bar })
    }

    /// Run operation with fetch options that prompt for credentials and
    /// report transfer progress.
    fn with_fetch_options<T>(&self, run: impl FnOnce(FetchOptions<'_>) -> Result<T>) -> Result<T> {
        let prompter = IndicatifPrompter::new(self.bar.clone());
        let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
        let config = Config::open_default()?;

        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                prompter.bar.set_length(stats.total_objects() as u64);
                prompter.bar.set_position(stats.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);

        self.bar.enable_steady_tick(time::Duration::from_millis(100));
        let result = run(fo);
        self.bar.finish_and_clear();

        result
    }
}

impl UpstreamAccess for Git2Upstream {
    /// Clone upstream into path.
    ///
    /// Any existing directory at path is removed first, so the clone always
    /// starts fresh.
    ///
    /// # Errors
    ///
    /// - Return [`UpstreamError::RemoveStale`] if old clone cannot be removed.
    /// - Return [`UpstreamError::Git2`] if libgit2 operations fail.
    #[instrument(skip(self), level = "debug")]
    fn clone_into(&self, url: &str, path: &Path) -> Result<()> {
        if path.exists() {
            debug!("remove stale upstream at {:?}", path.display());
            fs::remove_dir_all(path).map_err(|err| UpstreamError::RemoveStale {
                source: err,
                path: path.to_path_buf(),
            })?;
        }

        info!("clone upstream {url:?}");
        self.bar.set_message(url.to_string());
        self.with_fetch_options(|fo| {
            RepoBuilder::new().fetch_options(fo).clone(url, path)?;
            Ok(())
        })
    }

    /// Fetch and check out reference.
    ///
    /// Forces the work tree to match the resolved commit, and detaches
    /// `HEAD` at it.
    ///
    /// # Errors
    ///
    /// - Return [`UpstreamError::UnknownReference`] if reference cannot be
    ///   resolved.
    /// - Return [`UpstreamError::Git2`] if libgit2 operations fail.
    #[instrument(skip(self), level = "debug")]
    fn checkout(&self, path: &Path, reference: &str) -> Result<Oid> {
        let repository = Repository::open(path)?;
        let mut remote = repository.find_remote("origin")?;
        self.bar.set_message(format!("fetch {reference}"));
        self.with_fetch_options(|mut fo| {
            remote.fetch(&FETCH_REFSPECS, Some(&mut fo), None)?;
            Ok(())
        })?;

        let commit = resolve_reference(&repository, reference)?;
        repository.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        repository.set_head_detached(commit.id())?;
        info!("upstream pinned to {reference} ({})", commit.id());

        Ok(commit.id())
    }
}

fn resolve_reference<'r>(repository: &'r Repository, reference: &str) -> Result<Commit<'r>> {
    let candidates = [
        format!("refs/remotes/origin/{reference}"),
        format!("refs/tags/{reference}"),
    ];
    for name in &candidates {
        if let Ok(found) = repository.find_reference(name) {
            debug!("resolved {reference:?} through {name:?}");
            return Ok(found.peel_to_commit()?);
        }
    }

    repository
        .revparse_single(reference)
        .and_then(|object| object.peel_to_commit())
        .map_err(|_| UpstreamError::UnknownReference {
            reference: reference.to_string(),
        })
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| -> Option<String> {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| -> Option<String> {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Upstream retrieval error types.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Reference is neither a branch, a tag, nor a revision.
    #[error("unknown upstream reference {reference:?}")]
    UnknownReference { reference: String },

    /// Previous clone cannot be removed.
    #[error("failed to remove stale upstream at {:?}", path.display())]
    RemoveStale {
        #[source]
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = UpstreamError> = std::result::Result<T, E>;
