// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RepoFixture;

use anyhow::Result;
use git2::Repository;
use indicatif::ProgressBar;
use oxilay::upstream::{Git2Upstream, UpstreamAccess, UpstreamError};
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn clone_and_pin_by_branch_tag_and_hash() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = RepoFixture::new(dir.path().join("remote"))?;
    let first = remote.stage_and_commit("README.md", "first")?;
    remote.tag("v1")?;
    remote.branch("stable")?;
    let second = remote.stage_and_commit("README.md", "second")?;

    let clone = dir.path().join("project/.upstream");
    let upstream = Git2Upstream::new(ProgressBar::hidden())?;
    UpstreamAccess::clone_into(&upstream, &remote.url(), &clone)?;

    let oid = upstream.checkout(&clone, "main")?;
    assert_eq!(oid, second);
    assert_eq!(fs::read_to_string(clone.join("README.md"))?, "second");
    assert!(Repository::open(&clone)?.head_detached()?);

    let oid = upstream.checkout(&clone, "v1")?;
    assert_eq!(oid, first);
    assert_eq!(fs::read_to_string(clone.join("README.md"))?, "first");

    assert_eq!(upstream.checkout(&clone, "stable")?, first);
    assert_eq!(upstream.checkout(&clone, &second.to_string())?, second);
    assert_eq!(fs::read_to_string(clone.join("README.md"))?, "second");

    Ok(())
}

#[test]
fn checkout_sees_new_upstream_commits() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = RepoFixture::new(dir.path().join("remote"))?;
    remote.stage_and_commit("a.txt", "old")?;

    let clone = dir.path().join(".upstream");
    let upstream = Git2Upstream::new(ProgressBar::hidden())?;
    UpstreamAccess::clone_into(&upstream, &remote.url(), &clone)?;
    upstream.checkout(&clone, "main")?;

    let latest = remote.stage_and_commit("a.txt", "new")?;
    assert_eq!(upstream.checkout(&clone, "main")?, latest);
    assert_eq!(fs::read_to_string(clone.join("a.txt"))?, "new");

    Ok(())
}

#[test]
fn clone_replaces_stale_directory() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = RepoFixture::new(dir.path().join("remote"))?;
    remote.stage_and_commit("a.txt", "a")?;

    let clone = dir.path().join(".upstream");
    fs::create_dir_all(&clone)?;
    fs::write(clone.join("leftover.txt"), "stale")?;

    let upstream = Git2Upstream::new(ProgressBar::hidden())?;
    UpstreamAccess::clone_into(&upstream, &remote.url(), &clone)?;
    assert!(!clone.join("leftover.txt").exists());
    assert!(clone.join("a.txt").exists());

    Ok(())
}

#[test]
fn unknown_reference_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let remote = RepoFixture::new(dir.path().join("remote"))?;
    remote.stage_and_commit("a.txt", "a")?;

    let clone = dir.path().join(".upstream");
    let upstream = Git2Upstream::new(ProgressBar::hidden())?;
    UpstreamAccess::clone_into(&upstream, &remote.url(), &clone)?;

    let result = upstream.checkout(&clone, "no-such-ref");
    assert!(matches!(
        result,
        Err(UpstreamError::UnknownReference { reference }) if reference == "no-such-ref"
    ));

    Ok(())
}
