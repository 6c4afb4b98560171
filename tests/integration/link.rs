// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::ProjectFixture;

use anyhow::Result;
use indoc::indoc;
use oxilay::{
    overlay::block::IgnoreFile, LinkMode, ManagedEntry, MappingSpec, OverlayError, StateStore,
};
use pretty_assertions::assert_eq;
use std::{fs, path::PathBuf};

#[test]
fn symlink_directory_mapping() -> Result<()> {
    let project = ProjectFixture::new()?;
    project.write_source("src/lib/x.txt", "hello")?;

    let mappings = [MappingSpec::with_target("src/lib", "library")];
    let created = project
        .overlay()
        .materialize(&mappings, LinkMode::Symlink, false)?;
    assert_eq!(created, vec![PathBuf::from("library/x.txt")]);

    let link = project.target("library/x.txt");
    assert!(fs::symlink_metadata(&link)?.file_type().is_symlink());
    assert_eq!(
        fs::read_link(&link)?,
        PathBuf::from("../../.upstream/src/lib/x.txt")
    );
    assert_eq!(fs::read_to_string(&link)?, "hello");

    let registry = StateStore::new(project.layout().state_path()).load()?;
    let result = registry.iter().cloned().collect::<Vec<_>>();
    let expect = vec![ManagedEntry {
        path: "library/x.txt".into(),
        link_mode: LinkMode::Symlink,
        source: "src/lib/x.txt".into(),
    }];
    assert_eq!(result, expect);

    Ok(())
}

#[test]
fn rerun_without_force_keeps_existing_target() -> Result<()> {
    let project = ProjectFixture::new()?;
    project.write_source("test.txt", "upstream")?;
    let overlay = project.overlay();
    let mappings = [MappingSpec::new("test.txt")];

    overlay.materialize(&mappings, LinkMode::Symlink, false)?;
    let before = fs::read_link(project.target("test.txt"))?;

    let result = overlay.materialize(&mappings, LinkMode::Copy, false);
    assert!(matches!(result, Err(OverlayError::TargetExists { .. })));
    assert_eq!(fs::read_link(project.target("test.txt"))?, before);

    overlay.materialize(&mappings, LinkMode::Copy, true)?;
    let metadata = fs::symlink_metadata(project.target("test.txt"))?;
    assert!(metadata.is_file());
    assert_eq!(
        overlay.registry()?.get("test.txt").map(|entry| entry.link_mode),
        Some(LinkMode::Copy)
    );

    Ok(())
}

#[test]
fn ignore_file_is_always_copied() -> Result<()> {
    let project = ProjectFixture::new()?;
    project.write_source("sub/.gitignore", "*.o\n")?;
    project.write_source("sub/main.c", "int main;\n")?;

    let overlay = project.overlay();
    overlay.materialize(&[MappingSpec::new("sub")], LinkMode::Symlink, false)?;

    let ignore = fs::symlink_metadata(project.target("sub/.gitignore"))?;
    assert!(ignore.is_file());
    let main = fs::symlink_metadata(project.target("sub/main.c"))?;
    assert!(main.file_type().is_symlink());

    let registry = overlay.registry()?;
    let modes = registry
        .iter()
        .map(|entry| (entry.path.clone(), entry.link_mode))
        .collect::<Vec<_>>();
    let expect = vec![
        (PathBuf::from("sub/.gitignore"), LinkMode::Copy),
        (PathBuf::from("sub/main.c"), LinkMode::Symlink),
    ];
    assert_eq!(modes, expect);

    Ok(())
}

#[cfg(unix)]
#[test]
fn copy_keeps_permission_bits() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let project = ProjectFixture::new()?;
    project.write_source("bin/run.sh", "#!/bin/sh\n")?;
    fs::set_permissions(
        project.source("bin/run.sh"),
        fs::Permissions::from_mode(0o750),
    )?;

    project
        .overlay()
        .materialize(&[MappingSpec::new("bin/run.sh")], LinkMode::Copy, false)?;

    let metadata = fs::symlink_metadata(project.target("bin/run.sh"))?;
    assert!(metadata.is_file());
    assert_eq!(metadata.permissions().mode() & 0o777, 0o750);
    assert_eq!(fs::read_to_string(project.target("bin/run.sh"))?, "#!/bin/sh\n");

    Ok(())
}

#[cfg(unix)]
#[test]
fn hardlink_shares_inode() -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let project = ProjectFixture::new()?;
    project.write_source("data.txt", "shared")?;

    project
        .overlay()
        .materialize(&[MappingSpec::new("data.txt")], LinkMode::Hardlink, false)?;

    let source = fs::metadata(project.source("data.txt"))?;
    let target = fs::symlink_metadata(project.target("data.txt"))?;
    assert_eq!(source.ino(), target.ino());
    assert_eq!(source.nlink(), 2);

    Ok(())
}

#[test]
fn pattern_mapping_keeps_structure_below_prefix() -> Result<()> {
    let project = ProjectFixture::new()?;
    project.write_source("docs/a.md", "a")?;
    project.write_source("docs/b.md", "b")?;
    project.write_source("docs/c.txt", "c")?;

    let created = project.overlay().materialize(
        &[MappingSpec::with_target("docs/*.md", "manual")],
        LinkMode::Copy,
        false,
    )?;
    let expect = vec![PathBuf::from("manual/a.md"), PathBuf::from("manual/b.md")];
    assert_eq!(created, expect);
    assert!(!project.target("manual/c.txt").exists());

    Ok(())
}

#[test]
fn partial_failure_records_progress() -> Result<()> {
    let project = ProjectFixture::new()?;
    project.write_source("a.txt", "a")?;

    let overlay = project.overlay();
    let mappings = [MappingSpec::new("a.txt"), MappingSpec::new("missing.txt")];
    let result = overlay.materialize(&mappings, LinkMode::Copy, false);
    assert!(matches!(result, Err(OverlayError::SourceNotFound { .. })));

    let registry = overlay.registry()?;
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("a.txt"));

    let rules = IgnoreFile::new(project.layout().ignore_path()).current_rules()?;
    assert_eq!(rules, vec!["overlay/a.txt".to_string()]);

    Ok(())
}

#[test]
fn escaping_target_is_rejected() -> Result<()> {
    let project = ProjectFixture::new()?;
    project.write_source("a.txt", "a")?;

    let result = project.overlay().materialize(
        &[MappingSpec::with_target("a.txt", "../outside.txt")],
        LinkMode::Copy,
        false,
    );
    assert!(matches!(result, Err(OverlayError::Escape(_))));
    assert!(!project.layout().root().join("outside.txt").exists());

    Ok(())
}

#[test]
fn escaping_source_is_rejected() -> Result<()> {
    let project = ProjectFixture::new()?;
    let secret = project.layout().root().join("secret.txt");
    fs::write(&secret, "secret")?;

    let overlay = project.overlay();
    for source in [PathBuf::from("../secret.txt"), secret.clone()] {
        let result = overlay.materialize(
            &[MappingSpec::with_target(source, "leak.txt")],
            LinkMode::Copy,
            false,
        );
        assert!(matches!(result, Err(OverlayError::Escape(_))));
    }

    assert!(!project.target("leak.txt").exists());
    assert!(overlay.registry()?.is_empty());

    Ok(())
}

#[test]
fn ignore_block_tracks_managed_paths() -> Result<()> {
    let project = ProjectFixture::new()?;
    project.write_source("src/lib/x.txt", "x")?;
    project.write_source("test.txt", "t")?;
    fs::write(project.layout().ignore_path(), "target/\n")?;

    let overlay = project.overlay();
    overlay.materialize(
        &[
            MappingSpec::new("test.txt"),
            MappingSpec::with_target("src/lib", "library"),
        ],
        LinkMode::Symlink,
        false,
    )?;

    let result = fs::read_to_string(project.layout().ignore_path())?;
    let expect = indoc! {r#"
        target/

        # BEGIN OXILAY MANAGED BLOCK - DO NOT EDIT
        overlay/library/x.txt
        overlay/test.txt
        # END OXILAY MANAGED BLOCK
    "#};
    assert_eq!(result, expect);

    overlay.clean()?;
    let result = fs::read_to_string(project.layout().ignore_path())?;
    let expect = indoc! {r#"
        target/

        # BEGIN OXILAY MANAGED BLOCK - DO NOT EDIT
        # END OXILAY MANAGED BLOCK
    "#};
    assert_eq!(result, expect);

    Ok(())
}
