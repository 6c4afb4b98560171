// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::ProjectFixture;

use anyhow::Result;
use oxilay::{store::StoreError, LinkMode, MappingSpec, OverlayError, StateStore};
use pretty_assertions::assert_eq;
use std::fs;

fn populated() -> Result<ProjectFixture> {
    let project = ProjectFixture::new()?;
    project.write_source("src/lib/x.txt", "x")?;
    project.write_source("src/lib/nested/y.txt", "y")?;
    project.write_source("test.txt", "t")?;
    project.write_source("conf/.gitignore", "*.bak\n")?;

    Ok(project)
}

fn mappings() -> Vec<MappingSpec> {
    vec![
        MappingSpec::with_target("src/lib", "library"),
        MappingSpec::new("test.txt"),
        MappingSpec::new("conf"),
    ]
}

#[test]
fn materialize_then_clean_restores_target_tree() -> Result<()> {
    let project = populated()?;
    project.write_target("library/custom.txt", "mine")?;
    project.write_target("notes.md", "mine")?;
    let before = project.target_paths()?;

    let overlay = project.overlay();
    for mode in [LinkMode::Symlink, LinkMode::Hardlink, LinkMode::Copy] {
        overlay.materialize(&mappings(), mode, true)?;
        assert_ne!(project.target_paths()?, before);

        overlay.clean()?;
        assert_eq!(project.target_paths()?, before);
        assert!(overlay.registry()?.is_empty());
    }

    Ok(())
}

#[test]
fn clean_twice_removes_nothing_the_second_time() -> Result<()> {
    let project = populated()?;
    project.write_target("keep/custom.txt", "mine")?;

    let overlay = project.overlay();
    overlay.materialize(&mappings(), LinkMode::Symlink, false)?;

    let removed = overlay.clean()?;
    assert_eq!(removed, 4);
    let after_first = project.target_paths()?;

    let removed = overlay.clean()?;
    assert_eq!(removed, 0);
    assert_eq!(project.target_paths()?, after_first);
    assert!(overlay.registry()?.is_empty());
    assert!(project.target("keep/custom.txt").exists());

    Ok(())
}

#[test]
fn clean_skips_entries_removed_by_hand() -> Result<()> {
    let project = populated()?;
    let overlay = project.overlay();
    overlay.materialize(&mappings(), LinkMode::Copy, false)?;

    fs::remove_file(project.target("test.txt"))?;
    let removed = overlay.clean()?;
    assert_eq!(removed, 3);
    assert!(overlay.registry()?.is_empty());

    Ok(())
}

#[test]
fn clean_requires_target_tree() -> Result<()> {
    let project = ProjectFixture::new()?;
    fs::remove_dir_all(project.layout().target_root())?;

    let result = project.overlay().clean();
    assert!(matches!(result, Err(OverlayError::TargetRootMissing { .. })));

    Ok(())
}

#[test]
fn clean_never_follows_escaping_registry_paths() -> Result<()> {
    let project = populated()?;
    let relative_victim = project.layout().root().join("victim.txt");
    let absolute_victim = project.layout().root().join("absolute.txt");
    fs::write(&relative_victim, "victim")?;
    fs::write(&absolute_victim, "victim")?;

    let overlay = project.overlay();
    overlay.materialize(&mappings(), LinkMode::Copy, false)?;

    let mut registry = overlay.registry()?;
    registry.upsert("../victim.txt", LinkMode::Copy, "test.txt");
    registry.upsert(&absolute_victim, LinkMode::Copy, "test.txt");
    StateStore::new(project.layout().state_path()).save(&registry)?;

    let result = overlay.clean();
    assert!(matches!(
        result,
        Err(OverlayError::Store(StoreError::EscapingEntry { .. }))
    ));
    assert!(relative_victim.exists());
    assert!(absolute_victim.exists());
    assert!(project.target("test.txt").exists());

    Ok(())
}

#[cfg(unix)]
#[test]
fn clean_accepts_symlinked_target_tree() -> Result<()> {
    let project = populated()?;
    let real = project.layout().root().join("real-overlay");
    fs::create_dir_all(&real)?;
    fs::remove_dir_all(project.layout().target_root())?;
    std::os::unix::fs::symlink(&real, project.layout().target_root())?;

    let overlay = project.overlay();
    overlay.materialize(&[MappingSpec::new("test.txt")], LinkMode::Copy, false)?;
    assert!(real.join("test.txt").exists());

    assert_eq!(overlay.clean()?, 1);
    assert!(!real.join("test.txt").exists());
    assert!(real.exists());

    Ok(())
}

#[test]
fn corrupt_registry_aborts_operations() -> Result<()> {
    let project = populated()?;
    fs::write(project.layout().state_path(), "[ this is not a registry")?;

    let overlay = project.overlay();
    let result = overlay.clean();
    assert!(matches!(
        result,
        Err(OverlayError::Store(StoreError::CorruptState { .. }))
    ));

    let result = overlay.materialize(&mappings(), LinkMode::Symlink, false);
    assert!(matches!(
        result,
        Err(OverlayError::Store(StoreError::CorruptState { .. }))
    ));
    assert!(!project.target("test.txt").exists());

    Ok(())
}
