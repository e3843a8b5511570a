//! Filesystem utilities for project export.
//!
//! The copy helpers deliberately treat a missing source as a no-op: optional
//! subsystems (a board without a sockets layer, a family without vendor
//! libraries) must not abort packaging.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use filetime::FileTime;

/// Copy `src` to `dst`, creating intermediate directories as needed.
///
/// Does nothing when `src` does not exist. When `dst` already holds identical
/// content the copy is skipped, which keeps repeated packaging runs cheap and
/// idempotent. The source modification time is carried over.
pub fn copy_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if !src.exists() {
        return Ok(());
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }

    if dst.is_file() && file_contents_eq(src, dst)? {
        return Ok(());
    }

    fs::copy(src, dst)
        .with_context(|| format!("failed to copy '{}' to '{}'", src.display(), dst.display()))?;

    let meta = fs::metadata(src)?;
    filetime::set_file_mtime(dst, FileTime::from_last_modification_time(&meta))?;

    Ok(())
}

/// Whether the contents of the files at `a` and `b` are equal.
pub fn file_contents_eq(a: impl AsRef<Path>, b: impl AsRef<Path>) -> Result<bool> {
    let (a, b) = (a.as_ref(), b.as_ref());

    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }

    Ok(fs::read(a)? == fs::read(b)?)
}

/// Replace `dst` with a copy of the directory tree at `src`.
///
/// Entries whose file name matches one of the `ignore` patterns (exact name,
/// `*suffix` or `prefix*`) are skipped. A missing source is a no-op; an
/// existing destination is removed first so stale export state never leaks
/// into a fresh run.
pub fn copy_tree(src: impl AsRef<Path>, dst: impl AsRef<Path>, ignore: &[&str]) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if !src.exists() {
        return Ok(());
    }

    if dst.exists() {
        remove_dir_all::remove_dir_all(dst)
            .with_context(|| format!("failed to delete '{}'", dst.display()))?;
    }

    copy_tree_inner(src, dst, ignore)
}

fn copy_tree_inner(src: &Path, dst: &Path, ignore: &[&str]) -> Result<()> {
    fs::create_dir_all(dst)?;

    let mut entries = fs::read_dir(src)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        if ignore.iter().any(|pattern| name_matches(pattern, &name_str)) {
            continue;
        }

        let to = dst.join(&name);
        if entry.file_type()?.is_dir() {
            copy_tree_inner(&entry.path(), &to, ignore)?;
        } else {
            copy_file(entry.path(), &to)?;
        }
    }

    Ok(())
}

/// Every file beneath `root`, sorted for deterministic processing order.
pub fn list_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    list_files_inner(root.as_ref(), &mut files)?;
    files.sort();
    Ok(files)
}

fn list_files_inner(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            list_files_inner(&entry.path(), out)?;
        } else {
            out.push(entry.path());
        }
    }

    Ok(())
}

/// `*suffix`, `prefix*` or exact file-name matching, in the spirit of
/// `shutil.ignore_patterns`.
fn name_matches(pattern: &str, name: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        name.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        name.starts_with(prefix)
    } else {
        pattern == name
    }
}
