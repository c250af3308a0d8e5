//! File system utilities for staging packages.
//!
//! Tree copies preserve symlinks; every failure carries the path involved.

use crate::{
    bail,
    bundler::error::{Error, ErrorExt, Result},
};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e).fs_context("failed to remove", path),
    }
}

/// Makes a symbolic link to a directory.
#[cfg(unix)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a directory.
#[cfg(windows)]
fn symlink_dir(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(unix)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(windows)]
fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// Symlinks are followed: the destination is always a regular file.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        bail!("{} is not a file", from.display());
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("failed to create directory", dest_dir)?;
    }
    fs::copy(from, to).await.fs_context("failed to copy", from)?;
    Ok(())
}

/// Recursively copies a directory, creating any parent directories of the
/// destination path as necessary.
///
/// Preserves symlinks on platforms that support them. Entries for which
/// `skip` returns true (given the path relative to `from`) are not copied.
pub async fn copy_dir<F>(from: &Path, to: &Path, skip: F) -> Result<()>
where
    F: Fn(&Path) -> bool + Send + 'static,
{
    if !from.is_dir() {
        bail!("{} is not a directory", from.display());
    }

    let from = from.to_path_buf();
    let to = to.to_path_buf();

    tokio::task::spawn_blocking(move || copy_tree(&from, &to, skip))
        .await
        .map_err(|e| Error::GenericError(format!("Directory copy task panicked: {e}")))?
}

fn copy_tree(from: &Path, to: &Path, skip: impl Fn(&Path) -> bool) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).fs_context("failed to create directory", parent)?;
    }

    let mut walker = walkdir::WalkDir::new(from).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        let rel_path = relative_to(entry.path(), from)?;
        if !rel_path.as_os_str().is_empty() && skip(&rel_path) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }
        let dest_path = to.join(&rel_path);

        if entry.file_type().is_symlink() {
            let target =
                std::fs::read_link(entry.path()).fs_context("failed to read link", entry.path())?;
            let linked = if entry.path().is_dir() {
                symlink_dir(&target, &dest_path)
            } else {
                symlink_file(&target, &dest_path)
            };
            linked.fs_context("failed to create symlink", &dest_path)?;
        } else if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest_path)
                .fs_context("failed to create directory", &dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path).fs_context("failed to copy", entry.path())?;
        }
    }
    Ok(())
}

fn relative_to(path: &Path, base: &Path) -> Result<PathBuf> {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .map_err(|_| {
            Error::GenericError(format!(
                "{} is not inside {}",
                path.display(),
                base.display()
            ))
        })
}
