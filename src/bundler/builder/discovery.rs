//! Artifact discovery inside a package.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    platform::{BinaryFormat, identify},
    settings::Settings,
};
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

/// Returns the absolute paths of the artifacts to scan.
///
/// Explicit artifacts are used as given. Otherwise every regular file under
/// the package that sniffs as a native binary of the target's format is
/// returned, in path order, leaving out the bundle library directory.
pub fn discover_artifacts(settings: &Settings) -> Result<Vec<PathBuf>> {
    let package_dir = settings.package_dir();

    if !settings.artifacts().is_empty() {
        return settings
            .artifacts()
            .iter()
            .map(|rel| {
                let path = package_dir.join(rel);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(Error::ConfigurationError(format!(
                        "artifact {} does not exist in the package",
                        rel.display()
                    )))
                }
            })
            .collect();
    }

    let bundle_dir = settings.bundle_dir();
    let mut found = Vec::new();
    let mut walker = walkdir::WalkDir::new(package_dir)
        .sort_by_file_name()
        .into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        if entry.file_type().is_dir() {
            if entry.path() == bundle_dir {
                walker.skip_current_dir();
            }
            continue;
        }
        if !entry.file_type().is_file() || !is_native_binary(entry.path())? {
            continue;
        }
        match identify(entry.path()) {
            Ok(format) if format == settings.target().format() => {
                log::debug!("Found artifact {}", entry.path().display());
                found.push(entry.into_path());
            }
            Ok(format) => log::warn!(
                "Skipping {}: {format} binary, target is {}",
                entry.path().display(),
                settings.target()
            ),
            Err(Error::UnsupportedFormat { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    log::info!(
        "Discovered {} artifact(s) in {}",
        found.len(),
        package_dir.display()
    );
    Ok(found)
}

fn is_native_binary(path: &Path) -> Result<bool> {
    let mut prefix = [0u8; 4];
    let mut file = File::open(path).fs_context("failed to open", path)?;
    let mut filled = 0;
    while filled < prefix.len() {
        match file.read(&mut prefix[filled..]).fs_context("failed to read", path)? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled == prefix.len() && BinaryFormat::has_magic(&prefix))
}
