//! Staged application of a bundle plan.
//!
//! The package tree is copied into a staging directory next to it (same
//! filesystem), libraries are copied in and rewritten there, the manifest is
//! written, and only then is the staged tree swapped into place. A failure
//! at any point before the swap leaves the package untouched.

use crate::bundler::{
    builder::signing::resign_files,
    error::{Error, ErrorExt, Result},
    graph::BundlePlan,
    manifest::BundleManifest,
    platform::Artifact,
    rewriter::{PathRewriter, Rewrite},
    settings::Settings,
    utils::fs,
};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

/// What applying a plan did to the package.
#[derive(Debug)]
pub struct Assembly {
    pub manifest: BundleManifest,
    /// Libraries copied into the package.
    pub copied: usize,
    /// Files whose metadata was rewritten.
    pub rewritten: usize,
    /// False when the package already matched the plan.
    pub committed: bool,
}

/// Copies planned libraries into the package and commits atomically.
pub struct PackageAssembler {
    settings: Arc<Settings>,
}

impl PackageAssembler {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Applies `plan` with the precomputed `rewrites`.
    pub async fn assemble(&self, plan: &BundlePlan, rewrites: &[Rewrite]) -> Result<Assembly> {
        let package_dir = self.settings.package_dir();
        let manifest = BundleManifest::new(self.settings.target(), plan, rewrites);
        let manifest_json = manifest.to_json()?;
        let manifest_path = package_dir.join(self.settings.manifest_name());

        let pending = self.pending_copies(plan)?;
        let rewritten = rewrites.iter().filter(|r| r.modifies_file()).count();
        let manifest_current = std::fs::read_to_string(&manifest_path)
            .map(|current| current == manifest_json)
            .unwrap_or(false);
        if pending.is_empty() && rewritten == 0 && manifest_current {
            log::info!("Package {} is already up to date", package_dir.display());
            return Ok(Assembly {
                manifest,
                copied: 0,
                rewritten: 0,
                committed: false,
            });
        }

        let parent = package_dir.parent().ok_or_else(|| {
            Error::ConfigurationError(format!(
                "package directory {} has no parent",
                package_dir.display()
            ))
        })?;
        let name = package_name(package_dir)?;
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{name}.staging-"))
            .tempdir_in(parent)
            .fs_context("failed to create staging directory", parent)?;
        let staged = staging.path().join(&name);

        log::info!("Staging package in {}", staging.path().display());
        let manifest_name = PathBuf::from(self.settings.manifest_name());
        fs::copy_dir(package_dir, &staged, move |rel| rel == manifest_name).await?;

        for (source, destination) in &pending {
            let target = staged.join(destination);
            log::debug!("Copying {} -> {}", source.display(), destination.display());
            fs::copy_file(source, &target).await?;
            make_writable(&target)?;
        }

        let rewriter = PathRewriter::new(Arc::clone(&self.settings));
        for rewrite in rewrites.iter().filter(|r| r.modifies_file()) {
            make_writable(&staged.join(rewrite.destination()))?;
        }
        rewriter.apply(&staged, rewrites)?;
        self.resign(&staged, rewrites).await?;

        manifest.write(&staged.join(self.settings.manifest_name()))?;

        commit(&staged, package_dir).await?;
        log::info!(
            "Bundled {} librar{} into {}",
            pending.len(),
            if pending.len() == 1 { "y" } else { "ies" },
            package_dir.display()
        );

        Ok(Assembly {
            manifest,
            copied: pending.len(),
            rewritten,
            committed: true,
        })
    }

    /// Libraries whose destination is missing or holds other content, as
    /// `(source, package-relative destination)`. One copy per identity.
    fn pending_copies(&self, plan: &BundlePlan) -> Result<Vec<(PathBuf, PathBuf)>> {
        let package_dir = self.settings.package_dir();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for (_, entry) in plan.libraries() {
            if !seen.insert(entry.identity().clone()) {
                continue;
            }
            let destination = package_dir.join(entry.destination());
            if entry.artifact().path() == destination {
                continue;
            }
            if destination.is_file() {
                match Artifact::scan(&destination) {
                    Ok(existing) if existing.identity() == entry.identity() => continue,
                    Ok(_) | Err(Error::UnsupportedFormat { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            pending.push((
                entry.artifact().path().to_path_buf(),
                entry.destination().to_path_buf(),
            ));
        }
        Ok(pending)
    }

    async fn resign(&self, staged: &Path, rewrites: &[Rewrite]) -> Result<()> {
        let signed: Vec<PathBuf> = rewrites
            .iter()
            .filter(|r| r.invalidated_signature().is_some())
            .map(|r| staged.join(r.destination()))
            .collect();
        if signed.is_empty() {
            return Ok(());
        }

        match self.settings.resign_command() {
            Some(command) => {
                let files: Vec<&Path> = signed.iter().map(PathBuf::as_path).collect();
                resign_files(command, &files).await
            }
            None => {
                for file in &signed {
                    log::warn!(
                        "Signature of {} is invalidated by the rewrite",
                        file.strip_prefix(staged).unwrap_or(file).display()
                    );
                }
                Ok(())
            }
        }
    }
}

fn package_name(package_dir: &Path) -> Result<String> {
    package_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::ConfigurationError(format!(
                "package directory {} has no name",
                package_dir.display()
            ))
        })
}

/// Toolkit libraries are often installed read-only.
fn make_writable(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).fs_context("failed to stat", path)?;
    let mut permissions = metadata.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = permissions.mode();
        if mode & 0o200 != 0 {
            return Ok(());
        }
        permissions.set_mode(mode | 0o200);
    }
    #[cfg(not(unix))]
    {
        if !permissions.readonly() {
            return Ok(());
        }
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
    }
    std::fs::set_permissions(path, permissions).fs_context("failed to set permissions", path)
}

/// Swaps `staged` into `package_dir`: the package is renamed aside, the
/// staged tree renamed in, and the old tree removed. If the second rename
/// fails the package is restored.
async fn commit(staged: &Path, package_dir: &Path) -> Result<()> {
    let name = package_name(package_dir)?;
    let aside = package_dir.with_file_name(format!(".{name}.old-{}", uuid::Uuid::new_v4()));

    tokio::fs::rename(package_dir, &aside)
        .await
        .fs_context("failed to move package aside", package_dir)?;
    if let Err(error) = tokio::fs::rename(staged, package_dir).await {
        if let Err(restore) = tokio::fs::rename(&aside, package_dir).await {
            log::error!(
                "Failed to restore {} from {}: {restore}",
                package_dir.display(),
                aside.display()
            );
        }
        return Err(Error::Fs {
            context: "failed to move staged package into",
            path: package_dir.to_path_buf(),
            error,
        });
    }

    if let Err(e) = fs::remove_dir_all(&aside).await {
        log::warn!("Could not remove previous package tree: {e}");
    }
    Ok(())
}
