//! Main bundler orchestration and coordination.
//!
//! This module provides the [`Bundler`] orchestrator that drives the two
//! phases of a bundle: planning (discovery, closure, rewrite computation)
//! and applying (staging, rewriting, manifest, commit).

use crate::bundler::{
    Result, Settings,
    assembler::{Assembly, PackageAssembler},
    graph::{BundlePlan, DependencyGraphBuilder},
    rewriter::{PathRewriter, Rewrite},
    scanner::LibraryScanner,
};
use std::sync::Arc;

use super::{checksum::calculate_directory_sha256, discovery::discover_artifacts};

/// A frozen plan together with the metadata changes it implies.
#[derive(Debug)]
pub struct Planned {
    pub plan: BundlePlan,
    pub rewrites: Vec<Rewrite>,
}

/// Outcome of a bundle run.
#[derive(Debug)]
pub struct BundleReport {
    pub assembly: Assembly,
    /// SHA-256 over the committed package tree.
    pub checksum: String,
}

/// Main bundler orchestrator.
///
/// # Examples
///
/// ```no_run
/// use toolkit_bundler::bundler::{Bundler, SettingsBuilder};
///
/// # async fn example() -> toolkit_bundler::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .package_dir("build/PyQt6")
///     .toolkit_root("/opt/Qt/6.7.2/gcc_64/lib")
///     .build()?;
///
/// let report = Bundler::new(settings).bundle().await?;
/// for library in &report.assembly.manifest.libraries {
///     println!("{} ({})", library.path, library.identity);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Bundler {
    settings: Arc<Settings>,
}

impl Bundler {
    /// Creates a new bundler with the given settings.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Computes the plan without touching the package.
    ///
    /// # Errors
    ///
    /// Every resolution problem of the failing scan wave, batched; or a
    /// [`RewriteConflict`](crate::bundler::Error::RewriteConflict) for a
    /// signed file that would change.
    pub async fn plan(&self) -> Result<Planned> {
        let artifacts = discover_artifacts(&self.settings)?;
        if artifacts.is_empty() {
            log::warn!(
                "No native binaries found in {}",
                self.settings.package_dir().display()
            );
        }

        let scanner = Arc::new(LibraryScanner::new(Arc::clone(&self.settings)));
        let plan = DependencyGraphBuilder::new(Arc::clone(&self.settings), scanner)
            .build(artifacts)
            .await?;
        let rewrites = PathRewriter::new(Arc::clone(&self.settings)).compute(&plan)?;

        Ok(Planned { plan, rewrites })
    }

    /// Plans and applies the bundle.
    pub async fn bundle(&self) -> Result<BundleReport> {
        let Planned { plan, rewrites } = self.plan().await?;

        let assembly = PackageAssembler::new(Arc::clone(&self.settings))
            .assemble(&plan, &rewrites)
            .await?;
        let checksum = calculate_directory_sha256(self.settings.package_dir()).await?;
        log::debug!("Package checksum: {checksum}");

        Ok(BundleReport { assembly, checksum })
    }
}
