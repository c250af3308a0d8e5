//! Core Settings struct and implementations.

use super::{ExclusionRule, PreferRule, TargetPlatform};
use std::path::{Path, PathBuf};

/// Default file name of the manifest written at the package root.
pub const DEFAULT_MANIFEST_NAME: &str = "bundled-libraries.json";

/// External program run on every rewritten file that carried a signature.
///
/// The file path is appended as the last argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResignCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl ResignCommand {
    pub(super) fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolved path of the program.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments placed before the file path.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Main settings for bundling operations.
///
/// Constructed once via [`SettingsBuilder`](super::SettingsBuilder), then
/// shared read-only by every component.
///
/// # See Also
///
/// - [`SettingsBuilder`](super::SettingsBuilder) - Builder for constructing Settings
#[derive(Clone, Debug)]
pub struct Settings {
    /// Absolute path of the package directory being bundled.
    package_dir: PathBuf,

    /// Package-relative directory receiving bundled libraries.
    lib_dir: PathBuf,

    /// Toolkit library root, searched before other roots.
    toolkit_root: Option<PathBuf>,

    /// Extra roots in declaration order.
    search_roots: Vec<PathBuf>,

    /// Roots whose libraries are tagged `system`.
    system_roots: Vec<PathBuf>,

    exclusions: Vec<ExclusionRule>,
    prefer_first: Vec<PreferRule>,

    /// Package-relative artifacts. Empty means discover every native binary.
    artifacts: Vec<PathBuf>,

    target: TargetPlatform,

    /// Bundle libraries found only under system roots.
    bundle_system_libraries: bool,

    /// Rewrite signed binaries even though their signature becomes invalid.
    allow_signature_invalidation: bool,

    resign_command: Option<ResignCommand>,

    manifest_name: String,

    /// Upper bound of concurrent scan tasks.
    jobs: usize,
}

impl Settings {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        package_dir: PathBuf,
        lib_dir: PathBuf,
        toolkit_root: Option<PathBuf>,
        search_roots: Vec<PathBuf>,
        system_roots: Vec<PathBuf>,
        exclusions: Vec<ExclusionRule>,
        prefer_first: Vec<PreferRule>,
        artifacts: Vec<PathBuf>,
        target: TargetPlatform,
        bundle_system_libraries: bool,
        allow_signature_invalidation: bool,
        resign_command: Option<ResignCommand>,
        manifest_name: String,
        jobs: usize,
    ) -> Self {
        Self {
            package_dir,
            lib_dir,
            toolkit_root,
            search_roots,
            system_roots,
            exclusions,
            prefer_first,
            artifacts,
            target,
            bundle_system_libraries,
            allow_signature_invalidation,
            resign_command,
            manifest_name,
            jobs,
        }
    }

    /// Returns the package directory.
    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    /// Returns the package-relative library directory.
    pub fn lib_dir(&self) -> &Path {
        &self.lib_dir
    }

    /// Returns the absolute path of the library directory inside the package.
    pub fn bundle_dir(&self) -> PathBuf {
        self.package_dir.join(&self.lib_dir)
    }

    pub fn toolkit_root(&self) -> Option<&Path> {
        self.toolkit_root.as_deref()
    }

    /// Caller-supplied roots in search order: the toolkit root first, then
    /// the extra search roots.
    pub fn search_roots(&self) -> Vec<&Path> {
        self.toolkit_root
            .as_deref()
            .into_iter()
            .chain(self.search_roots.iter().map(PathBuf::as_path))
            .collect()
    }

    pub fn system_roots(&self) -> &[PathBuf] {
        &self.system_roots
    }

    pub fn exclusions(&self) -> &[ExclusionRule] {
        &self.exclusions
    }

    /// Returns the first exclusion rule matching `specifier`.
    pub fn excluded_by(&self, specifier: &str) -> Option<&ExclusionRule> {
        self.exclusions.iter().find(|rule| rule.matches(specifier))
    }

    /// True if a prefer-first rule matches `name`.
    pub fn prefers_first(&self, name: &str) -> bool {
        self.prefer_first.iter().any(|rule| rule.matches(name))
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    pub fn target(&self) -> TargetPlatform {
        self.target
    }

    pub fn bundle_system_libraries(&self) -> bool {
        self.bundle_system_libraries
    }

    pub fn allow_signature_invalidation(&self) -> bool {
        self.allow_signature_invalidation
    }

    pub fn resign_command(&self) -> Option<&ResignCommand> {
        self.resign_command.as_ref()
    }

    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }
}
