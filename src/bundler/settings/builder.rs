//! Builder for constructing Settings.

use super::{
    DEFAULT_MANIFEST_NAME, ExclusionRule, PreferRule, ResignCommand, Settings, TargetPlatform,
};
use crate::bundler::error::{Error, Result};
use path_absolutize::Absolutize;
use std::path::{Component, Path, PathBuf};

/// Builder for constructing [`Settings`].
///
/// All validation happens in [`build`](Self::build), before anything in the
/// package is read or written.
///
/// # Examples
///
/// ```no_run
/// use toolkit_bundler::bundler::{SettingsBuilder, TargetPlatform};
///
/// # fn example() -> toolkit_bundler::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .package_dir("build/wheel/PyQt6")
///     .toolkit_root("/opt/Qt/6.7.2/gcc_64/lib")
///     .exclude("libsystem.*")
///     .target(TargetPlatform::Linux)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    package_dir: Option<PathBuf>,
    lib_dir: Option<PathBuf>,
    toolkit_root: Option<PathBuf>,
    search_roots: Vec<PathBuf>,
    system_roots: Option<Vec<PathBuf>>,
    exclusions: Vec<String>,
    prefer_first: Vec<String>,
    artifacts: Vec<PathBuf>,
    target: Option<TargetPlatform>,
    default_exclusions: Option<bool>,
    bundle_system_libraries: Option<bool>,
    allow_signature_invalidation: Option<bool>,
    resign_command: Option<String>,
    manifest_name: Option<String>,
    jobs: Option<usize>,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the package directory to bundle into.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn package_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.package_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the package-relative directory for bundled libraries.
    ///
    /// Default: the target's library directory name (`lib`, `bin` on Windows)
    pub fn lib_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.lib_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the toolkit library root, searched before any other root.
    pub fn toolkit_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.toolkit_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Appends an extra search root.
    pub fn search_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_roots.push(path.as_ref().to_path_buf());
        self
    }

    /// Replaces the target's default system roots.
    pub fn system_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.system_roots = Some(roots);
        self
    }

    /// Appends an exclusion glob.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclusions.push(pattern.into());
        self
    }

    /// Appends a prefer-first glob.
    pub fn prefer_first(mut self, pattern: impl Into<String>) -> Self {
        self.prefer_first.push(pattern.into());
        self
    }

    /// Appends a package-relative artifact to scan.
    ///
    /// Default: every native binary in the package
    pub fn artifact<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.artifacts.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets the target platform.
    ///
    /// Default: the host platform
    pub fn target(mut self, target: TargetPlatform) -> Self {
        self.target = Some(target);
        self
    }

    /// Enables or disables the target's built-in exclusion list.
    ///
    /// Default: enabled
    pub fn default_exclusions(mut self, enabled: bool) -> Self {
        self.default_exclusions = Some(enabled);
        self
    }

    /// Default: false
    pub fn bundle_system_libraries(mut self, enabled: bool) -> Self {
        self.bundle_system_libraries = Some(enabled);
        self
    }

    /// Default: false
    pub fn allow_signature_invalidation(mut self, enabled: bool) -> Self {
        self.allow_signature_invalidation = Some(enabled);
        self
    }

    /// Sets the command run on rewritten signed files, e.g.
    /// `codesign --force --sign -`.
    pub fn resign_command(mut self, command: impl Into<String>) -> Self {
        self.resign_command = Some(command.into());
        self
    }

    /// Default: `bundled-libraries.json`
    pub fn manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = Some(name.into());
        self
    }

    /// Default: number of logical CPUs
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if:
    /// - `package_dir` is missing or not a directory
    /// - `lib_dir` is absolute or escapes the package
    /// - a glob is invalid
    /// - `manifest_name` is not a plain file name
    /// - `jobs` is zero
    /// - the re-sign program cannot be found
    pub fn build(self) -> Result<Settings> {
        let target = self.target.unwrap_or_else(TargetPlatform::host);
        let case_insensitive = target.case_insensitive();

        let package_dir = self
            .package_dir
            .ok_or_else(|| config("a package directory is required"))?;
        let package_dir = absolute(&package_dir)?;
        if !package_dir.is_dir() {
            return Err(config(format!(
                "package directory {} does not exist",
                package_dir.display()
            )));
        }

        let lib_dir = self
            .lib_dir
            .unwrap_or_else(|| PathBuf::from(target.library_dir_name()));
        if !is_relative_inside(&lib_dir) {
            return Err(config(format!(
                "library directory {} must be a relative path inside the package",
                lib_dir.display()
            )));
        }

        let toolkit_root = self.toolkit_root.as_deref().map(absolute).transpose()?;
        let search_roots = self
            .search_roots
            .iter()
            .map(|p| absolute(p))
            .collect::<Result<Vec<_>>>()?;
        let system_roots = match self.system_roots {
            Some(roots) => roots.iter().map(|p| absolute(p)).collect::<Result<Vec<_>>>()?,
            None => target.default_system_roots(),
        };

        let mut patterns: Vec<String> = Vec::new();
        if self.default_exclusions.unwrap_or(true) {
            patterns.extend(target.default_exclusions().iter().map(|s| s.to_string()));
        }
        patterns.extend(self.exclusions);
        let exclusions = patterns
            .iter()
            .map(|p| ExclusionRule::new(p, case_insensitive))
            .collect::<Result<Vec<_>>>()?;
        let prefer_first = self
            .prefer_first
            .iter()
            .map(|p| PreferRule::new(p, case_insensitive))
            .collect::<Result<Vec<_>>>()?;

        for artifact in &self.artifacts {
            if !is_relative_inside(artifact) {
                return Err(config(format!(
                    "artifact {} must be a relative path inside the package",
                    artifact.display()
                )));
            }
        }

        let manifest_name = self
            .manifest_name
            .unwrap_or_else(|| DEFAULT_MANIFEST_NAME.to_string());
        if manifest_name.is_empty() || manifest_name.contains(['/', '\\']) || manifest_name == ".." {
            return Err(config(format!(
                "manifest name '{manifest_name}' must be a plain file name"
            )));
        }

        let jobs = self.jobs.unwrap_or_else(num_cpus::get);
        if jobs == 0 {
            return Err(config("jobs must be at least 1"));
        }

        let resign_command = self
            .resign_command
            .as_deref()
            .map(parse_resign_command)
            .transpose()?;

        Ok(Settings::new(
            package_dir,
            lib_dir,
            toolkit_root,
            search_roots,
            system_roots,
            exclusions,
            prefer_first,
            self.artifacts,
            target,
            self.bundle_system_libraries.unwrap_or(false),
            self.allow_signature_invalidation.unwrap_or(false),
            resign_command,
            manifest_name,
            jobs,
        ))
    }
}

fn config(message: impl Into<String>) -> Error {
    Error::ConfigurationError(message.into())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    path.absolutize()
        .map(|p| p.into_owned())
        .map_err(|e| config(format!("cannot resolve {}: {e}", path.display())))
}

fn is_relative_inside(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn parse_resign_command(command: &str) -> Result<ResignCommand> {
    let mut words = command.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| config("re-sign command is empty"))?;
    let resolved = which::which(program)
        .map_err(|e| config(format!("re-sign program '{program}' not found: {e}")))?;
    Ok(ResignCommand::new(
        resolved,
        words.map(str::to_string).collect(),
    ))
}
