//! Optional TOML configuration file.
//!
//! ```toml
//! [bundle]
//! exclude = ["libsystem.*"]
//! search_roots = ["/opt/extra/lib"]
//! lib_dir = "Qt6/lib"
//! target = "linux"
//! ```

use super::{SettingsBuilder, TargetPlatform};
use crate::bundler::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File looked up in the package directory when no `--config` is given.
pub const DEFAULT_CONFIG_NAME: &str = "toolkit-bundle.toml";

/// Contents of a configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub bundle: BundleSection,
}

/// The `[bundle]` table. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleSection {
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub prefer_first: Vec<String>,
    #[serde(default)]
    pub search_roots: Vec<PathBuf>,
    pub system_roots: Option<Vec<PathBuf>>,
    pub toolkit_root: Option<PathBuf>,
    pub lib_dir: Option<PathBuf>,
    pub target: Option<TargetPlatform>,
    pub default_exclusions: Option<bool>,
    pub bundle_system_libraries: Option<bool>,
    pub allow_signature_invalidation: Option<bool>,
    pub resign_command: Option<String>,
    pub manifest_name: Option<String>,
    pub jobs: Option<usize>,
}

impl ConfigFile {
    /// Reads and parses `path`. Syntax errors and unknown keys are
    /// configuration errors.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigurationError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text, path)
    }

    /// Loads `explicit` if given, otherwise the default file in
    /// `package_dir` when it exists.
    pub fn discover(explicit: Option<&Path>, package_dir: &Path) -> Result<Option<Self>> {
        if let Some(path) = explicit {
            return Self::load(path).map(Some);
        }
        let candidate = package_dir.join(DEFAULT_CONFIG_NAME);
        if candidate.is_file() {
            log::debug!("Using configuration file {}", candidate.display());
            return Self::load(&candidate).map(Some);
        }
        Ok(None)
    }

    fn parse(text: &str, path: &Path) -> Result<Self> {
        let mut file: Self = toml::from_str(text).map_err(|e| {
            Error::ConfigurationError(format!("invalid configuration file {}: {e}", path.display()))
        })?;

        // relative roots are relative to the file, not the working directory
        if let Some(base) = path.parent() {
            let section = &mut file.bundle;
            for root in section
                .search_roots
                .iter_mut()
                .chain(section.system_roots.iter_mut().flatten())
                .chain(section.toolkit_root.iter_mut())
            {
                if root.is_relative() {
                    *root = base.join(&*root);
                }
            }
        }
        Ok(file)
    }

    /// Seeds a builder with the file's values. Apply this before command
    /// line options so those extend lists and override scalars.
    pub fn apply(self, mut builder: SettingsBuilder) -> SettingsBuilder {
        let section = self.bundle;
        for pattern in section.exclude {
            builder = builder.exclude(pattern);
        }
        for pattern in section.prefer_first {
            builder = builder.prefer_first(pattern);
        }
        for root in section.search_roots {
            builder = builder.search_root(root);
        }
        if let Some(roots) = section.system_roots {
            builder = builder.system_roots(roots);
        }
        if let Some(root) = section.toolkit_root {
            builder = builder.toolkit_root(root);
        }
        if let Some(lib_dir) = section.lib_dir {
            builder = builder.lib_dir(lib_dir);
        }
        if let Some(target) = section.target {
            builder = builder.target(target);
        }
        if let Some(enabled) = section.default_exclusions {
            builder = builder.default_exclusions(enabled);
        }
        if let Some(enabled) = section.bundle_system_libraries {
            builder = builder.bundle_system_libraries(enabled);
        }
        if let Some(enabled) = section.allow_signature_invalidation {
            builder = builder.allow_signature_invalidation(enabled);
        }
        if let Some(command) = section.resign_command {
            builder = builder.resign_command(command);
        }
        if let Some(name) = section.manifest_name {
            builder = builder.manifest_name(name);
        }
        if let Some(jobs) = section.jobs {
            builder = builder.jobs(jobs);
        }
        builder
    }
}
