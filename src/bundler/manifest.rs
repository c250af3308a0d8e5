//! The manifest written at the package root.
//!
//! Records every bundled library with its package-relative path and content
//! identity, plus the search paths of every rewritten artifact. Entries are
//! sorted and no timestamps are stored, so identical inputs produce an
//! identical file.

use crate::bundler::{
    error::{ErrorExt, Result},
    graph::{BundlePlan, EntryKind},
    platform::ContentId,
    rewriter::Rewrite,
    settings::TargetPlatform,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    path::{Component, Path},
};

/// Version of the manifest layout.
pub const FORMAT_VERSION: &str = "1";

/// A bundled library.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryRecord {
    /// File name, as referenced by dependents.
    pub name: String,
    /// Package-relative path, `/`-separated.
    pub path: String,
    pub identity: ContentId,
}

/// A package artifact whose dependencies were bundled.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: String,
    pub identity: ContentId,
    pub search_paths: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub format_version: String,
    pub target: TargetPlatform,
    pub libraries: Vec<LibraryRecord>,
    pub artifacts: Vec<ArtifactRecord>,
    /// Package-relative directories holding bundled DLLs, for loaders that
    /// must register them before importing (Windows only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dll_directories: Vec<String>,
}

impl BundleManifest {
    /// Builds the manifest for `plan` after `rewrites`.
    pub fn new(target: TargetPlatform, plan: &BundlePlan, rewrites: &[Rewrite]) -> Self {
        let search_paths: HashMap<&Path, &[String]> = rewrites
            .iter()
            .map(|r| (r.destination(), r.search_paths()))
            .collect();

        let mut libraries = Vec::new();
        let mut artifacts = Vec::new();
        for (_, entry) in plan.entries() {
            let path = slash_path(entry.destination());
            match entry.kind() {
                EntryKind::Library => libraries.push(LibraryRecord {
                    name: entry
                        .destination()
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.clone()),
                    path,
                    identity: entry.identity().clone(),
                }),
                EntryKind::Artifact => artifacts.push(ArtifactRecord {
                    path,
                    identity: entry.identity().clone(),
                    search_paths: search_paths
                        .get(entry.destination())
                        .map(|p| p.to_vec())
                        .unwrap_or_default(),
                }),
            }
        }
        libraries.sort();
        artifacts.sort();

        let dll_directories = if target == TargetPlatform::Windows {
            let dirs: BTreeSet<String> = plan
                .libraries()
                .map(|(_, e)| slash_path(e.destination().parent().unwrap_or(Path::new(""))))
                .collect();
            dirs.into_iter().collect()
        } else {
            Vec::new()
        };

        Self {
            format_version: FORMAT_VERSION.to_string(),
            target,
            libraries,
            artifacts,
            dll_directories,
        }
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).fs_context("failed to read manifest", path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).fs_context("failed to write manifest", path)
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(c: char) -> ContentId {
        serde_json::from_value(serde_json::Value::String(c.to_string().repeat(64))).unwrap()
    }

    #[test]
    fn json_layout() {
        let manifest = BundleManifest {
            format_version: FORMAT_VERSION.into(),
            target: TargetPlatform::Linux,
            libraries: vec![LibraryRecord {
                name: "libcore.so".into(),
                path: "lib/libcore.so".into(),
                identity: id('a'),
            }],
            artifacts: vec![ArtifactRecord {
                path: "app.so".into(),
                identity: id('b'),
                search_paths: vec!["$ORIGIN/lib".into()],
            }],
            dll_directories: vec![],
        };

        let json = manifest.to_json().unwrap();
        assert!(json.ends_with("}\n"));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["format_version"], "1");
        assert_eq!(value["target"], "linux");
        assert_eq!(value["libraries"][0]["path"], "lib/libcore.so");
        assert_eq!(value["artifacts"][0]["search_paths"][0], "$ORIGIN/lib");
        assert!(value.get("dll_directories").is_none());
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundled-libraries.json");
        let manifest = BundleManifest {
            format_version: FORMAT_VERSION.into(),
            target: TargetPlatform::Windows,
            libraries: vec![],
            artifacts: vec![],
            dll_directories: vec!["bin".into()],
        };
        manifest.write(&path).unwrap();
        assert_eq!(BundleManifest::load(&path).unwrap(), manifest);
    }

    #[test]
    fn paths_use_forward_slashes() {
        assert_eq!(slash_path(Path::new("Qt6/lib/libQt6Core.so.6")), "Qt6/lib/libQt6Core.so.6");
        assert_eq!(slash_path(Path::new("./bin")), "bin");
    }
}
