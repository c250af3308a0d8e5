//! Rewrites library search metadata so bundled copies are found at runtime.
//!
//! Rewrites are computed from the frozen plan first ([`PathRewriter::compute`])
//! and applied to the staged files afterwards ([`PathRewriter::apply`]), so
//! signature conflicts surface before anything is written.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    graph::{BundlePlan, PlanEntry},
    platform::{BinaryFormat, Signature, adapter},
    scanner::lookup_name,
    settings::Settings,
};
use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

/// The metadata change planned for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rewrite {
    destination: PathBuf,
    format: BinaryFormat,
    search_paths: Vec<String>,
    write_search_paths: bool,
    renames: Vec<(String, String)>,
    signature: Option<Signature>,
}

impl Rewrite {
    /// Package-relative path of the rewritten file.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Search paths after the rewrite. For PE these are the DLL
    /// directories recorded in the manifest.
    pub fn search_paths(&self) -> &[String] {
        &self.search_paths
    }

    /// Dependency renames, `(old, new)`.
    pub fn renames(&self) -> &[(String, String)] {
        &self.renames
    }

    /// True if the file's bytes change.
    pub fn modifies_file(&self) -> bool {
        self.write_search_paths || !self.renames.is_empty()
    }

    /// Signature that the change invalidates, if any.
    pub fn invalidated_signature(&self) -> Option<Signature> {
        self.signature.filter(|_| self.modifies_file())
    }
}

/// Computes and applies per-format relative references.
pub struct PathRewriter {
    settings: Arc<Settings>,
}

impl PathRewriter {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Plans the rewrite of every entry of `plan`, dependencies ahead of
    /// their dependents so re-signing handles nested code first.
    ///
    /// # Errors
    ///
    /// [`Error::RewriteConflict`] for a signed file that would change while
    /// neither signature invalidation nor a re-sign command is configured.
    pub fn compute(&self, plan: &BundlePlan) -> Result<Vec<Rewrite>> {
        let mut rewrites = Vec::new();
        for node in plan.dependency_order() {
            let entry = plan.entry(node);
            let deps: Vec<(&str, &PlanEntry)> = plan
                .bundled_dependencies(node)
                .into_iter()
                .map(|(specifier, target)| (specifier, plan.entry(target)))
                .collect();

            let rewrite = self.rewrite_for(entry, &deps);
            if rewrite.invalidated_signature().is_some()
                && !self.settings.allow_signature_invalidation()
                && self.settings.resign_command().is_none()
            {
                return Err(Error::RewriteConflict {
                    path: entry.artifact().path().to_path_buf(),
                    reason: "the file is signed and rewriting it would invalidate the \
                             signature; allow signature invalidation or configure a \
                             re-sign command"
                        .into(),
                });
            }
            rewrites.push(rewrite);
        }
        Ok(rewrites)
    }

    fn rewrite_for(&self, entry: &PlanEntry, deps: &[(&str, &PlanEntry)]) -> Rewrite {
        let artifact = entry.artifact();
        let format = artifact.format();
        let here = parent(entry.destination());
        let current = artifact.search_paths().to_vec();

        let mut search_paths: Vec<String> = Vec::new();
        let mut renames = Vec::new();
        for (specifier, target) in deps {
            let (wanted_name, dir) = match format {
                BinaryFormat::MachO => self.macho_reference(target.destination()),
                BinaryFormat::Elf | BinaryFormat::Pe => (
                    file_name(target.destination()),
                    parent(target.destination()).to_path_buf(),
                ),
            };

            let token = match format {
                BinaryFormat::Elf => prefixed("$ORIGIN", &relative_dir(here, &dir)),
                BinaryFormat::MachO => prefixed("@loader_path", &relative_dir(here, &dir)),
                BinaryFormat::Pe => relative_dir(here, &dir),
            };
            // PE DLLs next to the module need no directory
            if !(format == BinaryFormat::Pe && token.is_empty()) && !search_paths.contains(&token) {
                search_paths.push(token);
            }

            let same_name = match format {
                BinaryFormat::Pe => specifier.eq_ignore_ascii_case(&wanted_name),
                BinaryFormat::Elf | BinaryFormat::MachO => *specifier == wanted_name,
            };
            if !same_name && !renames.iter().any(|(old, _)| old == specifier) {
                renames.push((specifier.to_string(), wanted_name));
            }
        }

        // entries without bundled dependencies keep their metadata
        let write_search_paths = match format {
            BinaryFormat::Pe => false,
            BinaryFormat::Elf | BinaryFormat::MachO => {
                !deps.is_empty() && search_paths != current
            }
        };
        if deps.is_empty() && format != BinaryFormat::Pe {
            search_paths = current;
        }

        Rewrite {
            destination: entry.destination().to_path_buf(),
            format,
            search_paths,
            write_search_paths,
            renames,
            signature: artifact.signature(),
        }
    }

    /// Install name and run path directory for a Mach-O dependency.
    ///
    /// Libraries under the library directory keep their path below it (so
    /// framework layouts survive); anything else is referenced by file name
    /// next to its own directory.
    fn macho_reference(&self, destination: &Path) -> (String, PathBuf) {
        let lib_dir = self.settings.lib_dir();
        match destination.strip_prefix(lib_dir) {
            Ok(below) => (format!("@rpath/{}", slash_path(below)), lib_dir.to_path_buf()),
            Err(_) => (
                format!("@rpath/{}", file_name(destination)),
                parent(destination).to_path_buf(),
            ),
        }
    }

    /// Applies `rewrites` to the files under `root`, skipping files whose
    /// metadata already has the planned value.
    pub fn apply(&self, root: &Path, rewrites: &[Rewrite]) -> Result<usize> {
        let mut changed = 0;
        for rewrite in rewrites.iter().filter(|r| r.modifies_file()) {
            let path = root.join(&rewrite.destination);
            let mut bytes = std::fs::read(&path).fs_context("failed to read", &path)?;
            let adapter = adapter(rewrite.format);

            for (old, new) in &rewrite.renames {
                log::debug!("{}: {old} -> {new}", rewrite.destination.display());
                if !adapter.replace_dependency(&path, &mut bytes, old, new)? {
                    return Err(Error::RewriteConflict {
                        path: path.clone(),
                        reason: format!("dependency '{old}' is not declared"),
                    });
                }
            }
            if rewrite.write_search_paths {
                log::debug!(
                    "{}: search paths {:?}",
                    rewrite.destination.display(),
                    rewrite.search_paths
                );
                adapter.set_search_paths(&path, &mut bytes, &rewrite.search_paths)?;
            }

            std::fs::write(&path, &bytes).fs_context("failed to write", &path)?;
            changed += 1;
        }
        log::info!("Rewrote {changed} file(s)");
        Ok(changed)
    }
}

fn parent(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| lookup_name(&path.to_string_lossy()))
}

fn prefixed(token: &str, relative: &str) -> String {
    if relative.is_empty() {
        token.to_string()
    } else {
        format!("{token}/{relative}")
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Relative path from directory `from` to directory `to`, both relative to
/// the package root, joined with `/`. Empty when they are the same.
pub fn relative_dir(from: &Path, to: &Path) -> String {
    let from: Vec<Component> = from.components().filter(is_normal).collect();
    let to: Vec<Component> = to.components().filter(is_normal).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts = vec!["..".to_string(); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn is_normal(component: &Component) -> bool {
    matches!(component, Component::Normal(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{
        graph::DependencyGraphBuilder,
        platform::{Artifact, testdata},
        scanner::LibraryScanner,
        settings::{SettingsBuilder, TargetPlatform},
    };

    #[test]
    fn relative_directories() {
        assert_eq!(relative_dir(Path::new(""), Path::new("lib")), "lib");
        assert_eq!(relative_dir(Path::new("lib"), Path::new("lib")), "");
        assert_eq!(relative_dir(Path::new("PyQt6"), Path::new("PyQt6/Qt6/lib")), "Qt6/lib");
        assert_eq!(relative_dir(Path::new("a/b"), Path::new("lib")), "../../lib");
    }

    struct Case {
        dir: tempfile::TempDir,
        settings: Arc<Settings>,
    }

    impl Case {
        fn new(target: TargetPlatform, tweak: impl FnOnce(SettingsBuilder) -> SettingsBuilder) -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("pkg/sub")).unwrap();
            std::fs::create_dir_all(dir.path().join("qt")).unwrap();
            let builder = SettingsBuilder::new()
                .package_dir(dir.path().join("pkg"))
                .toolkit_root(dir.path().join("qt"))
                .system_roots(vec![])
                .default_exclusions(false)
                .target(target);
            let settings = Arc::new(tweak(builder).build().unwrap());
            Self { dir, settings }
        }

        fn write(&self, rel: &str, bytes: Vec<u8>) -> PathBuf {
            let path = self.dir.path().join(rel);
            std::fs::write(&path, bytes).unwrap();
            path
        }

        async fn rewrites(&self, artifacts: &[&str]) -> Result<Vec<Rewrite>> {
            let scanner = Arc::new(LibraryScanner::new(Arc::clone(&self.settings)));
            let plan = DependencyGraphBuilder::new(Arc::clone(&self.settings), scanner)
                .build(artifacts.iter().map(|a| self.dir.path().join(a)).collect())
                .await
                .unwrap();
            PathRewriter::new(Arc::clone(&self.settings)).compute(&plan)
        }
    }

    fn find<'a>(rewrites: &'a [Rewrite], destination: &str) -> &'a Rewrite {
        rewrites
            .iter()
            .find(|r| r.destination() == Path::new(destination))
            .unwrap()
    }

    #[tokio::test]
    async fn elf_uses_origin_relative_paths() {
        let case = Case::new(TargetPlatform::Linux, |b| b);
        case.write("pkg/app.so", testdata::elf(&["libcore.so"], Some("/build/lib")));
        case.write("pkg/sub/mod.so", testdata::elf(&["libcore.so"], Some("/build/lib")));
        case.write("qt/libcore.so", testdata::elf(&[], Some("$ORIGIN")));

        let rewrites = case.rewrites(&["pkg/app.so", "pkg/sub/mod.so"]).await.unwrap();
        let by_dest = |d: &str| find(&rewrites, d);

        assert_eq!(by_dest("app.so").search_paths(), ["$ORIGIN/lib"]);
        assert_eq!(by_dest("sub/mod.so").search_paths(), ["$ORIGIN/../lib"]);
        assert!(by_dest("app.so").renames().is_empty());
        // no bundled dependencies, nothing to write
        assert!(!by_dest("lib/libcore.so").modifies_file());
    }

    #[tokio::test]
    async fn elf_absolute_dependency_is_renamed() {
        let case = Case::new(TargetPlatform::Linux, |b| b);
        let lib = case.write("qt/libshared.so", testdata::elf(&[], Some("$ORIGIN")));
        case.write("pkg/app.so", testdata::elf(&[lib.to_str().unwrap()], Some("$ORIGIN")));

        let rewrites = case.rewrites(&["pkg/app.so"]).await.unwrap();
        assert_eq!(
            find(&rewrites, "app.so").renames(),
            [(lib.to_string_lossy().into_owned(), "libshared.so".to_string())]
        );
    }

    #[tokio::test]
    async fn macho_uses_rpath_install_names() {
        let case = Case::new(TargetPlatform::MacOs, |b| b);
        case.write(
            "pkg/app.so",
            testdata::macho(&["/opt/qt/lib/libcore.dylib"], &["/opt/qt/lib"]),
        );
        case.write("qt/libcore.dylib", testdata::macho(&[], &[]));

        let rewrites = case.rewrites(&["pkg/app.so"]).await.unwrap();
        let app = find(&rewrites, "app.so");
        assert_eq!(app.search_paths(), ["@loader_path/lib"]);
        assert_eq!(
            app.renames(),
            [("/opt/qt/lib/libcore.dylib".to_string(), "@rpath/libcore.dylib".to_string())]
        );
    }

    #[tokio::test]
    async fn signed_macho_conflicts_unless_allowed() {
        let signed = testdata::MachOSpec {
            dylibs: vec!["@rpath/libcore.dylib".into()],
            rpaths: vec!["/opt/qt/lib".into()],
            signed: true,
            ..Default::default()
        }
        .build();

        let case = Case::new(TargetPlatform::MacOs, |b| b);
        case.write("pkg/app.so", signed.clone());
        case.write("qt/libcore.dylib", testdata::macho(&[], &[]));
        let err = case.rewrites(&["pkg/app.so"]).await.unwrap_err();
        assert!(matches!(err, Error::RewriteConflict { .. }), "{err}");

        let case = Case::new(TargetPlatform::MacOs, |b| b.allow_signature_invalidation(true));
        case.write("pkg/app.so", signed);
        case.write("qt/libcore.dylib", testdata::macho(&[], &[]));
        let rewrites = case.rewrites(&["pkg/app.so"]).await.unwrap();
        assert_eq!(
            find(&rewrites, "app.so").invalidated_signature(),
            Some(Signature::CodeSignature)
        );
    }

    #[tokio::test]
    async fn pe_records_directories_without_touching_the_binary() {
        let case = Case::new(TargetPlatform::Windows, |b| b.exclude("KERNEL32.dll"));
        case.write("pkg/sub/QtCore.pyd", testdata::pe(&["qt6core.dll", "KERNEL32.dll"]));
        case.write("qt/Qt6Core.dll", testdata::pe(&[]));
        let rewrites = case.rewrites(&["pkg/sub/QtCore.pyd"]).await.unwrap();

        let module = find(&rewrites, "sub/QtCore.pyd");
        assert_eq!(module.search_paths(), ["../bin"]);
        assert!(!module.modifies_file());
    }

    #[tokio::test]
    async fn libraries_are_rewritten_before_their_dependents() {
        let case = Case::new(TargetPlatform::Linux, |b| b);
        case.write("pkg/app.so", testdata::elf(&["libgui.so"], Some("/build/lib")));
        case.write("qt/libgui.so", testdata::elf(&["libcore.so"], Some("/build/lib")));
        case.write("qt/libcore.so", testdata::elf(&[], Some("$ORIGIN")));

        let rewrites = case.rewrites(&["pkg/app.so"]).await.unwrap();
        let order: Vec<_> = rewrites.iter().map(|r| r.destination().to_path_buf()).collect();
        assert_eq!(
            order,
            [
                PathBuf::from("lib/libcore.so"),
                PathBuf::from("lib/libgui.so"),
                PathBuf::from("app.so"),
            ]
        );
    }

    #[tokio::test]
    async fn apply_writes_and_second_pass_is_noop() {
        let case = Case::new(TargetPlatform::Linux, |b| b);
        case.write("pkg/app.so", testdata::elf(&["libcore.so"], Some("/build/lib")));
        case.write("qt/libcore.so", testdata::elf(&[], Some("$ORIGIN")));

        let rewrites = case.rewrites(&["pkg/app.so"]).await.unwrap();
        let rewriter = PathRewriter::new(Arc::clone(&case.settings));
        let root = case.dir.path().join("pkg");
        assert_eq!(rewriter.apply(&root, &rewrites).unwrap(), 1);

        let app = Artifact::scan(&root.join("app.so")).unwrap();
        assert_eq!(app.search_paths(), ["$ORIGIN/lib"]);

        // the library is bundled now; planning again changes nothing
        std::fs::create_dir_all(root.join("lib")).unwrap();
        std::fs::copy(case.dir.path().join("qt/libcore.so"), root.join("lib/libcore.so")).unwrap();
        let again = case.rewrites(&["pkg/app.so"]).await.unwrap();
        assert!(again.iter().all(|r| !r.modifies_file()));
    }
}
