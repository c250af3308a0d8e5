//! Resolution of dependency specifiers to library files.
//!
//! Roots are searched in a fixed order:
//!
//! 1. the package's own library directory,
//! 2. the toolkit root and the extra search roots, in declaration order,
//! 3. the requester's embedded search paths (`$ORIGIN` and `@loader_path`
//!    expanded) and, for absolute specifiers, the specified location,
//! 4. the system roots.
//!
//! Candidates that differ in content are never silently picked.

use crate::bundler::{
    error::{Error, Result},
    platform::Artifact,
    settings::Settings,
};
use std::{
    collections::HashMap,
    ffi::OsStr,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Outcome of resolving one dependency specifier.
#[derive(Clone, Debug)]
pub enum Resolution {
    /// Found outside the system roots; to be bundled.
    Found(Arc<Artifact>),
    /// Found only under a system root.
    System(Arc<Artifact>),
    /// Nothing matched; lists every root that was searched.
    Unresolved { searched: Vec<PathBuf> },
    /// Several candidates share the name but differ in content.
    Ambiguous { candidates: Vec<PathBuf> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Bundle,
    Search,
    Declared,
    System,
}

enum Probe {
    Dir(PathBuf, Origin),
    File(PathBuf),
}

/// Resolves specifiers and caches scanned candidates by path.
///
/// Shared by the parallel scan tasks; the cache is the only mutable state.
pub struct LibraryScanner {
    settings: Arc<Settings>,
    cache: Mutex<HashMap<PathBuf, Arc<Artifact>>>,
}

impl LibraryScanner {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<Artifact>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scans `path`, reusing an earlier scan of the same path.
    pub fn artifact(&self, path: &Path) -> Result<Arc<Artifact>> {
        if let Some(artifact) = self.cache().get(path) {
            return Ok(Arc::clone(artifact));
        }
        let artifact = Arc::new(Artifact::scan(path)?);
        Ok(Arc::clone(
            self.cache().entry(path.to_path_buf()).or_insert(artifact),
        ))
    }

    /// Resolves `specifier` as declared by `requester`.
    pub fn resolve(&self, specifier: &str, requester: &Artifact) -> Result<Resolution> {
        let name = lookup_name(specifier);
        let probes = self.probes(specifier, requester);

        let mut searched = Vec::new();
        let mut found: Vec<(PathBuf, Origin)> = Vec::new();
        for probe in probes {
            let hit = match probe {
                Probe::Dir(root, origin) => {
                    let hit = self.find_in(&root, &name).map(|p| (p, origin));
                    searched.push(root);
                    hit
                }
                Probe::File(path) => path
                    .is_file()
                    .then(|| (path.clone(), self.classify(&path))),
            };
            if let Some((path, origin)) = hit {
                if !found.iter().any(|(p, _)| *p == path) {
                    found.push((path, origin));
                }
            }
        }

        let mut local = Vec::new();
        let mut system = Vec::new();
        for (path, origin) in found {
            let Some(artifact) = self.usable(&path)? else {
                continue;
            };
            if origin == Origin::System {
                system.push(artifact);
            } else {
                local.push(artifact);
            }
        }

        if let Some(first) = local.first() {
            if local.iter().all(|a| a.identity() == first.identity()) {
                return Ok(Resolution::Found(Arc::clone(first)));
            }
            let base = name.rsplit('/').next().unwrap_or(&name);
            if self.settings.prefers_first(base) {
                log::debug!(
                    "{specifier}: {} candidates differ, preferring {}",
                    local.len(),
                    first.path().display()
                );
                return Ok(Resolution::Found(Arc::clone(first)));
            }
            return Ok(Resolution::Ambiguous {
                candidates: local.iter().map(|a| a.path().to_path_buf()).collect(),
            });
        }

        match system.into_iter().next() {
            Some(artifact) => Ok(Resolution::System(artifact)),
            None => Ok(Resolution::Unresolved { searched }),
        }
    }

    fn probes(&self, specifier: &str, requester: &Artifact) -> Vec<Probe> {
        let settings = &self.settings;
        let mut probes = vec![Probe::Dir(settings.bundle_dir(), Origin::Bundle)];
        probes.extend(
            settings
                .search_roots()
                .into_iter()
                .map(|root| Probe::Dir(root.to_path_buf(), Origin::Search)),
        );

        for declared in requester.search_paths() {
            if let Some(root) = expand(declared, requester.directory()) {
                let origin = self.classify(&root);
                probes.push(Probe::Dir(root, origin));
            }
        }
        if let Some(relative) = strip_loader_prefix(specifier) {
            probes.push(Probe::File(requester.directory().join(relative)));
        } else if is_absolute(specifier) {
            probes.push(Probe::File(PathBuf::from(specifier)));
        }

        probes.extend(
            settings
                .system_roots()
                .iter()
                .map(|root| Probe::Dir(root.clone(), Origin::System)),
        );
        probes
    }

    /// Locations named by the binary itself count as system when they lie
    /// under a system root.
    fn classify(&self, path: &Path) -> Origin {
        if self
            .settings
            .system_roots()
            .iter()
            .any(|root| path.starts_with(root))
        {
            Origin::System
        } else {
            Origin::Declared
        }
    }

    fn find_in(&self, root: &Path, name: &str) -> Option<PathBuf> {
        let candidate = root.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !self.settings.target().case_insensitive() || name.contains('/') {
            return None;
        }
        std::fs::read_dir(root)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .find(|path| {
                path.file_name()
                    .and_then(OsStr::to_str)
                    .is_some_and(|f| f.eq_ignore_ascii_case(name))
                    && path.is_file()
            })
    }

    /// Scans a candidate, skipping files that are not binaries of the
    /// target's format (linker scripts, libraries for other platforms).
    fn usable(&self, path: &Path) -> Result<Option<Arc<Artifact>>> {
        match self.artifact(path) {
            Ok(artifact) if artifact.format() == self.settings.target().format() => {
                Ok(Some(artifact))
            }
            Ok(artifact) => {
                log::debug!(
                    "Skipping {}: {} binary, target is {}",
                    path.display(),
                    artifact.format(),
                    self.settings.target()
                );
                Ok(None)
            }
            Err(Error::UnsupportedFormat { .. }) => {
                log::debug!("Skipping {}: not a native binary", path.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// The path fragment looked up under each root.
///
/// - `@rpath/QtCore.framework/Versions/A/QtCore` → `QtCore.framework/Versions/A/QtCore`
/// - `/opt/qt/lib/libQt6Core.so.6` → `libQt6Core.so.6`
/// - `/opt/qt/lib/QtGui.framework/Versions/A/QtGui` → `QtGui.framework/Versions/A/QtGui`
/// - `libfoo.so.1` → `libfoo.so.1`
pub fn lookup_name(specifier: &str) -> String {
    if let Some(relative) = specifier.strip_prefix("@rpath/") {
        return relative.to_string();
    }
    let specifier = strip_loader_prefix(specifier).unwrap_or(specifier);
    if !is_absolute(specifier) && !specifier.contains(['/', '\\']) {
        return specifier.to_string();
    }

    let parts: Vec<&str> = specifier.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
    match parts.iter().position(|p| p.ends_with(".framework")) {
        Some(i) => parts[i..].join("/"),
        None => parts.last().map(|p| p.to_string()).unwrap_or_default(),
    }
}

fn strip_loader_prefix(specifier: &str) -> Option<&str> {
    ["@loader_path/", "@executable_path/"]
        .iter()
        .find_map(|prefix| specifier.strip_prefix(prefix))
}

fn is_absolute(specifier: &str) -> bool {
    let bytes = specifier.as_bytes();
    specifier.starts_with('/')
        || (bytes.len() > 2 && bytes[1] == b':' && matches!(bytes[2], b'\\' | b'/'))
}

/// Expands an embedded search path against the requester's directory.
/// Entries that cannot be expanded (other tokens, relative paths) are
/// skipped.
fn expand(declared: &str, origin: &Path) -> Option<PathBuf> {
    for token in ["$ORIGIN", "${ORIGIN}", "@loader_path", "@executable_path"] {
        if let Some(rest) = declared.strip_prefix(token) {
            let rest = rest.trim_start_matches('/');
            return Some(if rest.is_empty() {
                origin.to_path_buf()
            } else {
                origin.join(rest)
            });
        }
    }
    (is_absolute(declared) && !declared.contains('$')).then(|| PathBuf::from(declared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{
        platform::testdata,
        settings::{SettingsBuilder, TargetPlatform},
    };
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            for dir in ["pkg", "qt", "extra", "system"] {
                std::fs::create_dir_all(root.path().join(dir)).unwrap();
            }
            Self { root }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.root.path().join(rel)
        }

        fn write(&self, rel: &str, bytes: &[u8]) -> PathBuf {
            let path = self.path(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, bytes).unwrap();
            path
        }

        fn builder(&self) -> SettingsBuilder {
            SettingsBuilder::new()
                .package_dir(self.path("pkg"))
                .toolkit_root(self.path("qt"))
                .search_root(self.path("extra"))
                .system_roots(vec![self.path("system")])
                .default_exclusions(false)
                .target(TargetPlatform::Linux)
        }

        fn scanner(&self, builder: SettingsBuilder) -> LibraryScanner {
            LibraryScanner::new(Arc::new(builder.build().unwrap()))
        }

        fn requester(&self, runpath: Option<&str>) -> Artifact {
            let path = self.write("pkg/app.so", &testdata::elf(&["libcore.so"], runpath));
            Artifact::scan(&path).unwrap()
        }
    }

    fn lib(payload: &[u8]) -> Vec<u8> {
        testdata::elf_with_payload(&[], Some("$ORIGIN"), payload)
    }

    #[test]
    fn lookup_names() {
        assert_eq!(lookup_name("libfoo.so.1"), "libfoo.so.1");
        assert_eq!(lookup_name("@rpath/libfoo.dylib"), "libfoo.dylib");
        assert_eq!(
            lookup_name("@rpath/QtCore.framework/Versions/A/QtCore"),
            "QtCore.framework/Versions/A/QtCore"
        );
        assert_eq!(lookup_name("/opt/qt/lib/libQt6Core.so.6"), "libQt6Core.so.6");
        assert_eq!(
            lookup_name("/opt/qt/lib/QtGui.framework/Versions/A/QtGui"),
            "QtGui.framework/Versions/A/QtGui"
        );
        assert_eq!(lookup_name("@loader_path/../lib/libx.dylib"), "libx.dylib");
        assert_eq!(lookup_name("C:\\Qt\\bin\\Qt6Core.dll"), "Qt6Core.dll");
    }

    #[test]
    fn expands_origin_tokens() {
        let origin = Path::new("/pkg/sub");
        assert_eq!(expand("$ORIGIN", origin), Some(PathBuf::from("/pkg/sub")));
        assert_eq!(expand("$ORIGIN/../lib", origin), Some(PathBuf::from("/pkg/sub/../lib")));
        assert_eq!(expand("@loader_path/lib", origin), Some(PathBuf::from("/pkg/sub/lib")));
        assert_eq!(expand("/opt/lib", origin), Some(PathBuf::from("/opt/lib")));
        assert_eq!(expand("$LIB/x", origin), None);
        assert_eq!(expand("relative", origin), None);
    }

    #[test]
    fn toolkit_root_wins_over_system() {
        let fx = Fixture::new();
        let qt = fx.write("qt/libcore.so", &lib(b"core"));
        fx.write("system/libcore.so", &lib(b"old core"));
        let scanner = fx.scanner(fx.builder());

        match scanner.resolve("libcore.so", &fx.requester(None)).unwrap() {
            Resolution::Found(a) => assert_eq!(a.path(), qt),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bundle_dir_is_searched_first() {
        let fx = Fixture::new();
        let bundled = fx.write("pkg/lib/libcore.so", &lib(b"core"));
        fx.write("qt/libcore.so", &lib(b"core"));
        let scanner = fx.scanner(fx.builder());

        match scanner.resolve("libcore.so", &fx.requester(None)).unwrap() {
            Resolution::Found(a) => assert_eq!(a.path(), bundled),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn differing_candidates_are_ambiguous() {
        let fx = Fixture::new();
        let a = fx.write("qt/libshared.so", &lib(b"one"));
        let b = fx.write("extra/libshared.so", &lib(b"two"));
        let scanner = fx.scanner(fx.builder());

        match scanner.resolve("libshared.so", &fx.requester(None)).unwrap() {
            Resolution::Ambiguous { candidates } => assert_eq!(candidates, [a, b]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prefer_rule_picks_first_candidate() {
        let fx = Fixture::new();
        let a = fx.write("qt/libshared.so", &lib(b"one"));
        fx.write("extra/libshared.so", &lib(b"two"));
        let scanner = fx.scanner(fx.builder().prefer_first("libshared.*"));

        match scanner.resolve("libshared.so", &fx.requester(None)).unwrap() {
            Resolution::Found(found) => assert_eq!(found.path(), a),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn system_only_candidates() {
        let fx = Fixture::new();
        let sys = fx.write("system/libz.so.1", &lib(b"zlib"));
        let scanner = fx.scanner(fx.builder());

        match scanner.resolve("libz.so.1", &fx.requester(None)).unwrap() {
            Resolution::System(a) => assert_eq!(a.path(), sys),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unresolved_lists_searched_roots() {
        let fx = Fixture::new();
        let scanner = fx.scanner(fx.builder());

        match scanner.resolve("libnowhere.so", &fx.requester(None)).unwrap() {
            Resolution::Unresolved { searched } => {
                assert_eq!(
                    searched,
                    [
                        fx.path("pkg/lib"),
                        fx.path("qt"),
                        fx.path("extra"),
                        fx.path("system")
                    ]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn follows_requester_runpath() {
        let fx = Fixture::new();
        let dep = fx.write("deps/libcore.so", &lib(b"core"));
        let scanner = fx.scanner(fx.builder());

        match scanner
            .resolve("libcore.so", &fx.requester(Some("$ORIGIN/../deps")))
            .unwrap()
        {
            Resolution::Found(a) => assert_eq!(a.path(), fx.path("pkg/../deps/libcore.so")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(dep.is_file());
    }

    #[test]
    fn skips_linker_scripts_and_foreign_formats() {
        let fx = Fixture::new();
        fx.write("qt/libcore.so", b"/* GNU ld script */ GROUP ( libcore.so.1 )");
        fx.write("extra/libcore.so", &testdata::pe(&[]));
        let real = fx.write("system/libcore.so", &lib(b"core"));
        let scanner = fx.scanner(fx.builder());

        match scanner.resolve("libcore.so", &fx.requester(None)).unwrap() {
            Resolution::System(a) => assert_eq!(a.path(), real),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn case_insensitive_lookup_for_windows() {
        let fx = Fixture::new();
        let dll = fx.write("qt/Qt6Core.dll", &testdata::pe(&[]));
        let scanner = fx.scanner(fx.builder().target(TargetPlatform::Windows));
        let requester = Artifact::from_bytes(&fx.path("pkg/QtCore.pyd"), &testdata::pe(&["QT6CORE.DLL"])).unwrap();

        match scanner.resolve("QT6CORE.DLL", &requester).unwrap() {
            Resolution::Found(a) => assert_eq!(a.path(), dll),
            other => panic!("unexpected {other:?}"),
        }
    }
}
