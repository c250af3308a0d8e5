use super::{BinaryFormat, ContentId, Signature, adapter_for};
use crate::bundler::error::{ErrorExt, Result};
use std::path::{Path, PathBuf};

/// A scanned binary: extension module or shared library.
///
/// Immutable once scanned.
#[derive(Clone, Debug)]
pub struct Artifact {
    path: PathBuf,
    format: BinaryFormat,
    dependencies: Vec<String>,
    search_paths: Vec<String>,
    signature: Option<Signature>,
    identity: ContentId,
}

impl Artifact {
    /// Reads and parses the binary at `path`.
    pub fn scan(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).fs_context("failed to read", path)?;
        Self::from_bytes(path, &bytes)
    }

    /// Parses an in-memory copy of the binary at `path`.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Result<Self> {
        let adapter = adapter_for(path, bytes)?;

        Ok(Self {
            path: path.to_path_buf(),
            format: adapter.format(),
            dependencies: adapter.list_dependencies(path, bytes)?,
            search_paths: adapter.search_paths(path, bytes)?,
            signature: adapter.signature(path, bytes)?,
            identity: adapter.compute_identity(path, bytes)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> BinaryFormat {
        self.format
    }

    /// Declared dependency specifiers, in declaration order.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn search_paths(&self) -> &[String] {
        &self.search_paths
    }

    pub fn signature(&self) -> Option<Signature> {
        self.signature
    }

    pub fn identity(&self) -> &ContentId {
        &self.identity
    }

    /// Directory the binary lives in, used to expand `$ORIGIN` and
    /// `@loader_path`.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::platform::testdata;

    #[test]
    fn scan_collects_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.so");
        std::fs::write(&path, testdata::elf(&["libcore.so", "libc.so.6"], Some("/opt/qt/lib"))).unwrap();

        let artifact = Artifact::scan(&path).unwrap();
        assert_eq!(artifact.format(), BinaryFormat::Elf);
        assert_eq!(artifact.dependencies(), ["libcore.so", "libc.so.6"]);
        assert_eq!(artifact.search_paths(), ["/opt/qt/lib"]);
        assert_eq!(artifact.signature(), None);
        assert_eq!(artifact.directory(), dir.path());
    }

    #[test]
    fn identical_bytes_identical_identity() {
        let bytes = testdata::macho(&["@rpath/libshared.dylib"], &["@loader_path"]);
        let a = Artifact::from_bytes(Path::new("/a/lib.dylib"), &bytes).unwrap();
        let b = Artifact::from_bytes(Path::new("/b/lib.dylib"), &bytes).unwrap();
        assert_eq!(a.identity(), b.identity());
    }
}
