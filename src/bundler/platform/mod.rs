//! Native binary formats behind one capability interface.
//!
//! Each supported format (ELF, Mach-O, PE) implements [`PlatformAdapter`].
//! The adapter for a file is chosen by sniffing its contents, never by its
//! extension.

mod artifact;
pub mod elf;
mod identity;
pub mod macho;
pub mod pe;
mod sniff;

#[cfg(test)]
pub(crate) mod testdata;

pub use artifact::Artifact;
pub use identity::{ContentId, hash_masked};

use crate::bundler::error::{Error, ErrorExt, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

/// The native binary formats the bundler understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryFormat {
    /// Executable and Linkable Format (Linux).
    Elf,
    /// Mach-O, thin or universal (macOS).
    #[serde(rename = "macho")]
    MachO,
    /// Portable Executable (Windows).
    Pe,
}

impl BinaryFormat {
    /// Detects the format from the leading bytes of a file.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        sniff::sniff(bytes)
    }

    /// Returns true if `bytes` start with a magic number of any supported
    /// format. Used to avoid reading whole files that cannot be binaries.
    pub fn has_magic(prefix: &[u8]) -> bool {
        sniff::has_magic(prefix)
    }
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Elf => "ELF",
            Self::MachO => "Mach-O",
            Self::Pe => "PE",
        })
    }
}

/// Kind of integrity signature embedded in a binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signature {
    /// `LC_CODE_SIGNATURE` load command.
    CodeSignature,
    /// Authenticode attribute certificate table.
    Authenticode,
}

/// Capabilities every binary format provides.
///
/// Implementations are stateless; all methods operate on the file contents.
/// `path` is only used for error reporting.
pub trait PlatformAdapter: Send + Sync {
    /// The format handled by this adapter.
    fn format(&self) -> BinaryFormat;

    /// Dependency specifiers in declaration order.
    fn list_dependencies(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>>;

    /// Library search paths embedded in the binary, in order.
    fn search_paths(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>>;

    /// Replaces the embedded search paths.
    ///
    /// Applying the value returned by [`search_paths`](Self::search_paths)
    /// must leave the bytes unchanged.
    fn set_search_paths(&self, path: &Path, bytes: &mut [u8], paths: &[String]) -> Result<()>;

    /// Renames a declared dependency. Returns false if `old` is not declared.
    fn replace_dependency(&self, path: &Path, bytes: &mut [u8], old: &str, new: &str)
    -> Result<bool>;

    /// The integrity signature carried by the binary, if any.
    fn signature(&self, path: &Path, bytes: &[u8]) -> Result<Option<Signature>>;

    /// Fingerprint that ignores every region the two setters may alter.
    fn compute_identity(&self, path: &Path, bytes: &[u8]) -> Result<ContentId>;
}

static ELF: elf::ElfAdapter = elf::ElfAdapter;
static MACHO: macho::MachOAdapter = macho::MachOAdapter;
static PE: pe::PeAdapter = pe::PeAdapter;

/// Returns the adapter for a format.
pub fn adapter(format: BinaryFormat) -> &'static dyn PlatformAdapter {
    match format {
        BinaryFormat::Elf => &ELF,
        BinaryFormat::MachO => &MACHO,
        BinaryFormat::Pe => &PE,
    }
}

/// Sniffs `bytes` and returns the matching adapter.
pub fn adapter_for(path: &Path, bytes: &[u8]) -> Result<&'static dyn PlatformAdapter> {
    BinaryFormat::sniff(bytes)
        .map(adapter)
        .ok_or_else(|| Error::UnsupportedFormat {
            path: path.to_path_buf(),
        })
}

/// Identifies the format of the file at `path`.
pub fn identify(path: &Path) -> Result<BinaryFormat> {
    let bytes = std::fs::read(path).fs_context("failed to read", path)?;
    adapter_for(path, &bytes).map(|a| a.format())
}
