//! Target platform types and their conventions.

use crate::bundler::platform::BinaryFormat;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

/// Operating system the package is built for.
///
/// Determines the expected binary format, the default system library roots
/// and exclusions, and whether library names compare case-insensitively.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    /// Linux (ELF, manylinux conventions)
    Linux,
    /// macOS (Mach-O, thin or universal)
    #[serde(rename = "macos")]
    MacOs,
    /// Windows (PE)
    Windows,
}

impl TargetPlatform {
    /// The platform this process runs on. Unknown Unix flavours are treated
    /// as Linux.
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// The binary format native to this platform.
    pub fn format(self) -> BinaryFormat {
        match self {
            Self::Linux => BinaryFormat::Elf,
            Self::MacOs => BinaryFormat::MachO,
            Self::Windows => BinaryFormat::Pe,
        }
    }

    /// Directory holding a toolkit installation's shared libraries.
    ///
    /// Windows keeps DLLs next to executables in `bin`.
    pub fn library_dir_name(self) -> &'static str {
        match self {
            Self::Windows => "bin",
            Self::Linux | Self::MacOs => "lib",
        }
    }

    /// Windows file names are case-insensitive.
    pub fn case_insensitive(self) -> bool {
        self == Self::Windows
    }

    /// Roots searched last; libraries found only here are tagged `system`.
    pub fn default_system_roots(self) -> Vec<PathBuf> {
        let roots: &[&str] = match self {
            Self::Linux => &[
                "/lib",
                "/lib64",
                "/usr/lib",
                "/usr/lib64",
                "/lib/x86_64-linux-gnu",
                "/usr/lib/x86_64-linux-gnu",
                "/lib/aarch64-linux-gnu",
                "/usr/lib/aarch64-linux-gnu",
                "/usr/local/lib",
            ],
            Self::MacOs => &[
                "/usr/lib",
                "/usr/local/lib",
                "/Library/Frameworks",
                "/System/Library/Frameworks",
            ],
            Self::Windows => &["C:\\Windows\\System32"],
        };
        roots.iter().map(PathBuf::from).collect()
    }

    /// Libraries every installation of the platform provides, plus the
    /// Python interpreter the extension modules are loaded into.
    pub fn default_exclusions(self) -> &'static [&'static str] {
        match self {
            Self::Linux => &[
                "linux-vdso.so*",
                "ld-linux*.so*",
                "libc.so*",
                "libm.so*",
                "libdl.so*",
                "librt.so*",
                "libpthread.so*",
                "libutil.so*",
                "libresolv.so*",
                "libgcc_s.so*",
                "libstdc++.so*",
                "libGL.so*",
                "libEGL.so*",
                "libX11.so*",
                "libxcb.so*",
                "libfontconfig.so*",
                "libfreetype.so*",
                "libglib-2.0.so*",
                "libpython3*.so*",
            ],
            Self::MacOs => &[
                "/usr/lib/*",
                "/System/Library/*",
                "libSystem.B.dylib",
                "libc++.1.dylib",
                "*Python.framework/*",
            ],
            Self::Windows => &[
                "api-ms-win-*.dll",
                "ext-ms-*.dll",
                "kernel32.dll",
                "user32.dll",
                "gdi32.dll",
                "advapi32.dll",
                "shell32.dll",
                "ole32.dll",
                "oleaut32.dll",
                "ws2_32.dll",
                "winmm.dll",
                "version.dll",
                "ucrtbase.dll",
                "vcruntime140*.dll",
                "msvcp140*.dll",
                "python3*.dll",
            ],
        }
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        })
    }
}

impl FromStr for TargetPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" | "osx" => Ok(Self::MacOs),
            "windows" | "win32" | "win" => Ok(Self::Windows),
            other => Err(format!(
                "unknown target platform '{other}' (expected linux, macos or windows)"
            )),
        }
    }
}
