//! Staging of a toolkit installation's redistributable libraries.
//!
//! A toolkit installation directory is named after its architecture
//! (`/opt/Qt/6.7.2/gcc_64`, `.../macos`, `.../msvc2019_64`). That name
//! determines the target platform and the wheel platform tag; the
//! installation's library directory, minus debug files, is staged into a
//! temporary root that is then searched first.

use crate::bundler::{
    error::{Error, ErrorExt, Result},
    platform::macho,
    settings::TargetPlatform,
    utils::fs,
};
use semver::Version;
use std::{
    fmt,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Requested macOS architecture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacArch {
    X86_64,
    Arm64,
    Universal2,
}

impl MacArch {
    fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
            Self::Universal2 => "universal2",
        }
    }
}

impl fmt::Display for MacArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MacArch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x86_64" => Ok(Self::X86_64),
            "arm64" => Ok(Self::Arm64),
            "universal2" => Ok(Self::Universal2),
            other => Err(Error::ConfigurationError(format!(
                "unknown architecture '{other}', expected x86_64, arm64 or universal2"
            ))),
        }
    }
}

/// What a toolkit installation directory says about its binaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolkitTarget {
    pub target: TargetPlatform,
    pub platform_tag: String,
    pub version: Version,
    /// Architecture to extract from the installation's universal binaries.
    pub thin_arch: Option<MacArch>,
}

impl ToolkitTarget {
    /// Derives the target from the installation directory's name.
    ///
    /// `arch` may only be given for macOS installations of versions that
    /// ship universal binaries (5.15.10 and later, or 6.2 and later).
    pub fn derive(arch_dir: &str, version: Version, arch: Option<MacArch>) -> Result<Self> {
        let mut thin_arch = None;
        let (target, platform_tag) = if let Some(rest) = arch_dir.strip_prefix("gcc_") {
            reject_arch(arch, arch_dir)?;
            let tag = if rest == "arm64" {
                "manylinux_2_39_aarch64"
            } else if version.major >= 6 {
                "manylinux_2_28_x86_64"
            } else {
                "manylinux2014_x86_64"
            };
            (TargetPlatform::Linux, tag.to_string())
        } else if matches!(arch_dir, "macos" | "clang_64" | "x86_64" | "arm64") {
            let tag = macos_tag(arch_dir, &version, arch)?;
            // only reached with --arch on installations that ship universal binaries
            thin_arch = arch.filter(|a| *a != MacArch::Universal2);
            (TargetPlatform::MacOs, tag)
        } else if arch_dir.starts_with("msvc") {
            reject_arch(arch, arch_dir)?;
            let tag = if arch_dir.ends_with("_arm64") {
                "win_arm64"
            } else if arch_dir.ends_with("_64") {
                "win_amd64"
            } else {
                "win32"
            };
            (TargetPlatform::Windows, tag.to_string())
        } else {
            return Err(Error::ConfigurationError(format!(
                "toolkit architecture '{arch_dir}' is unsupported"
            )));
        };

        Ok(Self {
            target,
            platform_tag,
            version,
            thin_arch,
        })
    }
}

fn reject_arch(arch: Option<MacArch>, arch_dir: &str) -> Result<()> {
    match arch {
        Some(arch) => Err(Error::ConfigurationError(format!(
            "--arch {arch} is only valid for macOS toolkits, not '{arch_dir}'"
        ))),
        None => Ok(()),
    }
}

fn macos_tag(arch_dir: &str, version: &Version, arch: Option<MacArch>) -> Result<String> {
    let v = (version.major, version.minor, version.patch);
    let thin_only = v < (5, 15, 10) || ((6, 0, 0) <= v && v < (6, 2, 0));

    let subarch = if thin_only {
        if arch.is_some() {
            return Err(Error::ConfigurationError(
                "--arch requires toolkit 5.15.10 or later, or 6.2 or later".into(),
            ));
        }
        "x86_64"
    } else {
        match arch {
            Some(arch) => arch.as_str(),
            None if matches!(arch_dir, "x86_64" | "arm64") => arch_dir,
            None => "universal2",
        }
    };

    let sdk = if subarch == "arm64" {
        "11_0"
    } else if version.major == 5 {
        "10_13"
    } else {
        "10_14"
    };
    Ok(format!("macosx_{sdk}_{subarch}"))
}

/// Reads the toolkit version: `explicit` if given, otherwise the name of the
/// installation directory's parent (`/opt/Qt/6.7.2/gcc_64` → 6.7.2).
/// Two-component versions are accepted.
pub fn toolkit_version(toolkit_dir: &Path, explicit: Option<&str>) -> Result<Version> {
    let text = match explicit {
        Some(text) => text.to_string(),
        None => toolkit_dir
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "cannot infer the toolkit version from {}; pass --toolkit-version",
                    toolkit_dir.display()
                ))
            })?,
    };

    let padded = if text.matches('.').count() == 1 {
        format!("{text}.0")
    } else {
        text.clone()
    };
    Version::parse(&padded).map_err(|e| {
        Error::ConfigurationError(format!("invalid toolkit version '{text}': {e}"))
    })
}

/// True for files that only exist for debugging.
pub fn is_debug(name: &str, target: TargetPlatform) -> bool {
    match target {
        TargetPlatform::Linux => name.ends_with(".debug"),
        TargetPlatform::MacOs => name.ends_with("_debug.dylib") || name.ends_with(".dSYM"),
        TargetPlatform::Windows => {
            // a few release DLLs happen to end in 'd'
            if name.ends_with("backend.dll") {
                return false;
            }
            name.ends_with(".pdb") || name.ends_with("d.dll")
        }
    }
}

/// Library directory of an installation: `lib`, or `bin` on Windows.
pub fn library_dir(toolkit_dir: &Path, target: TargetPlatform) -> PathBuf {
    toolkit_dir.join(target.library_dir_name())
}

/// Copies the installation's non-debug libraries into `into`.
pub async fn stage_libraries(toolkit_dir: &Path, target: TargetPlatform, into: &Path) -> Result<()> {
    let source = library_dir(toolkit_dir, target);
    if !source.is_dir() {
        return Err(Error::ConfigurationError(format!(
            "toolkit library directory {} does not exist",
            source.display()
        )));
    }

    log::info!("Staging toolkit libraries from {}", source.display());
    fs::copy_dir(&source, into, move |rel| {
        let name = rel
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let skip = is_debug(&name, target) || name.ends_with(".prl");
        if skip {
            log::debug!("Skipping {}", rel.display());
        }
        skip
    })
    .await
}

/// Extracts one architecture from universal Mach-O files with `lipo`.
#[derive(Clone, Debug)]
pub struct Thinner {
    lipo: PathBuf,
    arch: MacArch,
}

impl Thinner {
    /// Locates `lipo` for thinning to `arch`.
    ///
    /// # Errors
    ///
    /// [`Error::ConfigurationError`] if `lipo` is not on the `PATH`.
    pub fn locate(arch: MacArch) -> Result<Self> {
        let lipo = which::which("lipo").map_err(|e| {
            Error::ConfigurationError(format!(
                "'lipo' from Xcode is needed to extract {arch} libraries: {e}"
            ))
        })?;
        Ok(Self::with_program(lipo, arch))
    }

    pub fn with_program(lipo: PathBuf, arch: MacArch) -> Self {
        Self { lipo, arch }
    }

    /// Thins every universal Mach-O file under `dir` in place and returns
    /// how many were thinned. A file `lipo` cannot thin stays universal.
    ///
    /// A thinned slice keeps its own code signature, so no re-signing is
    /// needed here.
    pub async fn thin_tree(&self, dir: &Path) -> Result<usize> {
        let mut thinned = 0;
        for path in universal_files(dir)? {
            if self.thin(&path).await? {
                thinned += 1;
            }
        }
        log::info!("Thinned {thinned} universal file(s) to {}", self.arch);
        Ok(thinned)
    }

    async fn thin(&self, path: &Path) -> Result<bool> {
        let mut thin_name = path.file_name().unwrap_or_default().to_os_string();
        thin_name.push(".thin");
        let thin_path = path.with_file_name(thin_name);

        let output = tokio::process::Command::new(&self.lipo)
            .arg("-thin")
            .arg(self.arch.as_str())
            .arg("-output")
            .arg(&thin_path)
            .arg(path)
            .output()
            .await
            .map_err(|error| Error::CommandFailed {
                command: self.lipo.display().to_string(),
                error,
            })?;

        if !output.status.success() {
            log::warn!(
                "Keeping {} universal: lipo exited with {}: {}",
                path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            let _ = tokio::fs::remove_file(&thin_path).await;
            return Ok(false);
        }

        log::debug!("Thinned {} to {}", path.display(), self.arch);
        tokio::fs::rename(&thin_path, path)
            .await
            .fs_context("failed to replace universal file", path)?;
        Ok(true)
    }
}

/// Regular files under `dir` that are universal Mach-O binaries, in path
/// order. Symlinks are skipped; their targets are visited directly.
fn universal_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let mut head = Vec::with_capacity(8);
        std::fs::File::open(entry.path())
            .and_then(|file| file.take(8).read_to_end(&mut head))
            .fs_context("failed to read", entry.path())?;
        if macho::is_universal(&head) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}
