//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap.

use crate::bundler::{TargetPlatform, toolkit::MacArch};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bundles a GUI toolkit's shared libraries into a package of native
/// extension modules
#[derive(Parser, Debug)]
#[command(
    name = "toolkit-bundle",
    version,
    about = "Bundles a GUI toolkit's shared libraries into a package of native extension modules",
    long_about = "Resolves the shared libraries the package's native binaries depend on, copies \
them into the package and rewrites the binaries' library search paths so the bundled copies \
are used at runtime.

Usage:
  toolkit-bundle bundle build/PyQt6 --toolkit-root /opt/Qt/6.7.2/gcc_64/lib
  toolkit-bundle bundle-toolkit build/PyQt6 --toolkit-dir /opt/Qt/6.7.2/macos --arch arm64

Exit codes: 0 success, 1 resolution or bundling failure, 2 invalid configuration."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bundle the libraries found under the given roots into a package
    Bundle(BundleArgs),

    /// Stage a toolkit installation's redistributable libraries, then bundle
    BundleToolkit(ToolkitArgs),
}

/// Options shared by both commands.
#[derive(clap::Args, Debug, Clone)]
pub struct BundleArgs {
    /// Package directory to bundle into
    #[arg(value_name = "PACKAGE_DIR")]
    pub package_dir: PathBuf,

    /// Toolkit library root, searched before any other root
    #[arg(long, value_name = "DIR")]
    pub toolkit_root: Option<PathBuf>,

    /// Extra library search root (repeatable, searched in order)
    #[arg(long = "search-root", value_name = "DIR")]
    pub search_roots: Vec<PathBuf>,

    /// Never bundle libraries matching this glob (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Take the first candidate by root order when candidates with a
    /// matching name differ in content (repeatable)
    #[arg(long = "prefer-first", value_name = "GLOB")]
    pub prefer_first: Vec<String>,

    /// Package-relative binary to scan (repeatable; default: every native
    /// binary in the package)
    #[arg(long = "artifact", value_name = "PATH")]
    pub artifacts: Vec<PathBuf>,

    /// Package-relative directory receiving bundled libraries
    #[arg(long, value_name = "REL")]
    pub lib_dir: Option<PathBuf>,

    /// Target platform: linux, macos or windows (default: host)
    #[arg(long, value_name = "PLATFORM")]
    pub target: Option<TargetPlatform>,

    /// System library root replacing the platform defaults (repeatable)
    #[arg(long = "system-root", value_name = "DIR")]
    pub system_roots: Vec<PathBuf>,

    /// Do not apply the platform's built-in exclusion list
    #[arg(long)]
    pub no_default_exclusions: bool,

    /// Bundle libraries found only under system roots
    #[arg(long)]
    pub bundle_system_libraries: bool,

    /// Rewrite signed binaries even though their signature becomes invalid
    #[arg(long)]
    pub allow_signature_invalidation: bool,

    /// Command run on every rewritten signed binary, with its path appended
    #[arg(long, value_name = "CMD")]
    pub resign_command: Option<String>,

    /// File name of the manifest written at the package root
    #[arg(long, value_name = "NAME")]
    pub manifest_name: Option<String>,

    /// Configuration file (default: toolkit-bundle.toml in the package)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of parallel scan tasks (default: number of CPUs)
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Print the plan without modifying the package
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ToolkitArgs {
    /// Toolkit installation directory, named after its architecture
    /// (e.g. /opt/Qt/6.7.2/gcc_64)
    #[arg(long, value_name = "DIR")]
    pub toolkit_dir: PathBuf,

    /// Toolkit version (default: the installation's parent directory name)
    #[arg(long, value_name = "X.Y.Z")]
    pub toolkit_version: Option<String>,

    /// macOS architecture: x86_64, arm64 or universal2
    #[arg(long, value_name = "ARCH")]
    pub arch: Option<MacArch>,

    #[command(flatten)]
    pub bundle: BundleArgs,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Bundle(args) => args.validate(),
            Command::BundleToolkit(args) => {
                if args.bundle.toolkit_root.is_some() {
                    return Err(
                        "--toolkit-root cannot be combined with bundle-toolkit; use --toolkit-dir"
                            .to_string(),
                    );
                }
                args.bundle.validate()
            }
        }
    }
}

impl BundleArgs {
    fn validate(&self) -> Result<(), String> {
        if self.jobs == Some(0) {
            return Err("--jobs must be at least 1".to_string());
        }
        if self.resign_command.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err("--resign-command cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for terminal output
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        let output = super::OutputManager::new(args.verbose, args.quiet);
        Self { output }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print verbose message if in verbose mode
    pub fn verbose_println(&self, message: &str) -> std::io::Result<()> {
        self.output.verbose(message)
    }

    /// Print success message if not in quiet mode
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.output.success(message)
    }

    /// Print warning message
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.output.warn(message)
    }

    /// Print progress message
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.output.progress(message)
    }

    /// Print section header
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        self.output.section(title)
    }

    /// Print indented text
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.output.indent(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn bundle_options() {
        let args = parse(&[
            "toolkit-bundle",
            "bundle",
            "pkg",
            "--toolkit-root",
            "/qt/lib",
            "--exclude",
            "libsystem.*",
            "--exclude",
            "libfoo.*",
            "--search-root",
            "/extra",
            "--target",
            "macos",
            "-v",
        ]);

        assert!(args.verbose);
        let Command::Bundle(bundle) = args.command else {
            panic!("expected bundle");
        };
        assert_eq!(bundle.package_dir, PathBuf::from("pkg"));
        assert_eq!(bundle.exclude, ["libsystem.*", "libfoo.*"]);
        assert_eq!(bundle.search_roots, [PathBuf::from("/extra")]);
        assert_eq!(bundle.target, Some(TargetPlatform::MacOs));
    }

    #[test]
    fn bundle_toolkit_options() {
        let args = parse(&[
            "toolkit-bundle",
            "bundle-toolkit",
            "pkg",
            "--toolkit-dir",
            "/opt/Qt/6.7.2/macos",
            "--arch",
            "arm64",
            "--dry-run",
        ]);
        assert!(args.validate().is_ok());

        let Command::BundleToolkit(toolkit) = args.command else {
            panic!("expected bundle-toolkit");
        };
        assert_eq!(toolkit.arch, Some(MacArch::Arm64));
        assert!(toolkit.bundle.dry_run);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Args::try_parse_from(["toolkit-bundle", "bundle", "pkg", "--target", "beos"]).is_err());
        assert!(Args::try_parse_from(["toolkit-bundle", "bundle", "pkg", "-v", "-q"]).is_err());

        let args = parse(&[
            "toolkit-bundle",
            "bundle-toolkit",
            "pkg",
            "--toolkit-dir",
            "/opt/Qt/6.7.2/gcc_64",
            "--toolkit-root",
            "/qt",
        ]);
        assert!(args.validate().is_err());
    }
}
