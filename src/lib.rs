//! Shared-library bundler for packages of native Python extension modules.
//!
//! Resolves the native libraries that a package's extension modules depend
//! on (ELF, Mach-O and PE), copies them into the package and rewrites each
//! binary's library search metadata so the bundled copies are found at
//! runtime.
//!
//! It can be used both as a CLI tool (`toolkit-bundle`) and as a library
//! dependency through [`bundler::Bundler`].

pub mod bundler;
pub mod cli;
pub mod error;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
