//! Shared-library bundling for packages of native extension modules.
//!
//! The bundler works in two phases. Planning discovers the package's native
//! binaries, computes the transitive closure of their shared-library
//! dependencies and freezes it into a [`BundlePlan`]. Applying copies the
//! planned libraries into a staged copy of the package, rewrites library
//! search metadata, writes a manifest and swaps the staged tree into place.
//!
//! # Module Organization
//!
//! - [`platform`] - ELF, Mach-O and PE behind [`PlatformAdapter`]
//! - [`scanner`] - resolution of dependency specifiers over ordered roots
//! - [`graph`] - closure computation and the frozen plan
//! - [`rewriter`] - relative search paths and install names
//! - [`assembler`] - staging, manifest and atomic commit
//! - [`builder`] - the [`Bundler`] orchestrator
//! - [`settings`] - validated configuration
//! - [`toolkit`] - staging of a toolkit installation's libraries

pub mod assembler;
pub mod builder;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod platform;
pub mod rewriter;
pub mod scanner;
pub mod settings;
pub mod toolkit;
mod utils;

pub use builder::{BundleReport, Bundler, Planned};
pub use error::{Error, Result};
pub use graph::{BundlePlan, DependencyEdge, EdgeTarget, EntryKind, PlanEntry};
pub use manifest::BundleManifest;
pub use platform::{Artifact, BinaryFormat, ContentId, PlatformAdapter, Signature};
pub use settings::{ConfigFile, Settings, SettingsBuilder, TargetPlatform};
