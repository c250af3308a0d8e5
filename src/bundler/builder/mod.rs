//! Bundle orchestration and coordination.
//!
//! The [`Bundler`] orchestrator:
//! 1. Discovers the package's artifacts from [`Settings`](crate::bundler::Settings)
//! 2. Computes the dependency closure and the rewrites it implies
//! 3. Stages, rewrites and commits the package
//! 4. Reports the manifest and a checksum of the result
//!
//! # Module Organization
//!
//! - [`checksum`] - SHA-256 checksum of the committed package tree
//! - [`discovery`] - native binaries inside the package
//! - [`orchestrator`] - Main [`Bundler`] struct
//! - [`signing`] - external re-sign command

mod checksum;
mod discovery;
mod orchestrator;
pub(crate) mod signing;

pub use checksum::calculate_directory_sha256;
pub use discovery::discover_artifacts;
pub use orchestrator::{BundleReport, Bundler, Planned};
