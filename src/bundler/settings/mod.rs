//! Configuration structures for bundling operations.
//!
//! [`SettingsBuilder`] validates everything up front and produces an
//! immutable [`Settings`] that is shared by every component. An optional
//! TOML file ([`ConfigFile`]) seeds the builder before command line options.

mod builder;
mod core;
mod file;
mod rules;
mod target;

pub use builder::SettingsBuilder;
pub use core::{DEFAULT_MANIFEST_NAME, ResignCommand, Settings};
pub use file::{BundleSection, ConfigFile, DEFAULT_CONFIG_NAME};
pub use rules::{ExclusionRule, PreferRule};
pub use target::TargetPlatform;
