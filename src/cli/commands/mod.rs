//! Command execution functions for bundler operations.

pub mod bundle;
pub mod bundle_toolkit;
