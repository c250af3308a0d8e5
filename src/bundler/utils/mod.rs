//! Helper utilities shared across bundler modules.

pub mod fs;
