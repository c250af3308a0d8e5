//! Name patterns for excluding and disambiguating libraries.

use crate::bundler::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::fmt;

/// A compiled glob matched against dependency names.
///
/// Patterns without a `/` match the final path component of a specifier,
/// so `libsystem.*` matches both `libsystem.so` and `/usr/lib/libsystem.so`.
/// Patterns with a `/` match the whole specifier.
#[derive(Clone, Debug)]
struct NamePattern {
    pattern: Pattern,
    whole_path: bool,
    options: MatchOptions,
}

impl NamePattern {
    fn new(kind: &str, source: &str, case_insensitive: bool) -> Result<Self> {
        let pattern = Pattern::new(source).map_err(|e| {
            Error::ConfigurationError(format!("invalid {kind} pattern '{source}': {e}"))
        })?;
        Ok(Self {
            pattern,
            whole_path: source.contains('/'),
            options: MatchOptions {
                case_sensitive: !case_insensitive,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
        })
    }

    fn matches(&self, specifier: &str) -> bool {
        let subject = if self.whole_path {
            specifier
        } else {
            specifier
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(specifier)
        };
        self.pattern.matches_with(subject, self.options)
    }
}

/// Libraries assumed present on the target system. Matching dependencies
/// are never bundled and never reported missing.
#[derive(Clone, Debug)]
pub struct ExclusionRule(NamePattern);

impl ExclusionRule {
    /// Compiles a glob. Fails with [`Error::ConfigurationError`] if the
    /// pattern is invalid.
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self> {
        NamePattern::new("exclusion", pattern, case_insensitive).map(Self)
    }

    pub fn matches(&self, specifier: &str) -> bool {
        self.0.matches(specifier)
    }

    pub fn pattern(&self) -> &str {
        self.0.pattern.as_str()
    }
}

impl fmt::Display for ExclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pattern())
    }
}

/// Libraries for which the first candidate by root order wins even when
/// several candidates with the same name differ in content.
#[derive(Clone, Debug)]
pub struct PreferRule(NamePattern);

impl PreferRule {
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self> {
        NamePattern::new("prefer-first", pattern, case_insensitive).map(Self)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.0.matches(name)
    }

    pub fn pattern(&self) -> &str {
        self.0.pattern.as_str()
    }
}
