//! Error types for bundling operations.
//!
//! Every domain error names the artifact it concerns, the dependency
//! specifier involved and the candidates or roots that were considered.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Result type alias for bundler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while planning or applying a bundle.
#[derive(Debug, Error)]
pub enum Error {
    /// An error with additional context prepended.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// A filesystem operation failed on a specific path.
    #[error("{context} {}: {error}", .path.display())]
    Fs {
        context: &'static str,
        path: PathBuf,
        error: std::io::Error,
    },

    /// The configuration is invalid. Raised before any I/O on the package.
    #[error("invalid configuration: {0}")]
    ConfigurationError(String),

    /// No platform adapter recognizes the file contents.
    #[error("unsupported binary format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },

    /// Two candidates share a name but differ in content.
    #[error(
        "ambiguous dependency '{specifier}' of {}: candidates differ in content: {}",
        .artifact.display(),
        join_paths(.candidates)
    )]
    AmbiguousDependency {
        artifact: PathBuf,
        specifier: String,
        candidates: Vec<PathBuf>,
    },

    /// A non-excluded dependency could not be found anywhere.
    #[error(
        "missing dependency '{specifier}' of {}: searched {}",
        .artifact.display(),
        join_paths(.searched)
    )]
    MissingDependency {
        artifact: PathBuf,
        specifier: String,
        searched: Vec<PathBuf>,
    },

    /// Rewriting the artifact is not possible without breaking it.
    #[error("cannot rewrite {}: {reason}", .path.display())]
    RewriteConflict { path: PathBuf, reason: String },

    /// The binary has no room left for the new metadata.
    #[error(
        "not enough room in {} for {what}: need {needed} bytes, {available} available",
        .path.display()
    )]
    InsufficientSpace {
        path: PathBuf,
        what: String,
        needed: usize,
        available: usize,
    },

    /// The binary could not be parsed.
    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    /// An external command could not be started.
    #[error("failed to run {command}: {error}")]
    CommandFailed {
        command: String,
        error: std::io::Error,
    },

    /// Several scan-phase errors reported together.
    #[error("{} problems found:\n{}", .0.len(), join_errors(.0))]
    Batch(Vec<Error>),

    /// I/O error without a known path.
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    /// Directory traversal error.
    #[error("{0}")]
    Walk(#[from] walkdir::Error),

    /// JSON serialization error.
    #[error("manifest serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other error.
    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Builds a parse error from a goblin failure.
    pub fn parse(path: &Path, error: impl Display) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }

    /// Collapses a list of errors into one, keeping single errors unwrapped.
    pub fn batch(mut errors: Vec<Error>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Batch(errors)
        }
    }

    /// Returns true if the error stems from invalid configuration.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::ConfigurationError(_) => true,
            Self::Context(_, inner) => inner.is_configuration(),
            Self::Batch(errors) => !errors.is_empty() && errors.iter().all(Self::is_configuration),
            _ => false,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(nothing)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Attaches a path and description to I/O failures.
pub trait ErrorExt<T> {
    /// Wraps the I/O error into [`Error::Fs`].
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Adds a human readable context to results and options.
pub trait Context<T> {
    /// Prepends `context` to the error, or turns `None` into an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }
}

/// Returns early with a [`Error::GenericError`] built from a format string.
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::Error::GenericError(format!($msg)))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($fmt, $($arg)*)))
    };
}
