//! Error types for the command line front end.
//!
//! [`BundlerError`] wraps the library's [`bundler::Error`](crate::bundler::Error)
//! together with CLI and I/O failures and maps each to a process exit code.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Exit code for resolution and bundling failures.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for invalid configuration or arguments.
pub const EXIT_CONFIGURATION: i32 = 2;

/// Main error type for all CLI operations
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("{0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bundler errors
    #[error("{0}")]
    Bundler(#[from] crate::bundler::Error),

    /// Generic errors from anyhow
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

impl BundlerError {
    /// Process exit code: 2 for invalid configuration or arguments, 1 for
    /// everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cli(_) => EXIT_CONFIGURATION,
            Self::Bundler(e) if e.is_configuration() => EXIT_CONFIGURATION,
            Self::Bundler(_) | Self::Io(_) | Self::Anyhow(_) => EXIT_FAILURE,
        }
    }
}
