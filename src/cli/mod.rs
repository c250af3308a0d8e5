//! Command line interface for the toolkit bundler.
//!
//! This module provides the CLI for bundler operations, with argument
//! parsing, command execution, exit codes and user feedback.

mod args;
pub mod commands;
mod output;

pub use args::{Args, BundleArgs, Command, RuntimeConfig, ToolkitArgs};
pub use output::OutputManager;

use crate::error::{BundlerError, CliError, Result};

/// Main CLI entry point: runs the parsed command and returns the process
/// exit code. Errors are reported here and mapped to their exit code.
pub async fn run(args: Args) -> Result<i32> {
    let config = RuntimeConfig::from(&args);

    let outcome = match args.validate() {
        Ok(()) => execute(&args, &config).await,
        Err(reason) => Err(CliError::InvalidArguments { reason }.into()),
    };

    match outcome {
        Ok(code) => Ok(code),
        Err(e) => {
            report(&config, &e)?;
            Ok(e.exit_code())
        }
    }
}

async fn execute(args: &Args, config: &RuntimeConfig) -> Result<i32> {
    match &args.command {
        Command::Bundle(bundle) => commands::bundle::execute(bundle, config).await,
        Command::BundleToolkit(toolkit) => commands::bundle_toolkit::execute(toolkit, config).await,
    }
}

fn report(config: &RuntimeConfig, error: &BundlerError) -> std::io::Result<()> {
    config.output().error(&error.to_string())
}
