//! Re-signing of rewritten binaries.
//!
//! Signing itself is never performed here: the user supplies a command
//! (for example `codesign --force --sign -`) that is run once per file with
//! the file path appended.

use crate::bundler::{
    error::{Error, Result},
    settings::ResignCommand,
};
use std::path::Path;

/// Runs `command` on each of `files` in order, stopping at the first failure.
pub async fn resign_files(command: &ResignCommand, files: &[&Path]) -> Result<()> {
    for file in files {
        log::info!("Re-signing {}", file.display());

        let output = tokio::process::Command::new(command.program())
            .args(command.args())
            .arg(file)
            .output()
            .await
            .map_err(|error| Error::CommandFailed {
                command: command.program().display().to_string(),
                error,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::RewriteConflict {
                path: file.to_path_buf(),
                reason: format!(
                    "re-sign command exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            });
        }
    }
    Ok(())
}
