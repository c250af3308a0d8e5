//! The `bundle-toolkit` command.
//!
//! Derives the target platform and wheel platform tag from the toolkit
//! installation directory, stages the installation's non-debug libraries
//! (thinned to one architecture when `--arch` asks for it) and delegates to
//! `bundle` with the staged root searched first.

use super::bundle::{run_bundle, settings_builder};
use crate::{
    bundler::toolkit::{Thinner, ToolkitTarget, stage_libraries, toolkit_version},
    cli::{RuntimeConfig, args::ToolkitArgs},
    error::{CliError, Result},
};
use anyhow::Context as _;
use path_absolutize::Absolutize;

/// Runs `bundle-toolkit`.
pub async fn execute(args: &ToolkitArgs, config: &RuntimeConfig) -> Result<i32> {
    let toolkit_dir = args
        .toolkit_dir
        .absolutize()
        .with_context(|| format!("cannot resolve {}", args.toolkit_dir.display()))?
        .into_owned();
    if !toolkit_dir.is_dir() {
        return Err(CliError::InvalidArguments {
            reason: format!("toolkit directory {} does not exist", toolkit_dir.display()),
        }
        .into());
    }

    let arch_dir = toolkit_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let version = toolkit_version(&toolkit_dir, args.toolkit_version.as_deref())?;
    let toolkit = ToolkitTarget::derive(&arch_dir, version, args.arch)?;

    if let Some(target) = args.bundle.target.filter(|t| *t != toolkit.target) {
        return Err(CliError::InvalidArguments {
            reason: format!(
                "--target {target} does not match the {} toolkit in {}",
                toolkit.target,
                toolkit_dir.display()
            ),
        }
        .into());
    }

    log::info!(
        "Toolkit {} ({arch_dir}): target {}, platform tag {}",
        toolkit.version,
        toolkit.target,
        toolkit.platform_tag
    );
    config.progress(&format!(
        "Toolkit {} for {} (platform tag {})",
        toolkit.version, toolkit.target, toolkit.platform_tag
    ))?;

    let thinner = toolkit.thin_arch.map(Thinner::locate).transpose()?;

    let staging = tempfile::Builder::new()
        .prefix("toolkit-libs-")
        .tempdir()
        .context("failed to create toolkit staging directory")?;
    stage_libraries(&toolkit_dir, toolkit.target, staging.path()).await?;
    if let Some(thinner) = &thinner {
        let thinned = thinner.thin_tree(staging.path()).await?;
        config.verbose_println(&format!("Thinned {thinned} universal file(s)"))?;
    }

    let builder = settings_builder(&args.bundle)?
        .toolkit_root(staging.path())
        .target(toolkit.target);
    let code = run_bundle(builder, args.bundle.dry_run, config).await?;

    // staged libraries are only needed until the package is committed
    drop(staging);
    Ok(code)
}
