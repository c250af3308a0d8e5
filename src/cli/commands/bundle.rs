//! The `bundle` command.

use crate::{
    bundler::{Bundler, ConfigFile, EdgeTarget, Planned, SettingsBuilder},
    cli::{RuntimeConfig, args::BundleArgs},
    error::Result,
};

/// Seeds a settings builder from the configuration file, then applies the
/// command line on top: lists are extended, scalars overridden.
pub fn settings_builder(args: &BundleArgs) -> Result<SettingsBuilder> {
    let mut builder = SettingsBuilder::new();
    if let Some(file) = ConfigFile::discover(args.config.as_deref(), &args.package_dir)? {
        builder = file.apply(builder);
    }

    builder = builder.package_dir(&args.package_dir);
    if let Some(root) = &args.toolkit_root {
        builder = builder.toolkit_root(root);
    }
    for root in &args.search_roots {
        builder = builder.search_root(root);
    }
    for pattern in &args.exclude {
        builder = builder.exclude(pattern);
    }
    for pattern in &args.prefer_first {
        builder = builder.prefer_first(pattern);
    }
    for artifact in &args.artifacts {
        builder = builder.artifact(artifact);
    }
    if let Some(lib_dir) = &args.lib_dir {
        builder = builder.lib_dir(lib_dir);
    }
    if let Some(target) = args.target {
        builder = builder.target(target);
    }
    if !args.system_roots.is_empty() {
        builder = builder.system_roots(args.system_roots.clone());
    }
    if args.no_default_exclusions {
        builder = builder.default_exclusions(false);
    }
    if args.bundle_system_libraries {
        builder = builder.bundle_system_libraries(true);
    }
    if args.allow_signature_invalidation {
        builder = builder.allow_signature_invalidation(true);
    }
    if let Some(command) = &args.resign_command {
        builder = builder.resign_command(command);
    }
    if let Some(name) = &args.manifest_name {
        builder = builder.manifest_name(name);
    }
    if let Some(jobs) = args.jobs {
        builder = builder.jobs(jobs);
    }
    Ok(builder)
}

/// Runs `bundle`.
pub async fn execute(args: &BundleArgs, config: &RuntimeConfig) -> Result<i32> {
    run_bundle(settings_builder(args)?, args.dry_run, config).await
}

/// Builds the settings and bundles, or only plans with `dry_run`.
pub async fn run_bundle(builder: SettingsBuilder, dry_run: bool, config: &RuntimeConfig) -> Result<i32> {
    let settings = builder.build()?;
    config.section(&format!(
        "Bundling {} ({})",
        settings.package_dir().display(),
        settings.target()
    ))?;
    let bundler = Bundler::new(settings);

    if dry_run {
        let planned = bundler.plan().await?;
        print_plan(&planned, config)?;
        config.success("Dry run complete, package not modified")?;
        return Ok(0);
    }

    let report = bundler.bundle().await?;
    let assembly = &report.assembly;
    for library in &assembly.manifest.libraries {
        config.indent(&format!("{}  {}", library.path, library.identity.short()))?;
    }
    if assembly.committed {
        config.success(&format!(
            "Bundled {} librar{} ({} copied, {} file(s) rewritten)",
            assembly.manifest.libraries.len(),
            if assembly.manifest.libraries.len() == 1 { "y" } else { "ies" },
            assembly.copied,
            assembly.rewritten
        ))?;
    } else {
        config.success("Package already up to date")?;
    }
    config.verbose_println(&format!("Package checksum: {}", report.checksum))?;
    Ok(0)
}

fn print_plan(planned: &Planned, config: &RuntimeConfig) -> Result<()> {
    let plan = &planned.plan;

    config.progress(&format!("{} artifact(s):", plan.artifacts().count()))?;
    for (_, entry) in plan.artifacts() {
        config.indent(&entry.destination().display().to_string())?;
    }

    config.progress(&format!("{} librar(ies) to bundle:", plan.libraries().count()))?;
    for (_, entry) in plan.libraries() {
        config.indent(&format!(
            "{} <- {}",
            entry.destination().display(),
            entry.artifact().path().display()
        ))?;
        for alias in entry.sources().iter().skip(1) {
            config.verbose_println(&format!("    same content as {}", alias.display()))?;
        }
    }

    for edge in plan.edges() {
        let from = plan.entry(edge.from).destination().display();
        match &edge.target {
            EdgeTarget::Excluded(pattern) => config.verbose_println(&format!(
                "{from}: {} excluded by '{pattern}'",
                edge.specifier
            ))?,
            EdgeTarget::System(path) => config.verbose_println(&format!(
                "{from}: {} provided by the system ({})",
                edge.specifier,
                path.display()
            ))?,
            EdgeTarget::Bundled(_) => {}
        }
    }

    let changed: Vec<_> = planned
        .rewrites
        .iter()
        .filter(|r| r.modifies_file())
        .collect();
    config.progress(&format!("{} file(s) to rewrite:", changed.len()))?;
    for rewrite in changed {
        config.indent(&format!(
            "{}: {}",
            rewrite.destination().display(),
            rewrite.search_paths().join(":")
        ))?;
        for (old, new) in rewrite.renames() {
            config.verbose_println(&format!("    {old} -> {new}"))?;
        }
    }
    Ok(())
}
