//! Build command implementation
//!
//! Runs both build stages, then stages the package: artifacts, JSON descriptor
//! and CMake components file.

use std::time::Duration;

use camino::Utf8Path;
use clap::Args;
use jobserver::Client;
use miette::{IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;

use crate::build::{CmakeDriver, CmakeDriverOptions, PreparedStages, StageOrchestrator, StageProgress};
use crate::collect::{ArtifactCollector, ArtifactManifest};
use crate::config::Config;
use crate::distribution::{self, WorkspaceLayout};
use crate::export::write_cmake_components;
use crate::get_multi_progress;
use crate::locator::ConfiguredLocator;
use crate::package::PackageDescriptor;

/// Arguments for the build command
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Dry run - show the resolved stages without building
    #[arg(long)]
    pub dry_run: bool,

    /// Upper bound in seconds for each configure, build and install step
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip artifact collection and descriptor export
    #[arg(long)]
    pub no_collect: bool,
}

/// Run the build command
pub fn run(workspace_root: &Utf8Path, args: BuildArgs) -> Result<()> {
    let root = workspace_root.canonicalize_utf8().into_diagnostic()?;
    let config = Config::load(&root)?;

    // Reject a broken component graph before spending time on builds
    let descriptor = distribution::package_descriptor()?;

    let layout = WorkspaceLayout::new(&config, &root);
    let plan = distribution::build_plan(&config, &layout);
    let locator = ConfiguredLocator::from_config(&config.dependencies, &root);

    let jobs = args.jobs.unwrap_or_else(|| config.effective_jobs());
    let mut options = CmakeDriverOptions::from_config(&config, &root);
    options.jobs = jobs;
    let mut driver = CmakeDriver::new(options);

    if args.dry_run {
        let prepared = StageOrchestrator::new(&locator, &mut driver).prepare(&plan)?;
        print_plan(&prepared, &driver);
        return Ok(());
    }

    // SAFETY: `Client::from_env()` is unsafe because it may take ownership of file
    // descriptors named in MAKEFLAGS/CARGO_MAKEFLAGS. We are the process driving
    // the build, invalid values yield None, and the client is only handed to the
    // cmake build step.
    let jobserver = unsafe { Client::from_env() }.or_else(|| {
        tracing::debug!("Creating new jobserver with {} jobs", jobs);
        Client::new(jobs).ok()
    });
    if let Some(js) = jobserver {
        driver = driver.with_jobserver(js);
    }

    let progress = StageProgress::new_with_multi_progress(get_multi_progress());
    driver = driver.with_log_callback(progress.log_callback());

    let step_timeout = args
        .timeout
        .or(config.build.step_timeout_secs)
        .map(Duration::from_secs);

    // Stages run strictly one after the other; a single thread is enough
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let summary = rt.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling the running step");
                    cancel.cancel();
                }
            })
        };

        let result = StageOrchestrator::new(&locator, &mut driver)
            .with_step_timeout(step_timeout)
            .with_cancellation(cancel)
            .with_progress(progress)
            .run_build(&plan)
            .await;

        watcher.abort();
        result
    })?;

    tracing::info!(
        "Built {} stages in {:.1?}",
        summary.stages.len(),
        summary.elapsed
    );

    if args.no_collect {
        return Ok(());
    }

    let manifest = stage_package(&layout, &descriptor)?;
    tracing::info!(
        "Package staged at {} ({} files)",
        layout.staging_dir,
        manifest.len()
    );

    Ok(())
}

/// Collect artifacts and write the package exports into the staging layout
pub fn stage_package(
    layout: &WorkspaceLayout,
    descriptor: &PackageDescriptor,
) -> crate::Result<ArtifactManifest> {
    let manifest = ArtifactCollector::default().collect(&layout.install_dir, &layout.staging_dir)?;
    descriptor.write_json(&layout.staging_dir)?;
    write_cmake_components(descriptor, &layout.staging_dir)?;
    Ok(manifest)
}

fn print_plan(prepared: &PreparedStages, driver: &CmakeDriver) {
    println!("Would run the following stages in order:");
    for stage in [&prepared.vendor, &prepared.extension] {
        println!("  - {} stage", stage.kind);
        println!("      source:    {}", stage.source_dir);
        println!("      build dir: {}", stage.build_dir);
        let args = driver.configure_args(&stage.source_dir, &stage.build_dir, &stage.definitions);
        println!("      configure: cmake {}", args.join(" "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_stage_package_writes_exports() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap();
        let config = Config::default();
        let layout = WorkspaceLayout::new(&config, root);

        fs::create_dir_all(layout.install_dir.join("include/splunk")).unwrap();
        fs::create_dir_all(layout.install_dir.join("lib")).unwrap();
        fs::write(layout.install_dir.join("include/splunk/opentelemetry.h"), "").unwrap();
        fs::write(layout.install_dir.join("lib/libSplunkOpenTelemetry.a"), "").unwrap();

        let descriptor = distribution::package_descriptor().unwrap();
        let manifest = stage_package(&layout, &descriptor).unwrap();

        assert_eq!(manifest.len(), 2);
        assert!(layout.staging_dir.join("include/splunk/opentelemetry.h").exists());
        assert!(layout.staging_dir.join("lib/libSplunkOpenTelemetry.a").exists());
        assert!(layout.staging_dir.join("stagepack-package.json").exists());
        assert!(
            layout
                .staging_dir
                .join("lib/cmake/splunk-opentelemetry/splunk-opentelemetry-components.cmake")
                .exists()
        );
    }

    #[test]
    fn test_stage_package_fails_without_install_tree() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap();
        let layout = WorkspaceLayout::new(&Config::default(), root);
        let descriptor = distribution::package_descriptor().unwrap();

        let result = stage_package(&layout, &descriptor);

        assert!(matches!(result, Err(crate::Error::ArtifactCollection { .. })));
    }
}
