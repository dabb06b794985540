//! Two-stage build orchestration
//!
//! The vendor stage is configured with the upstream search path and its pinned
//! feature set, then built and installed. Only after its install returns does the
//! extension stage configure. Any failure ends the run; nothing is retried.

use std::future::Future;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::locator::DependencyLocator;
use crate::{Error, Result};

use super::definitions::{BuildDefinitions, DefinitionLayers, DefinitionValue};
use super::driver::{BuildDriver, Stage, StageKind, StageStep};
use super::progress::StageProgress;

/// Definition receiving the resolved upstream install roots
pub const PREFIX_PATH_DEFINITION: &str = "CMAKE_PREFIX_PATH";

/// Inputs for one stage before dependency resolution
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub source_dir: Utf8PathBuf,
    pub build_dir: Utf8PathBuf,
    /// Caller overrides, applied below the pinned flags
    pub overrides: BuildDefinitions,
    /// Flags that always win
    pub pinned: BuildDefinitions,
}

/// Everything needed to run both stages
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Upstream dependencies whose roots form the vendor search path, in order
    pub dependencies: Vec<String>,
    pub vendor: StagePlan,
    pub extension: StagePlan,
}

/// Both stages with their final definition sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedStages {
    pub vendor: Stage,
    pub extension: Stage,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub stages: Vec<StageKind>,
    pub elapsed: Duration,
}

/// Runs the vendor and extension stages against one build driver
pub struct StageOrchestrator<'a, L, D> {
    locator: &'a L,
    driver: &'a mut D,
    step_timeout: Option<Duration>,
    cancel: CancellationToken,
    progress: StageProgress,
}

impl<'a, L, D> StageOrchestrator<'a, L, D>
where
    L: DependencyLocator,
    D: BuildDriver,
{
    pub fn new(locator: &'a L, driver: &'a mut D) -> Self {
        Self {
            locator,
            driver,
            step_timeout: None,
            cancel: CancellationToken::new(),
            progress: StageProgress::hidden(),
        }
    }

    /// Bound every configure, build and install step
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Abort the running step when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: StageProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Resolve dependencies and compute both definition sets without building
    pub fn prepare(&self, plan: &BuildPlan) -> Result<PreparedStages> {
        let search_path = resolve_search_path(self.locator, &plan.dependencies)?;
        tracing::debug!(search_path = %search_path, "Resolved upstream search path");

        let vendor_definitions = DefinitionLayers::new()
            .layer(plan.vendor.overrides.clone())
            .layer(BuildDefinitions::new().with(PREFIX_PATH_DEFINITION, search_path))
            .pinned(plan.vendor.pinned.clone())
            .resolve();

        let extension_definitions = DefinitionLayers::new()
            .layer(plan.extension.overrides.clone())
            .pinned(plan.extension.pinned.clone())
            .resolve();

        Ok(PreparedStages {
            vendor: Stage {
                kind: StageKind::Vendor,
                source_dir: plan.vendor.source_dir.clone(),
                build_dir: plan.vendor.build_dir.clone(),
                definitions: vendor_definitions,
            },
            extension: Stage {
                kind: StageKind::Extension,
                source_dir: plan.extension.source_dir.clone(),
                build_dir: plan.extension.build_dir.clone(),
                definitions: extension_definitions,
            },
        })
    }

    /// Run the vendor stage to install, then the extension stage
    pub async fn run_build(&mut self, plan: &BuildPlan) -> Result<BuildSummary> {
        let started = Instant::now();

        // Resolution failures surface here, before the driver is touched
        let prepared = self.prepare(plan)?;

        self.run_stage(&prepared.vendor).await?;
        self.run_stage(&prepared.extension).await?;

        self.progress.finish();
        let elapsed = started.elapsed();
        tracing::info!("Both stages installed in {:.1?}", elapsed);

        Ok(BuildSummary {
            stages: vec![StageKind::Vendor, StageKind::Extension],
            elapsed,
        })
    }

    async fn run_stage(&mut self, stage: &Stage) -> Result<()> {
        tracing::info!(
            source = %stage.source_dir,
            build_dir = %stage.build_dir,
            "Starting {} stage",
            stage.kind
        );
        for (name, value) in stage.definitions.iter() {
            tracing::debug!(stage = %stage.kind, "{} = {}", name, value);
        }

        for step in StageStep::ALL {
            self.progress.start_step(stage.kind, step);

            let driver = &mut *self.driver;
            let outcome = match step {
                StageStep::Configure => {
                    let call =
                        driver.configure(&stage.source_dir, &stage.build_dir, &stage.definitions);
                    guarded_step(&self.cancel, self.step_timeout, stage.kind, step, call).await
                }
                StageStep::Build => {
                    let call = driver.build();
                    guarded_step(&self.cancel, self.step_timeout, stage.kind, step, call).await
                }
                StageStep::Install => {
                    let call = driver.install();
                    guarded_step(&self.cancel, self.step_timeout, stage.kind, step, call).await
                }
            };

            if let Err(e) = outcome {
                tracing::error!(
                    completed_steps = self.progress.completed_steps(),
                    "{} stage {} failed: {}",
                    stage.kind,
                    step,
                    e
                );
                self.progress.fail_step(stage.kind, step, &e.to_string());
                return Err(e);
            }

            self.progress.finish_step();
            tracing::debug!("{} stage {} finished", stage.kind, step);
        }

        tracing::info!("Finished {} stage", stage.kind);
        Ok(())
    }
}

/// Resolve every dependency, keeping input order and duplicates
pub fn resolve_search_path<L: DependencyLocator + ?Sized>(
    locator: &L,
    dependencies: &[String],
) -> Result<DefinitionValue> {
    let roots = dependencies
        .iter()
        .map(|name| locator.resolve(name))
        .collect::<Result<Vec<Utf8PathBuf>>>()?;
    Ok(DefinitionValue::Paths(roots))
}

/// Await one driver call under the cancellation token and optional timeout
async fn guarded_step<F>(
    cancel: &CancellationToken,
    timeout: Option<Duration>,
    stage: StageKind,
    step: StageStep,
    call: F,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let bounded = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.ok(),
            None => Some(call.await),
        }
    };

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(Error::StageCancelled { stage, step }),
        outcome = bounded => outcome,
    };

    match outcome {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(Error::stage(stage, step, e)),
        None => Err(Error::StageTimedOut {
            stage,
            step,
            // Only reachable when a timeout was set
            timeout: timeout.unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapLocator(HashMap<&'static str, &'static str>);

    impl DependencyLocator for MapLocator {
        fn resolve(&self, name: &str) -> Result<Utf8PathBuf> {
            self.0
                .get(name)
                .map(Utf8PathBuf::from)
                .ok_or_else(|| Error::dependency_resolution(name, "unknown"))
        }
    }

    #[test]
    fn test_search_path_keeps_order_and_duplicates() {
        let locator = MapLocator(HashMap::from([("b", "/b"), ("a", "/a")]));
        let deps = vec!["b".to_string(), "a".to_string(), "b".to_string()];

        let value = resolve_search_path(&locator, &deps).unwrap();

        assert_eq!(
            value,
            DefinitionValue::Paths(vec![
                Utf8PathBuf::from("/b"),
                Utf8PathBuf::from("/a"),
                Utf8PathBuf::from("/b"),
            ])
        );
        assert_eq!(value.render(), "/b;/a;/b");
    }

    #[test]
    fn test_search_path_fails_on_unknown() {
        let locator = MapLocator(HashMap::from([("a", "/a")]));
        let deps = vec!["a".to_string(), "missing".to_string()];

        let result = resolve_search_path(&locator, &deps);

        assert!(matches!(result, Err(Error::DependencyResolution { .. })));
    }

    #[test]
    fn test_empty_dependency_list_gives_empty_path() {
        let locator = MapLocator(HashMap::new());

        let value = resolve_search_path(&locator, &[]).unwrap();

        assert_eq!(value.render(), "");
    }

    #[derive(Default)]
    struct FailingBuild {
        calls: usize,
    }

    impl BuildDriver for FailingBuild {
        async fn configure(
            &mut self,
            _source_dir: &camino::Utf8Path,
            _build_dir: &camino::Utf8Path,
            _definitions: &BuildDefinitions,
        ) -> Result<()> {
            self.calls += 1;
            Ok(())
        }

        async fn build(&mut self) -> Result<()> {
            self.calls += 1;
            Err(Error::build("compile error", ""))
        }

        async fn install(&mut self) -> Result<()> {
            self.calls += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_progress_stops_at_failed_step() {
        let locator = MapLocator(HashMap::new());
        let mut driver = FailingBuild::default();
        let progress = StageProgress::hidden();
        let stage = |dir: &str| StagePlan {
            source_dir: Utf8PathBuf::from(dir),
            build_dir: Utf8PathBuf::from(dir),
            overrides: BuildDefinitions::new(),
            pinned: BuildDefinitions::new(),
        };
        let plan = BuildPlan {
            dependencies: Vec::new(),
            vendor: stage("/vendor"),
            extension: stage("/extension"),
        };

        let result = StageOrchestrator::new(&locator, &mut driver)
            .with_progress(progress.clone())
            .run_build(&plan)
            .await;

        assert!(result.is_err());
        assert_eq!(progress.completed_steps(), 1);
        assert_eq!(driver.calls, 2);
    }

    #[tokio::test]
    async fn test_guarded_step_times_out() {
        let cancel = CancellationToken::new();
        let result = guarded_step(
            &cancel,
            Some(Duration::from_millis(20)),
            StageKind::Vendor,
            StageStep::Build,
            std::future::pending::<Result<()>>(),
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::StageTimedOut {
                stage: StageKind::Vendor,
                step: StageStep::Build,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_guarded_step_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = guarded_step(
            &cancel,
            None,
            StageKind::Extension,
            StageStep::Configure,
            std::future::pending::<Result<()>>(),
        )
        .await;

        assert!(matches!(
            result,
            Err(Error::StageCancelled {
                stage: StageKind::Extension,
                step: StageStep::Configure,
            })
        ));
    }

    #[tokio::test]
    async fn test_guarded_step_wraps_driver_error() {
        let cancel = CancellationToken::new();
        let result = guarded_step(
            &cancel,
            Some(Duration::from_secs(5)),
            StageKind::Vendor,
            StageStep::Install,
            async { Err(Error::build("install failed", "")) },
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.stage_context(), Some((StageKind::Vendor, StageStep::Install)));
        assert!(matches!(err, Error::Stage { .. }));
    }
}
