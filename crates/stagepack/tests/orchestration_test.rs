//! Integration tests for stage ordering and failure propagation
//!
//! A recording driver stands in for cmake so every configure, build and
//! install call can be checked in order.

use std::collections::HashMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use stagepack::build::{
    BuildDefinitions, BuildDriver, BuildPlan, DefinitionValue, StageKind, StageOrchestrator,
    StagePlan, StageStep,
};
use stagepack::distribution::{extension_pinned_flags, vendor_pinned_flags};
use stagepack::locator::DependencyLocator;
use stagepack::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Configure {
        source: Utf8PathBuf,
        definitions: BuildDefinitions,
    },
    Build,
    Install,
}

/// Records calls; can fail or hang at a given call index
#[derive(Default)]
struct RecordingDriver {
    calls: Vec<Call>,
    fail_at: Option<usize>,
    hang_at: Option<usize>,
}

impl RecordingDriver {
    fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }

    fn hanging_at(index: usize) -> Self {
        Self {
            hang_at: Some(index),
            ..Default::default()
        }
    }

    async fn record(&mut self, call: Call) -> Result<()> {
        let index = self.calls.len();
        self.calls.push(call);
        if self.hang_at == Some(index) {
            std::future::pending::<()>().await;
        }
        if self.fail_at == Some(index) {
            return Err(Error::build("injected failure", "test driver"));
        }
        Ok(())
    }

    fn steps(&self) -> Vec<&'static str> {
        self.calls
            .iter()
            .map(|c| match c {
                Call::Configure { .. } => "configure",
                Call::Build => "build",
                Call::Install => "install",
            })
            .collect()
    }
}

impl BuildDriver for RecordingDriver {
    async fn configure(
        &mut self,
        source_dir: &Utf8Path,
        _build_dir: &Utf8Path,
        definitions: &BuildDefinitions,
    ) -> Result<()> {
        self.record(Call::Configure {
            source: source_dir.to_path_buf(),
            definitions: definitions.clone(),
        })
        .await
    }

    async fn build(&mut self) -> Result<()> {
        self.record(Call::Build).await
    }

    async fn install(&mut self) -> Result<()> {
        self.record(Call::Install).await
    }
}

struct FakeLocator(HashMap<&'static str, &'static str>);

impl FakeLocator {
    fn standard() -> Self {
        Self(HashMap::from([("rpc-lib", "/a"), ("serialization-lib", "/b")]))
    }
}

impl DependencyLocator for FakeLocator {
    fn resolve(&self, name: &str) -> Result<Utf8PathBuf> {
        self.0
            .get(name)
            .map(Utf8PathBuf::from)
            .ok_or_else(|| Error::dependency_resolution(name, "not known to the fake locator"))
    }
}

fn plan(dependencies: &[&str]) -> BuildPlan {
    BuildPlan {
        dependencies: dependencies.iter().map(|s| s.to_string()).collect(),
        vendor: StagePlan {
            source_dir: Utf8PathBuf::from("/src/vendor"),
            build_dir: Utf8PathBuf::from("/build/vendor"),
            overrides: BuildDefinitions::new(),
            pinned: vendor_pinned_flags(),
        },
        extension: StagePlan {
            source_dir: Utf8PathBuf::from("/src/extension"),
            build_dir: Utf8PathBuf::from("/build/extension"),
            overrides: BuildDefinitions::new(),
            pinned: extension_pinned_flags(),
        },
    }
}

#[tokio::test]
async fn test_successful_run_issues_six_calls_in_order() {
    let locator = FakeLocator::standard();
    let mut driver = RecordingDriver::default();

    let summary = StageOrchestrator::new(&locator, &mut driver)
        .run_build(&plan(&["rpc-lib", "serialization-lib"]))
        .await
        .expect("run should succeed");

    assert_eq!(summary.stages, vec![StageKind::Vendor, StageKind::Extension]);
    assert_eq!(
        driver.steps(),
        vec!["configure", "build", "install", "configure", "build", "install"]
    );

    let expected_vendor = vendor_pinned_flags().with(
        "CMAKE_PREFIX_PATH",
        vec![Utf8PathBuf::from("/a"), Utf8PathBuf::from("/b")],
    );
    assert_eq!(
        driver.calls[0],
        Call::Configure {
            source: Utf8PathBuf::from("/src/vendor"),
            definitions: expected_vendor.clone(),
        }
    );
    assert_eq!(expected_vendor.len(), 7);
    assert_eq!(
        expected_vendor.get("CMAKE_PREFIX_PATH").unwrap().render(),
        "/a;/b"
    );

    assert_eq!(
        driver.calls[3],
        Call::Configure {
            source: Utf8PathBuf::from("/src/extension"),
            definitions: extension_pinned_flags(),
        }
    );
}

#[tokio::test]
async fn test_search_path_preserves_order_and_duplicates() {
    let locator = FakeLocator::standard();
    let mut driver = RecordingDriver::default();

    StageOrchestrator::new(&locator, &mut driver)
        .run_build(&plan(&["serialization-lib", "rpc-lib", "serialization-lib"]))
        .await
        .unwrap();

    let Call::Configure { definitions, .. } = &driver.calls[0] else {
        panic!("first call should be vendor configure");
    };
    assert_eq!(
        definitions.get("CMAKE_PREFIX_PATH"),
        Some(&DefinitionValue::Paths(vec![
            Utf8PathBuf::from("/b"),
            Utf8PathBuf::from("/a"),
            Utf8PathBuf::from("/b"),
        ]))
    );
}

#[tokio::test]
async fn test_vendor_build_failure_stops_after_two_calls() {
    let locator = FakeLocator::standard();
    let mut driver = RecordingDriver::failing_at(1);

    let err = StageOrchestrator::new(&locator, &mut driver)
        .run_build(&plan(&["rpc-lib", "serialization-lib"]))
        .await
        .unwrap_err();

    assert_eq!(driver.steps(), vec!["configure", "build"]);
    assert_eq!(err.stage_context(), Some((StageKind::Vendor, StageStep::Build)));
    assert!(matches!(err, Error::Stage { .. }));
}

#[tokio::test]
async fn test_vendor_install_failure_never_configures_extension() {
    let locator = FakeLocator::standard();
    let mut driver = RecordingDriver::failing_at(2);

    let err = StageOrchestrator::new(&locator, &mut driver)
        .run_build(&plan(&["rpc-lib"]))
        .await
        .unwrap_err();

    assert_eq!(driver.steps(), vec!["configure", "build", "install"]);
    assert_eq!(err.stage_context(), Some((StageKind::Vendor, StageStep::Install)));
}

#[tokio::test]
async fn test_extension_failure_reports_extension_stage() {
    let locator = FakeLocator::standard();
    let mut driver = RecordingDriver::failing_at(3);

    let err = StageOrchestrator::new(&locator, &mut driver)
        .run_build(&plan(&["rpc-lib"]))
        .await
        .unwrap_err();

    assert_eq!(driver.steps(), vec!["configure", "build", "install", "configure"]);
    assert_eq!(
        err.stage_context(),
        Some((StageKind::Extension, StageStep::Configure))
    );
}

#[tokio::test]
async fn test_unresolved_dependency_issues_no_driver_calls() {
    let locator = FakeLocator::standard();
    let mut driver = RecordingDriver::default();

    let err = StageOrchestrator::new(&locator, &mut driver)
        .run_build(&plan(&["rpc-lib", "http-lib"]))
        .await
        .unwrap_err();

    assert!(driver.calls.is_empty());
    assert!(matches!(
        err,
        Error::DependencyResolution { ref name, .. } if name == "http-lib"
    ));
}

#[tokio::test]
async fn test_pinned_flags_override_caller_definitions() {
    let locator = FakeLocator::standard();
    let mut driver = RecordingDriver::default();
    let mut plan = plan(&["rpc-lib"]);
    plan.vendor.overrides = BuildDefinitions::new()
        .with("WITH_JAEGER", true)
        .with("CMAKE_CXX_STANDARD", "17");
    plan.extension.overrides = BuildDefinitions::new().with("SPLUNK_CPP_EXAMPLES", true);

    StageOrchestrator::new(&locator, &mut driver)
        .run_build(&plan)
        .await
        .unwrap();

    let Call::Configure { definitions: vendor, .. } = &driver.calls[0] else {
        panic!("first call should be vendor configure");
    };
    assert_eq!(vendor.get("WITH_JAEGER"), Some(&DefinitionValue::Bool(false)));
    assert_eq!(
        vendor.get("CMAKE_CXX_STANDARD"),
        Some(&DefinitionValue::Text("17".to_string()))
    );

    let Call::Configure { definitions: extension, .. } = &driver.calls[3] else {
        panic!("fourth call should be extension configure");
    };
    assert_eq!(
        extension.get("SPLUNK_CPP_EXAMPLES"),
        Some(&DefinitionValue::Bool(false))
    );
    assert!(extension.get("CMAKE_PREFIX_PATH").is_none());
}

#[tokio::test]
async fn test_hung_step_times_out() {
    let locator = FakeLocator::standard();
    let mut driver = RecordingDriver::hanging_at(1);

    let err = StageOrchestrator::new(&locator, &mut driver)
        .with_step_timeout(Some(Duration::from_millis(50)))
        .run_build(&plan(&["rpc-lib"]))
        .await
        .unwrap_err();

    assert_eq!(driver.steps(), vec!["configure", "build"]);
    assert!(matches!(
        err,
        Error::StageTimedOut {
            stage: StageKind::Vendor,
            step: StageStep::Build,
            ..
        }
    ));
}

#[tokio::test]
async fn test_prepare_does_not_touch_driver() {
    let locator = FakeLocator::standard();
    let mut driver = RecordingDriver::default();

    let prepared = StageOrchestrator::new(&locator, &mut driver)
        .prepare(&plan(&["rpc-lib", "serialization-lib"]))
        .unwrap();

    assert!(driver.calls.is_empty());
    assert_eq!(prepared.vendor.kind, StageKind::Vendor);
    assert_eq!(prepared.vendor.definitions.len(), 7);
    assert_eq!(prepared.extension.definitions, extension_pinned_flags());
}
