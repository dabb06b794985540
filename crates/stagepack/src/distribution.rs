//! The Splunk OpenTelemetry C++ distribution
//!
//! Pins the vendored OpenTelemetry C++ build to an OTLP/gRPC-only feature set,
//! builds the Splunk layer over it, and declares the two resulting components.

use camino::{Utf8Path, Utf8PathBuf};

use crate::Result;
use crate::build::{BuildDefinitions, BuildPlan, StagePlan};
use crate::config::Config;
use crate::locator::DependencyRef;
use crate::package::{PackageDescriptor, PackageMetadata};

pub const PACKAGE_NAME: &str = "splunk-opentelemetry";
pub const PACKAGE_VERSION: &str = "0.2";

/// Component wrapping the vendored SDK libraries
pub const BASE_COMPONENT: &str = "opentelemetry-cpp";

/// Component wrapping the extension library
pub const EXTENSION_COMPONENT: &str = "SplunkOpenTelemetry";

/// Upstream packages consumers must provide
pub const UPSTREAM_REQUIREMENTS: &[(&str, &str)] = &[
    ("grpc", "1.37.1"),
    ("protobuf", "3.17.1"),
    ("libcurl", "7.79.1"),
];

/// Upstream roots injected into the vendor search path, in this order
pub const VENDOR_PREFIX_DEPENDENCIES: &[&str] = &["grpc", "protobuf"];

/// Default vendor source tree, relative to the workspace root
pub const VENDOR_SOURCE_DIR: &str = "opentelemetry-cpp";

/// Default vendor build tree, relative to the build directory
pub const VENDOR_BUILD_DIR: &str = "otelcpp_build";

pub const EXTENSION_SOURCE_DIR: &str = ".";
pub const EXTENSION_BUILD_DIR: &str = "splunk_build";

const BASE_REQUIRES: &[&str] = &["grpc::grpc", "protobuf::protobuf", "libcurl::libcurl"];

const BASE_LIBS: &[&str] = &[
    "libhttp_client_curl",
    "libopentelemetry_common",
    "libopentelemetry_exporter_ostream_span",
    "libopentelemetry_proto",
    "libopentelemetry_otlp_recordable",
    "libopentelemetry_exporter_otlp_grpc",
    "libopentelemetry_resources",
    "libopentelemetry_trace",
    "libopentelemetry_version",
    "libopentelemetry_zpages",
];

const EXTENSION_LIBS: &[&str] = &["libSplunkOpenTelemetry"];

/// Feature set the vendored SDK is always built with
pub fn vendor_pinned_flags() -> BuildDefinitions {
    BuildDefinitions::new()
        .with("WITH_OTLP", true)
        .with("WITH_OTLP_HTTP", false)
        .with("WITH_JAEGER", false)
        .with("WITH_ABSEIL", false)
        .with("BUILD_TESTING", false)
        .with("WITH_EXAMPLES", false)
}

/// Feature set the extension library is always built with
pub fn extension_pinned_flags() -> BuildDefinitions {
    BuildDefinitions::new()
        .with("SPLUNK_CPP_WITH_JAEGER_EXPORTER", false)
        .with("SPLUNK_CPP_EXAMPLES", false)
}

pub fn package_metadata() -> PackageMetadata {
    PackageMetadata {
        name: PACKAGE_NAME.to_string(),
        version: PACKAGE_VERSION.to_string(),
        license: "Apache 2.0".to_string(),
        author: "Splunk".to_string(),
        url: "https://github.com/signalfx/splunk-otel-cpp".to_string(),
        description: "Splunk's distribution of OpenTelemetry C++".to_string(),
        topics: ["opentelemetry", "observability", "tracing"]
            .into_iter()
            .map(String::from)
            .collect(),
        requires: UPSTREAM_REQUIREMENTS
            .iter()
            .map(|(name, version)| DependencyRef::new(*name, *version))
            .collect(),
    }
}

/// The package's component graph
pub fn package_descriptor() -> Result<PackageDescriptor> {
    PackageDescriptor::builder(package_metadata())
        .component(BASE_COMPONENT, BASE_REQUIRES, BASE_LIBS.iter().copied())
        .component(
            EXTENSION_COMPONENT,
            [BASE_COMPONENT],
            EXTENSION_LIBS.iter().copied(),
        )
        .build()
}

/// Absolute directories for one run, derived from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    pub root: Utf8PathBuf,
    pub build_root: Utf8PathBuf,
    pub install_dir: Utf8PathBuf,
    pub staging_dir: Utf8PathBuf,
}

impl WorkspaceLayout {
    pub fn new(config: &Config, root: &Utf8Path) -> Self {
        Self {
            root: root.to_path_buf(),
            build_root: root.join(&config.workspace.build_dir),
            install_dir: root.join(&config.workspace.install_dir),
            staging_dir: root.join(&config.workspace.staging_dir),
        }
    }
}

/// Both stages of this distribution, with configured overrides
pub fn build_plan(config: &Config, layout: &WorkspaceLayout) -> BuildPlan {
    let vendor_source = config
        .vendor
        .source
        .clone()
        .unwrap_or_else(|| Utf8PathBuf::from(VENDOR_SOURCE_DIR));
    let vendor_build = config
        .vendor
        .build_dir
        .clone()
        .unwrap_or_else(|| Utf8PathBuf::from(VENDOR_BUILD_DIR));
    let extension_source = config
        .extension
        .source
        .clone()
        .unwrap_or_else(|| Utf8PathBuf::from(EXTENSION_SOURCE_DIR));
    let extension_build = config
        .extension
        .build_dir
        .clone()
        .unwrap_or_else(|| Utf8PathBuf::from(EXTENSION_BUILD_DIR));

    BuildPlan {
        dependencies: VENDOR_PREFIX_DEPENDENCIES
            .iter()
            .map(|s| s.to_string())
            .collect(),
        vendor: StagePlan {
            source_dir: layout.root.join(vendor_source),
            build_dir: layout.build_root.join(vendor_build),
            overrides: config.vendor.definitions.clone(),
            pinned: vendor_pinned_flags(),
        },
        extension: StagePlan {
            source_dir: layout.root.join(extension_source),
            build_dir: layout.build_root.join(extension_build),
            overrides: config.extension.definitions.clone(),
            pinned: extension_pinned_flags(),
        },
    }
}
