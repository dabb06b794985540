//! Integration tests for the distribution's package declaration

use std::collections::HashSet;

use stagepack::distribution::{BASE_COMPONENT, EXTENSION_COMPONENT, package_descriptor};
use stagepack::export::render_cmake_components;
use stagepack::package::ComponentRef;

#[test]
fn test_component_names_are_base_and_extension() {
    let descriptor = package_descriptor().expect("distribution declaration should be valid");

    let names: HashSet<_> = descriptor.component_names().into_iter().collect();
    assert_eq!(names, HashSet::from([BASE_COMPONENT, EXTENSION_COMPONENT]));
}

#[test]
fn test_extension_requires_exactly_the_base_name() {
    let descriptor = package_descriptor().unwrap();
    let base = descriptor.component(BASE_COMPONENT).unwrap();
    let extension = descriptor.component(EXTENSION_COMPONENT).unwrap();

    assert_eq!(extension.requires, vec![ComponentRef::Local(base.name.clone())]);
}

#[test]
fn test_base_links_before_extension() {
    let descriptor = package_descriptor().unwrap();
    let order: Vec<_> = descriptor
        .link_order()
        .into_iter()
        .map(|c| c.name.as_str())
        .collect();

    assert_eq!(order, vec![BASE_COMPONENT, EXTENSION_COMPONENT]);
}

#[test]
fn test_cmake_export_names_package_targets() {
    let rendered = render_cmake_components(&package_descriptor().unwrap());

    assert!(rendered.contains("add_library(splunk-opentelemetry::opentelemetry-cpp INTERFACE IMPORTED)"));
    assert!(rendered.contains("add_library(splunk-opentelemetry::SplunkOpenTelemetry INTERFACE IMPORTED)"));
    assert!(rendered.contains("${_IMPORT_PREFIX}/lib/libSplunkOpenTelemetry.a;splunk-opentelemetry::opentelemetry-cpp"));
    assert!(rendered.contains("grpc::grpc;protobuf::protobuf;libcurl::libcurl"));
}
