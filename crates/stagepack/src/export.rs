//! CMake consumption file for a staged package
//!
//! Declares one `INTERFACE IMPORTED` target per component, named
//! `<package>::<component>`, linking the component's static archives from the
//! staged `lib/` directory and its required targets.

use std::fmt::Write as _;

use camino::{Utf8Path, Utf8PathBuf};

use crate::Result;
use crate::package::{ComponentRef, PackageDescriptor};

/// Staging-relative directory holding the generated file
pub fn cmake_dir(package_name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from("lib").join("cmake").join(package_name)
}

/// Archive file name for a declared library name
///
/// Library names may be declared with or without the `lib` prefix.
pub fn archive_file_name(lib: &str) -> String {
    if lib.starts_with("lib") {
        format!("{}.a", lib)
    } else {
        format!("lib{}.a", lib)
    }
}

/// Imported target name consumers link against
pub fn target_name(package_name: &str, requirement: &ComponentRef) -> String {
    match requirement {
        ComponentRef::Local(component) => format!("{}::{}", package_name, component),
        ComponentRef::External { .. } => requirement.to_string(),
    }
}

/// Render the components file
pub fn render_cmake_components(descriptor: &PackageDescriptor) -> String {
    let metadata = descriptor.metadata();
    let package = metadata.name.as_str();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "# Generated by stagepack for {} {}",
        package, metadata.version
    );
    // lib/cmake/<package>/ -> staging root
    let _ = writeln!(
        out,
        "get_filename_component(_IMPORT_PREFIX \"${{CMAKE_CURRENT_LIST_DIR}}/../../..\" ABSOLUTE)"
    );

    for component in descriptor.link_order() {
        let target = target_name(package, &ComponentRef::local(component.name.as_str()));
        let mut link_items: Vec<String> = component
            .libs
            .iter()
            .map(|lib| format!("${{_IMPORT_PREFIX}}/lib/{}", archive_file_name(lib)))
            .collect();
        link_items.extend(component.requires.iter().map(|r| target_name(package, r)));

        let _ = writeln!(out);
        let _ = writeln!(out, "if(NOT TARGET {})", target);
        let _ = writeln!(out, "  add_library({} INTERFACE IMPORTED)", target);
        let _ = writeln!(out, "  set_target_properties({} PROPERTIES", target);
        let _ = writeln!(
            out,
            "    INTERFACE_INCLUDE_DIRECTORIES \"${{_IMPORT_PREFIX}}/include\""
        );
        let _ = writeln!(
            out,
            "    INTERFACE_LINK_LIBRARIES \"{}\")",
            link_items.join(";")
        );
        let _ = writeln!(out, "endif()");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "unset(_IMPORT_PREFIX)");
    out
}

/// Write the components file below `staging_dir`, returning its path
pub fn write_cmake_components(
    descriptor: &PackageDescriptor,
    staging_dir: &Utf8Path,
) -> Result<Utf8PathBuf> {
    let package = descriptor.metadata().name.as_str();
    let dir = staging_dir.join(cmake_dir(package));
    std::fs::create_dir_all(&dir)?;

    let path = dir.join(format!("{}-components.cmake", package));
    std::fs::write(&path, render_cmake_components(descriptor))?;
    tracing::debug!("Wrote {}", path);
    Ok(path)
}
