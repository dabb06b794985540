//! Upstream dependency references and their install locations
//!
//! The package registry that installs upstream dependencies is external. This
//! module only names dependencies and asks a [`DependencyLocator`] where their
//! installed roots are.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::config::DependenciesConfig;
use crate::{Error, Result};

/// Reference to an upstream package, written `name/version`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DependencyRef {
    pub name: String,
    pub version: String,
}

impl DependencyRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl FromStr for DependencyRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name.trim(), version.trim()))
            }
            _ => Err(Error::package(
                format!("Invalid dependency reference: '{}'", s),
                "Write dependency references as name/version, e.g. grpc/1.37.1",
            )),
        }
    }
}

impl TryFrom<String> for DependencyRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DependencyRef> for String {
    fn from(value: DependencyRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Resolves an upstream dependency name to its installed root
pub trait DependencyLocator {
    fn resolve(&self, name: &str) -> Result<Utf8PathBuf>;
}

/// Locator backed by the `[dependencies]` configuration section
///
/// Explicit roots win; otherwise each search path is probed for a directory
/// named after the dependency, in order.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredLocator {
    roots: BTreeMap<String, Utf8PathBuf>,
    search_paths: Vec<Utf8PathBuf>,
}

impl ConfiguredLocator {
    pub fn new(roots: BTreeMap<String, Utf8PathBuf>, search_paths: Vec<Utf8PathBuf>) -> Self {
        Self {
            roots,
            search_paths,
        }
    }

    /// Build a locator from configuration, anchoring relative paths at `workspace_root`
    pub fn from_config(config: &DependenciesConfig, workspace_root: &Utf8Path) -> Self {
        let roots = config
            .roots
            .iter()
            .map(|(name, path)| (name.clone(), workspace_root.join(path)))
            .collect();
        let search_paths = config
            .search_paths
            .iter()
            .map(|path| workspace_root.join(path))
            .collect();
        Self::new(roots, search_paths)
    }
}

impl DependencyLocator for ConfiguredLocator {
    fn resolve(&self, name: &str) -> Result<Utf8PathBuf> {
        if let Some(root) = self.roots.get(name) {
            tracing::debug!(dependency = name, root = %root, "Resolved from configured root");
            return Ok(root.clone());
        }

        for search_path in &self.search_paths {
            let candidate = search_path.join(name);
            if candidate.is_dir() {
                tracing::debug!(dependency = name, root = %candidate, "Resolved from search path");
                return Ok(candidate);
            }
        }

        Err(Error::dependency_resolution(
            name,
            format!(
                "Add '{}' under [dependencies.roots] in stagepack.toml or install it below one of the search paths",
                name
            ),
        ))
    }
}
