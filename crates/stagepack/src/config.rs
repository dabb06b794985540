//! Configuration file parsing and merging
//!
//! `stagepack.toml` holds the workspace settings; `stagepack.local.toml`, when
//! present, is merged over it. Tables merge recursively, arrays and scalars from
//! the local file replace the base value.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::build::{BuildDefinitions, INSTALL_PREFIX_DEFINITION};
use crate::{Error, Result};

/// Name of the workspace configuration file
pub const CONFIG_FILE: &str = "stagepack.toml";

/// Name of the untracked local override file
pub const LOCAL_CONFIG_FILE: &str = "stagepack.local.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory layout
    pub workspace: WorkspaceConfig,

    /// Settings shared by both build stages
    pub build: BuildConfig,

    /// Vendored base library stage
    pub vendor: StageConfig,

    /// Extension library stage
    pub extension: StageConfig,

    /// Installed upstream dependencies
    pub dependencies: DependenciesConfig,
}

/// Workspace directory layout, relative to the workspace root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Build trees (default: "build")
    pub build_dir: Utf8PathBuf,

    /// Shared install prefix (default: "install")
    pub install_dir: Utf8PathBuf,

    /// Package staging layout (default: "package")
    pub staging_dir: Utf8PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            build_dir: Utf8PathBuf::from("build"),
            install_dir: Utf8PathBuf::from("install"),
            staging_dir: Utf8PathBuf::from("package"),
        }
    }
}

/// Build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of parallel jobs (default: number of logical CPUs)
    pub jobs: Option<usize>,

    /// CMAKE_BUILD_TYPE (default: "Release")
    pub build_type: String,

    /// cmake executable (default: "cmake")
    pub cmake: String,

    /// Additional CMake arguments for both stages
    pub cmake_args: Vec<String>,

    /// Upper bound for a single configure, build or install step
    pub step_timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            build_type: "Release".to_string(),
            cmake: "cmake".to_string(),
            cmake_args: Vec::new(),
            step_timeout_secs: None,
        }
    }
}

/// Per-stage settings
///
/// Unset directories fall back to the distribution defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Source tree, relative to the workspace root
    pub source: Option<Utf8PathBuf>,

    /// Build tree, relative to the workspace build directory
    pub build_dir: Option<Utf8PathBuf>,

    /// Option overrides; pinned options of the stage still win
    pub definitions: BuildDefinitions,
}

/// Where upstream dependencies are installed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DependenciesConfig {
    /// Explicit install roots by dependency name
    pub roots: BTreeMap<String, Utf8PathBuf>,

    /// Directories probed for `<dir>/<name>` when no explicit root is given
    pub search_paths: Vec<Utf8PathBuf>,
}

impl Config {
    /// Load configuration from a workspace directory.
    ///
    /// Missing files yield the default configuration.
    pub fn load(workspace_root: &Utf8Path) -> Result<Self> {
        let config_path = workspace_root.join(CONFIG_FILE);
        let local_config_path = workspace_root.join(LOCAL_CONFIG_FILE);

        let base_config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<toml::Value>(&content)?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let local_config = if local_config_path.exists() {
            let content = std::fs::read_to_string(&local_config_path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        } else {
            None
        };

        let merged = if let Some(local) = local_config {
            tracing::debug!("Merging {}", local_config_path);
            merge_toml_values(base_config, local)
        } else {
            base_config
        };

        let config: Config = merged.try_into()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a string (for testing)
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the effective number of jobs
    pub fn effective_jobs(&self) -> usize {
        self.build
            .jobs
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
    }

    fn validate(&self) -> Result<()> {
        if self.build.jobs == Some(0) {
            return Err(Error::config(
                "build.jobs must be at least 1",
                "Remove build.jobs to use the number of logical CPUs",
            ));
        }
        if self.build.step_timeout_secs == Some(0) {
            return Err(Error::config(
                "build.step_timeout_secs must be at least 1",
                "Remove build.step_timeout_secs to wait for each step without a limit",
            ));
        }
        if self.build.cmake.trim().is_empty() {
            return Err(Error::config(
                "build.cmake must name an executable",
                "Set build.cmake to \"cmake\" or a full path",
            ));
        }

        // Both stages must install into workspace.install_dir
        for (section, stage) in [("vendor", &self.vendor), ("extension", &self.extension)] {
            if stage.definitions.get(INSTALL_PREFIX_DEFINITION).is_some() {
                return Err(Error::config(
                    format!(
                        "{}.definitions must not set {}",
                        section, INSTALL_PREFIX_DEFINITION
                    ),
                    "Set workspace.install_dir to change the install prefix",
                ));
            }
        }
        if defined_names(&self.build.cmake_args).any(|name| name == INSTALL_PREFIX_DEFINITION) {
            return Err(Error::config(
                format!("build.cmake_args must not set {}", INSTALL_PREFIX_DEFINITION),
                "Set workspace.install_dir to change the install prefix",
            ));
        }
        Ok(())
    }
}

/// Names set by `-DNAME[:TYPE]=VALUE` or `-D NAME[:TYPE]=VALUE` arguments
fn defined_names(args: &[String]) -> impl Iterator<Item = &str> {
    let mut split_define = false;
    args.iter().filter_map(move |arg| {
        let entry = if split_define {
            split_define = false;
            arg.as_str()
        } else if arg == "-D" {
            split_define = true;
            return None;
        } else {
            arg.strip_prefix("-D")?
        };
        entry.split(['=', ':']).next()
    })
}

/// Merge two TOML values:
/// - Tables: recursively merged
/// - Arrays: local replaces base (not merged)
/// - Primitives: local overrides base
fn merge_toml_values(base: toml::Value, local: toml::Value) -> toml::Value {
    match (base, local) {
        (toml::Value::Table(mut base_table), toml::Value::Table(local_table)) => {
            for (key, local_value) in local_table {
                if let Some(base_value) = base_table.remove(&key) {
                    base_table.insert(key, merge_toml_values(base_value, local_value));
                } else {
                    base_table.insert(key, local_value);
                }
            }
            toml::Value::Table(base_table)
        }
        (_, local) => local,
    }
}
