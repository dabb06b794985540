//! Build driver abstraction
//!
//! The driver is the external build system. The orchestrator only relies on the
//! configure/build/install contract; how the driver generates build files or
//! invokes compilers is its own business.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::Result;

use super::definitions::BuildDefinitions;

/// Which of the two build stages is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// The pinned build of the vendored base library
    Vendor,
    /// The build of the library layered on the vendor install
    Extension,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Vendor => write!(f, "vendor"),
            StageKind::Extension => write!(f, "extension"),
        }
    }
}

/// Step of a single stage, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStep {
    Configure,
    Build,
    Install,
}

impl StageStep {
    pub const ALL: [StageStep; 3] = [StageStep::Configure, StageStep::Build, StageStep::Install];
}

impl fmt::Display for StageStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStep::Configure => write!(f, "configure"),
            StageStep::Build => write!(f, "build"),
            StageStep::Install => write!(f, "install"),
        }
    }
}

/// One fully prepared build invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub kind: StageKind,
    pub source_dir: Utf8PathBuf,
    pub build_dir: Utf8PathBuf,
    pub definitions: BuildDefinitions,
}

/// External build system contract
///
/// `build` and `install` act on the build directory given to the most recent
/// `configure` call. Each call blocks (asynchronously) until the underlying work
/// has finished.
#[allow(async_fn_in_trait)]
pub trait BuildDriver {
    /// Generate the build tree for `source_dir` in `build_dir`
    async fn configure(
        &mut self,
        source_dir: &Utf8Path,
        build_dir: &Utf8Path,
        definitions: &BuildDefinitions,
    ) -> Result<()>;

    /// Build the configured tree
    async fn build(&mut self) -> Result<()>;

    /// Install the configured tree
    async fn install(&mut self) -> Result<()>;
}
