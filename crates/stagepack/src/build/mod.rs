//! Two-stage build of the vendored library and its extension
//!
//! This module provides:
//! - Build definition sets and their layered merge
//! - The build driver contract and its cmake implementation
//! - Stage orchestration with ordering, timeouts and cancellation
//! - Progress display and build output capture

mod cmake;
mod command_logger;
mod definitions;
mod driver;
mod orchestrator;
mod progress;
mod progress_writer;

pub use cmake::{CmakeDriver, CmakeDriverOptions, INSTALL_PREFIX_DEFINITION};
pub use command_logger::{LogCallback, run_command_with_logging};
pub use definitions::{BuildDefinitions, DefinitionLayers, DefinitionValue, PATH_LIST_SEPARATOR};
pub use driver::{BuildDriver, Stage, StageKind, StageStep};
pub use orchestrator::{
    BuildPlan, BuildSummary, PREFIX_PATH_DEFINITION, PreparedStages, StageOrchestrator, StagePlan,
    resolve_search_path,
};
pub use progress::StageProgress;
pub use progress_writer::{ProgressWriter, make_writer};
