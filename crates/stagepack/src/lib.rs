//! stagepack - two-stage vendored build and package orchestrator
//!
//! This crate provides both a library and CLI for stagepack, including:
//! - Configuration file parsing and merging
//! - Upstream dependency location
//! - Ordered vendor and extension builds through a build driver
//! - Artifact collection into a package staging layout
//! - Package component graphs and their JSON and CMake exports

pub mod build;
pub mod collect;
pub mod commands;
pub mod config;
pub mod distribution;
pub mod error;
pub mod export;
pub mod locator;
pub mod package;

pub use error::{Error, Result};

use std::sync::OnceLock;

use indicatif::MultiProgress;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

/// Process-wide progress container shared by the log writer and the build display
pub fn get_multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(MultiProgress::new)
}
