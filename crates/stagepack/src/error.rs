//! Error types for stagepack

// This warning is a false positive from thiserror macro expansion
#![allow(unused_assignments)]

use std::fmt;
use std::time::Duration;

use camino::Utf8PathBuf;
use miette::{Diagnostic, LabeledSpan, Severity, SourceCode};
use thiserror::Error;

use crate::build::{StageKind, StageStep};

/// Result type alias for stagepack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stagepack
#[derive(Debug, Error, Diagnostic)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("Failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[help]
        help: String,
    },

    /// An upstream dependency could not be located
    #[error("Failed to resolve dependency '{name}'")]
    DependencyResolution {
        name: String,
        #[help]
        help: String,
    },

    /// A build driver step failed
    #[error("{stage} stage failed during {step}")]
    Stage {
        stage: StageKind,
        step: StageStep,
        #[source]
        #[diagnostic_source]
        source: StageCause,
    },

    /// A build driver step did not finish in time
    #[error("{stage} stage {step} did not finish within {timeout:?}")]
    #[diagnostic(help("Raise build.step_timeout_secs or pass --timeout with a larger value"))]
    StageTimedOut {
        stage: StageKind,
        step: StageStep,
        timeout: Duration,
    },

    /// A build driver step was cancelled before it finished
    #[error("{stage} stage {step} was cancelled")]
    StageCancelled { stage: StageKind, step: StageStep },

    /// The install tree could not be read while collecting artifacts
    #[error("Failed to collect artifacts from {path}: {message}")]
    #[diagnostic(help("Check that the install step completed and the directory is readable"))]
    ArtifactCollection { path: Utf8PathBuf, message: String },

    /// Package descriptor error
    #[error("Package error: {message}")]
    Package {
        message: String,
        #[help]
        help: String,
    },

    /// Circular requirement between components
    #[error("Circular component requirement detected: {components:?}")]
    #[diagnostic(help("Check the requires lists of the package components"))]
    CircularDependency {
        /// Components involved in the cycle
        components: Vec<String>,
    },

    /// Build driver error
    #[error("Build error: {message}")]
    Build {
        message: String,
        #[help]
        help: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a dependency resolution error
    pub fn dependency_resolution(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::DependencyResolution {
            name: name.into(),
            help: help.into(),
        }
    }

    /// Attach stage and step context to a driver error
    pub fn stage(stage: StageKind, step: StageStep, source: Error) -> Self {
        Self::Stage {
            stage,
            step,
            source: StageCause(Box::new(source)),
        }
    }

    /// Create an artifact collection error
    pub fn artifact_collection(path: impl Into<Utf8PathBuf>, message: impl Into<String>) -> Self {
        Self::ArtifactCollection {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a package error
    pub fn package(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Package {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a circular dependency error
    pub fn circular_dependency(components: Vec<String>) -> Self {
        Self::CircularDependency { components }
    }

    /// Create a build error
    pub fn build(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            help: help.into(),
        }
    }

    /// The stage and step a failure happened in, if it came from a driver step
    pub fn stage_context(&self) -> Option<(StageKind, StageStep)> {
        match self {
            Self::Stage { stage, step, .. }
            | Self::StageTimedOut { stage, step, .. }
            | Self::StageCancelled { stage, step } => Some((*stage, *step)),
            _ => None,
        }
    }
}

/// Driver error wrapped by [`Error::Stage`]
///
/// Forwards both the error chain and the diagnostic (help, labels) of the
/// wrapped error so reports keep the driver's hints.
#[derive(Debug)]
pub struct StageCause(Box<Error>);

impl StageCause {
    pub fn inner(&self) -> &Error {
        &self.0
    }
}

impl fmt::Display for StageCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for StageCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.0)
    }
}

impl Diagnostic for StageCause {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.0.code()
    }

    fn severity(&self) -> Option<Severity> {
        self.0.severity()
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.0.help()
    }

    fn url<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.0.url()
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.0.source_code()
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        self.0.labels()
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn Diagnostic> + 'a>> {
        self.0.related()
    }

    fn diagnostic_source(&self) -> Option<&dyn Diagnostic> {
        self.0.diagnostic_source()
    }
}
