//! CMake build driver
//!
//! Drives `cmake` as an external process: configure with `-S/-B` and `-D` cache
//! entries, `--build` with parallel jobs, and `--install` into a shared prefix.
//! Both stages install into the same prefix, which is how the extension stage's
//! `find_package` locates the vendor install.

use camino::{Utf8Path, Utf8PathBuf};
use tokio::process::Command;

use crate::config::Config;
use crate::{Error, Result};

use super::command_logger::{LogCallback, run_command_with_logging};
use super::definitions::BuildDefinitions;
use super::driver::BuildDriver;

/// Definition owned by the driver; both stages install into the same prefix
pub const INSTALL_PREFIX_DEFINITION: &str = "CMAKE_INSTALL_PREFIX";

/// Options for the cmake driver
#[derive(Clone)]
pub struct CmakeDriverOptions {
    /// cmake executable
    pub program: String,
    /// Shared install prefix for both stages
    pub install_prefix: Utf8PathBuf,
    /// CMAKE_BUILD_TYPE
    pub build_type: Option<String>,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Additional raw arguments appended to every configure call
    pub extra_args: Vec<String>,
    /// Optional callback for log lines
    pub log_callback: Option<LogCallback>,
}

impl CmakeDriverOptions {
    /// Derive driver options from the workspace configuration
    pub fn from_config(config: &Config, workspace_root: &Utf8Path) -> Self {
        Self {
            program: config.build.cmake.clone(),
            install_prefix: workspace_root.join(&config.workspace.install_dir),
            build_type: Some(config.build.build_type.clone()).filter(|t| !t.is_empty()),
            jobs: config.effective_jobs(),
            extra_args: config.build.cmake_args.clone(),
            log_callback: None,
        }
    }
}

/// Build driver backed by the cmake command line
pub struct CmakeDriver {
    options: CmakeDriverOptions,
    /// Optional jobserver client for coordinating parallel builds
    jobserver: Option<jobserver::Client>,
    /// Build directory of the most recent configure
    configured: Option<Configured>,
}

struct Configured {
    build_dir: Utf8PathBuf,
    label: String,
}

impl CmakeDriver {
    pub fn new(options: CmakeDriverOptions) -> Self {
        Self {
            options,
            jobserver: None,
            configured: None,
        }
    }

    /// Set the jobserver client for parallel build coordination
    pub fn with_jobserver(mut self, client: jobserver::Client) -> Self {
        self.jobserver = Some(client);
        self
    }

    /// Set the callback receiving every output line
    pub fn with_log_callback(mut self, callback: LogCallback) -> Self {
        self.options.log_callback = Some(callback);
        self
    }

    /// Arguments for the configure invocation
    ///
    /// CMake keeps the last `-D` given for a name. Raw `extra_args` therefore
    /// come before the stage definitions, and the install prefix comes last, so
    /// neither can displace pinned options or the shared prefix.
    pub fn configure_args(
        &self,
        source_dir: &Utf8Path,
        build_dir: &Utf8Path,
        definitions: &BuildDefinitions,
    ) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            source_dir.to_string(),
            "-B".to_string(),
            build_dir.to_string(),
        ];

        if let Some(build_type) = &self.options.build_type {
            args.push(format!("-DCMAKE_BUILD_TYPE={}", build_type));
        }

        args.extend(self.options.extra_args.iter().cloned());
        args.extend(definitions.to_cmake_args());
        args.push(format!(
            "-D{}={}",
            INSTALL_PREFIX_DEFINITION, self.options.install_prefix
        ));
        args
    }

    fn configured(&self, operation: &str) -> Result<&Configured> {
        self.configured.as_ref().ok_or_else(|| {
            Error::build(
                format!("{} requested before configure", operation),
                "Call configure for the stage first",
            )
        })
    }
}

impl BuildDriver for CmakeDriver {
    async fn configure(
        &mut self,
        source_dir: &Utf8Path,
        build_dir: &Utf8Path,
        definitions: &BuildDefinitions,
    ) -> Result<()> {
        std::fs::create_dir_all(build_dir)?;
        std::fs::create_dir_all(&self.options.install_prefix)?;

        let label = source_dir
            .file_name()
            .unwrap_or(source_dir.as_str())
            .to_string();
        let args = self.configure_args(source_dir, build_dir, definitions);

        tracing::debug!("Running cmake configure: cmake {:?}", args);
        let mut cmd = Command::new(&self.options.program);
        cmd.args(&args);

        // A failed configure leaves nothing to build
        self.configured = None;
        run_command_with_logging(
            &mut cmd,
            &label,
            "CMake configure",
            self.options.log_callback.clone(),
        )
        .await?;

        self.configured = Some(Configured {
            build_dir: build_dir.to_path_buf(),
            label,
        });
        Ok(())
    }

    async fn build(&mut self) -> Result<()> {
        let configured = self.configured("CMake build")?;

        tracing::debug!("Running cmake build with {} jobs", self.options.jobs);
        let jobs = self.options.jobs.to_string();
        let mut cmd = Command::new(&self.options.program);
        cmd.args([
            "--build",
            configured.build_dir.as_str(),
            "--parallel",
            jobs.as_str(),
        ]);

        if let Some(js) = &self.jobserver {
            js.configure(cmd.as_std_mut());
            tracing::debug!("Configured jobserver for cmake build");
        }

        run_command_with_logging(
            &mut cmd,
            &configured.label,
            "CMake build",
            self.options.log_callback.clone(),
        )
        .await
    }

    async fn install(&mut self) -> Result<()> {
        let configured = self.configured("CMake install")?;

        tracing::debug!("Running cmake install into {}", self.options.install_prefix);
        let mut cmd = Command::new(&self.options.program);
        cmd.args(["--install", configured.build_dir.as_str()])
            .current_dir(&configured.build_dir);

        run_command_with_logging(
            &mut cmd,
            &configured.label,
            "CMake install",
            self.options.log_callback.clone(),
        )
        .await
    }
}
