//! Describe command implementation
//!
//! Prints the package descriptor without building anything.

use camino::Utf8Path;
use clap::{Args, ValueEnum};
use miette::Result;

use crate::distribution;
use crate::export::render_cmake_components;

/// Output format for `describe`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DescribeFormat {
    /// JSON package descriptor
    #[default]
    Json,
    /// CMake components file
    Cmake,
}

/// Arguments for the describe command
#[derive(Debug, Args)]
pub struct DescribeArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = DescribeFormat::Json)]
    pub format: DescribeFormat,
}

/// Run the describe command
pub fn run(_workspace_root: &Utf8Path, args: DescribeArgs) -> Result<()> {
    let descriptor = distribution::package_descriptor()?;

    match args.format {
        DescribeFormat::Json => println!("{}", descriptor.to_json()?),
        DescribeFormat::Cmake => print!("{}", render_cmake_components(&descriptor)),
    }

    Ok(())
}
