//! stagepack CLI - build and package the vendored distribution

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use stagepack::build::make_writer;
use stagepack::{commands, get_multi_progress};

/// stagepack - two-stage vendored build and package orchestrator
#[derive(Debug, Parser)]
#[command(name = "stagepack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Workspace root directory
    #[arg(short = 'w', long, global = true)]
    workspace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build both stages and stage the package
    Build(commands::build::BuildArgs),

    /// Print the package descriptor
    Describe(commands::describe::DescribeArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs are written above the progress bars
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(make_writer(get_multi_progress())))
        .with(filter)
        .init();

    let workspace_root = if let Some(ref path) = cli.workspace {
        camino::Utf8PathBuf::from(path)
    } else {
        std::env::current_dir()
            .ok()
            .and_then(|p| camino::Utf8PathBuf::try_from(p).ok())
            .unwrap_or_else(|| camino::Utf8PathBuf::from("."))
    };

    match cli.command {
        Commands::Build(args) => commands::build::run(&workspace_root, args),
        Commands::Describe(args) => commands::describe::run(&workspace_root, args),
    }
}
