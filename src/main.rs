//! Stemma CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "stemma")]
#[command(about = "Live TeX document dependency graph manager", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project scope directory (defaults to walking up from the document
    /// for a project marker)
    #[arg(short, long)]
    project: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the root for a document and print its inclusion tree
    Scan {
        /// Document to start from
        file: PathBuf,
    },
    /// Scan, then watch the discovered set and reconcile changes live
    Watch {
        /// Document to start from
        file: PathBuf,
    },
    /// Scan, then print every citation key in the discovered bibliographies
    Citations {
        /// Document to start from
        file: PathBuf,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "stemma={log_level},stemma_core={log_level},stemma_watcher={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Scan { file } => commands::scan(file, cli.project),
        Commands::Watch { file } => commands::watch(file, cli.project).await,
        Commands::Citations { file } => commands::citations(file, cli.project),
        Commands::Version => {
            println!("stemma v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
