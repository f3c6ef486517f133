// casewatch/src/main.rs

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging (Tracing)
    // RUST_LOG=debug casewatch run ... to see every fetch attempt.
    // Logs go to stderr, stdout carries the run summary.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { project_dir } => commands::run::execute(project_dir).await,
        Commands::Inspect {
            project_dir,
            region,
            limit,
        } => commands::inspect::execute(project_dir, region, limit).await,
        Commands::Clean { project_dir } => commands::clean::execute(project_dir),
    }
}
