use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use examsearch::cli::{Cli, Commands};
use examsearch::config::Config;
use examsearch::logging::init_logging;
use examsearch::metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    // Defaults until the project is initialized
    let config = Config::load(&project_root).unwrap_or_default();

    // The guard must live until exit so buffered logs are flushed
    let _logging_guard = init_logging(&config.logging, &project_root)?;

    tracing::debug!("Loaded configuration from: {}", project_root.display());

    metrics::register_metrics();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            examsearch::commands::init::run(force).await?;
        }
        Commands::Import { file } => {
            examsearch::commands::import::run(&file).await?;
        }
        Commands::Reindex => {
            examsearch::commands::reindex::run().await?;
        }
        Commands::Search {
            query,
            mode,
            top_n,
            difficulty,
            tags,
        } => {
            examsearch::commands::search::run(&query, mode, top_n, difficulty, tags).await?;
        }
        Commands::Serve { host, port } => {
            examsearch::commands::serve::run(host, port).await?;
        }
        Commands::Stats { prometheus } => {
            examsearch::commands::stats::run(prometheus).await?;
        }
    }

    Ok(())
}
