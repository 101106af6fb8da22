use anyhow::{bail, Result};
use std::env;
use tracing::info;

use crate::Config;

pub async fn run(force: bool) -> Result<()> {
    let root = env::current_dir()?;

    if Config::is_initialized(&root) && !force {
        bail!(
            "examsearch is already initialized in {:?} (use --force to overwrite)",
            Config::data_dir(&root)
        );
    }

    let config = Config::default();
    config.save(&root)?;

    info!("Initialized examsearch in {:?}", Config::data_dir(&root));
    println!(
        "✓ Created {} with default configuration",
        Config::data_dir(&root).display()
    );
    println!("\nNext steps:");
    println!("  1. Edit .examsearch/config.toml to choose an embedding provider");
    println!("  2. Run 'examsearch import questions.json' to load questions");
    println!("  3. Run 'examsearch serve' to start the API server");

    Ok(())
}
