pub mod import;
pub mod init;
pub mod reindex;
pub mod search;
pub mod serve;
pub mod stats;

use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;

use crate::web::AppState;
use crate::Config;

/// Open the services for the project in the current directory.
pub(crate) async fn open_state() -> Result<(AppState, PathBuf)> {
    let root = env::current_dir()?;

    if !Config::is_initialized(&root) {
        bail!("examsearch is not initialized. Run 'examsearch init' first.");
    }

    let config = Config::load(&root)?;
    let state = AppState::open(config, &root).await?;
    Ok((state, root))
}
