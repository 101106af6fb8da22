use anyhow::Result;
use std::time::Instant;

use super::open_state;

/// Rebuild the BM25 index from the question store.
pub async fn run() -> Result<()> {
    let (state, _root) = open_state().await?;
    let start = Instant::now();

    let count = state.catalog.reindex().await?;

    println!(
        "Reindexed {} questions in {:.2}s",
        count,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
