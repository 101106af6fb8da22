//! Stats command for displaying catalog statistics and metrics

use anyhow::Result;

use super::open_state;
use crate::metrics::{gather_metrics, MetricSnapshot, STORED_QUESTIONS};

/// Run the stats command
///
/// # Arguments
/// * `prometheus` - If true, output in Prometheus text format
pub async fn run(prometheus: bool) -> Result<()> {
    let (state, root) = open_state().await?;

    let total = state.catalog.count().await?;
    let indexed = state.catalog.lexical().num_docs();
    STORED_QUESTIONS.set(total as f64);

    if prometheus {
        print!("{}", gather_metrics());
        return Ok(());
    }

    let snapshot = MetricSnapshot::capture();
    let search = &state.config.search;

    println!("examsearch Statistics");
    println!("=====================\n");

    println!("Catalog:");
    println!("  Stored questions:  {}", total);
    println!("  Keyword index:     {} documents", indexed);
    if indexed != total as u64 {
        println!("  (index out of sync, run 'examsearch reindex')");
    }
    println!();

    println!("Search:");
    println!(
        "  Weights:           text {:.2} / semantic {:.2} ({})",
        search.text_weight, search.semantic_weight, search.fusion
    );
    println!(
        "  Requests:          hybrid {:.0}, semantic {:.0}, keyword {:.0}",
        snapshot.hybrid_requests, snapshot.semantic_requests, snapshot.keyword_requests
    );
    println!("  Degraded:          {:.0}", snapshot.degraded_searches);
    println!();

    println!("Embeddings:");
    println!(
        "  Provider:          {} ({} dimensions)",
        state.search.embedder().provider_name(),
        state.search.embedder().embedding_dimension()
    );
    println!();

    println!("Storage:");
    println!("  Database path:     {}", state.config.db_path(&root).display());
    println!("  Keyword index:     {}", state.config.bm25_path(&root).display());

    Ok(())
}
