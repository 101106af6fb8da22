use anyhow::Result;

use super::open_state;
use crate::cli::SearchMode;
use crate::search::SearchFilter;

/// Run a search from the command line and print the hits.
pub async fn run(
    query: &str,
    mode: SearchMode,
    top_n: Option<usize>,
    difficulty: Option<String>,
    tags: Vec<String>,
) -> Result<()> {
    let (state, _root) = open_state().await?;
    let top_n = top_n.unwrap_or(state.config.search.default_top_n);
    let filter = SearchFilter::new(difficulty, tags);

    let rows: Vec<(String, String, String)> = match mode {
        SearchMode::Hybrid => {
            let outcome = state
                .search
                .hybrid_search_detailed(query, filter, top_n)
                .await?;
            if let Some(reason) = &outcome.degraded {
                eprintln!("Semantic search unavailable, showing keyword matches only: {}", reason);
            }
            outcome
                .results
                .into_iter()
                .map(|r| (format!("score: {:.3}", r.score), r.text, r.tags.join(", ")))
                .collect()
        }
        SearchMode::Semantic => state
            .search
            .semantic_search(query, filter, top_n)
            .await?
            .into_iter()
            .map(|h| (format!("distance: {:.3}", h.distance), h.text, h.tags.join(", ")))
            .collect(),
        SearchMode::Keyword => state
            .search
            .keyword_search(query, filter, Some(top_n))
            .await?
            .into_iter()
            .map(|h| (format!("rank: {:.3}", h.rank), h.text, h.tags.join(", ")))
            .collect(),
    };

    if rows.is_empty() {
        println!("No results found for: {}", query);
        return Ok(());
    }

    println!("Found {} results for: \"{}\"\n", rows.len(), query);
    for (i, (score, text, tags)) in rows.iter().enumerate() {
        println!("{}. {} ({})", i + 1, text, score);
        if !tags.is_empty() {
            println!("   tags: {}", tags);
        }
    }

    Ok(())
}
