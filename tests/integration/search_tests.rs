use anyhow::Result;
use std::collections::HashSet;

use crate::helpers::test_harness::TestHarness;
use examsearch::config::EmbeddingFallback;
use examsearch::search::SearchFilter;
use examsearch::{Config, SearchError};

#[tokio::test]
async fn test_politics_query_ranks_political_questions() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;

    let results = harness
        .state
        .search
        .hybrid_search("Is politics a dirty game?", SearchFilter::default(), 5)
        .await?;

    assert_eq!(results.len(), 5);
    let political = results
        .iter()
        .filter(|r| r.tags.iter().any(|t| t == "political"))
        .count();
    assert_eq!(political, 5, "unexpected results: {:?}", results);

    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for r in &results {
        assert!((0.0..=1.0).contains(&r.score));
    }
    assert!(results[0].text.contains("dirty game"));
    Ok(())
}

#[tokio::test]
async fn test_corruption_query_recalls_stored_questions() -> Result<()> {
    let (harness, stored) = TestHarness::seeded().await?;
    let seeded: HashSet<_> = stored.iter().map(|q| q.id).collect();

    let results = harness
        .state
        .search
        .hybrid_search(
            "Discuss whether corruption is inevitable in politics and governance",
            SearchFilter::default(),
            5,
        )
        .await?;

    assert!(results.len() >= 5, "unexpected results: {:?}", results);
    assert!(results.len() <= 5);
    assert!(results.iter().all(|r| seeded.contains(&r.id)));
    let distinct: HashSet<_> = results.iter().map(|r| r.id).collect();
    assert_eq!(distinct.len(), results.len());
    Ok(())
}

#[tokio::test]
async fn test_keyword_search_stems_corruption() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;

    let hits = harness
        .state
        .search
        .keyword_search("corrupt", SearchFilter::default(), None)
        .await?;

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().any(|h| h.text.contains("corrupt enterprise")));
    assert!(hits.iter().any(|h| h.text.contains("corruption")));
    assert!(hits[0].rank >= hits[1].rank);
    Ok(())
}

#[tokio::test]
async fn test_hybrid_filters_restrict_both_branches() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;

    let filter = SearchFilter::new(None, vec!["philosophy".into(), "ethics".into()]);
    let results = harness
        .state
        .search
        .hybrid_search("politics dirty game", filter, 10)
        .await?;

    // Only two questions carry both tags
    assert_eq!(results.len(), 2);
    for r in &results {
        assert!(r.tags.contains(&"philosophy".to_string()));
        assert!(r.tags.contains(&"ethics".to_string()));
    }
    Ok(())
}

#[tokio::test]
async fn test_music_question_found_semantically() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;

    let hits = harness
        .state
        .search
        .semantic_search("influential rapper", SearchFilter::default(), 3)
        .await?;

    assert_eq!(hits.len(), 3);
    assert!(hits[0].text.contains("rapper"));
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
    Ok(())
}

#[tokio::test]
async fn test_hybrid_degrades_to_lexical_without_embeddings() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;
    let state = harness.with_failing_embedder(Config::default())?;

    let outcome = state
        .search
        .hybrid_search_detailed("politics dirty game", SearchFilter::default(), 5)
        .await?;

    assert!(outcome.is_degraded());
    assert!(!outcome.results.is_empty());
    for r in &outcome.results {
        assert!(r.score <= 0.6 + 1e-6);
    }
    assert!((outcome.results[0].score - 0.6).abs() < 1e-6);
    Ok(())
}

#[tokio::test]
async fn test_strict_fallback_propagates_embedding_failure() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;
    let mut config = Config::default();
    config.search.embedding_fallback = EmbeddingFallback::Strict;
    let state = harness.with_failing_embedder(config)?;

    let err = state
        .search
        .hybrid_search("politics dirty game", SearchFilter::default(), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::EmbeddingUnavailable(_)));
    Ok(())
}

#[tokio::test]
async fn test_semantic_search_is_strict() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;
    let state = harness.with_failing_embedder(Config::default())?;

    let err = state
        .search
        .semantic_search("politics", SearchFilter::default(), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::EmbeddingUnavailable(_)));
    Ok(())
}

#[tokio::test]
async fn test_search_on_empty_catalog() -> Result<()> {
    let harness = TestHarness::new().await?;

    let results = harness
        .state
        .search
        .hybrid_search("politics", SearchFilter::default(), 5)
        .await?;
    assert!(results.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_deleted_question_leaves_results() -> Result<()> {
    let (harness, stored) = TestHarness::seeded().await?;
    let corrupt = stored
        .iter()
        .find(|q| q.text.contains("corrupt enterprise"))
        .unwrap();

    assert!(harness.state.catalog.delete_question(corrupt.id).await?);

    let hits = harness
        .state
        .search
        .keyword_search("corrupt", SearchFilter::default(), None)
        .await?;
    assert_eq!(hits.len(), 1);

    let results = harness
        .state
        .search
        .hybrid_search("corrupt enterprise", SearchFilter::default(), 10)
        .await?;
    assert!(results.iter().all(|r| r.id != corrupt.id));
    Ok(())
}
