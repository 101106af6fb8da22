use anyhow::Result;
use std::sync::Arc;

use crate::helpers::test_harness::{exam_questions, TestHarness, TEST_DIMENSION};
use examsearch::embeddings::MockEmbedder;
use examsearch::questions::{ListQuestions, NewQuestion, QuestionCatalog, QuestionUpdate};
use examsearch::search::{Bm25Search, SearchFilter};
use examsearch::storage::QuestionStore;
use examsearch::{Config, SearchError};

#[tokio::test]
async fn test_catalog_survives_reopen() -> Result<()> {
    let (harness, stored) = TestHarness::seeded().await?;
    let config = Config::default();
    let db_path = config.db_path(harness.path());
    let bm25_path = config.bm25_path(harness.path());

    // Release the index writer lock before reopening
    let TestHarness {
        temp_dir,
        store,
        lexical,
        state,
    } = harness;
    drop(state);
    drop(lexical);
    drop(store);

    let store = Arc::new(QuestionStore::new(&db_path, TEST_DIMENSION).await?);
    assert_eq!(store.count().await?, stored.len());

    let lexical = Bm25Search::new(&bm25_path)?;
    assert_eq!(lexical.num_docs(), stored.len() as u64);

    let first = store.get_question(stored[0].id).await?.unwrap();
    assert_eq!(first, stored[0]);
    drop(temp_dir);
    Ok(())
}

#[tokio::test]
async fn test_reopen_with_other_dimension_fails() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;
    let db_path = Config::default().db_path(harness.path());

    let err = QuestionStore::new(&db_path, TEST_DIMENSION / 2)
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<SearchError>(),
        Some(SearchError::DimensionMismatch { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_reindex_rebuilds_keyword_index() -> Result<()> {
    let (harness, stored) = TestHarness::seeded().await?;
    let catalog = &harness.state.catalog;

    harness.lexical.rebuild(&[])?;
    let hits = harness
        .state
        .search
        .keyword_search("corrupt", SearchFilter::default(), None)
        .await?;
    assert!(hits.is_empty());

    assert_eq!(catalog.reindex().await?, stored.len());
    let hits = harness
        .state
        .search
        .keyword_search("corrupt", SearchFilter::default(), None)
        .await?;
    assert_eq!(hits.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_update_keeps_search_in_sync() -> Result<()> {
    let (harness, stored) = TestHarness::seeded().await?;
    let rapper = stored.iter().find(|q| q.text.contains("rapper")).unwrap();

    let updated = harness
        .state
        .catalog
        .update_question(
            rapper.id,
            QuestionUpdate {
                difficulty: Some("easy".into()),
                tags: Some(vec!["music".into(), "culture".into()]),
                question_type: None,
            },
        )
        .await?;
    assert_eq!(updated.difficulty.as_deref(), Some("easy"));
    assert_eq!(
        updated.tags,
        vec!["music", "contemporary", "poetry", "culture"]
    );
    assert_eq!(updated.created_at, rapper.created_at);

    let filter = SearchFilter::new(Some("easy".into()), vec!["culture".into()]);
    let results = harness
        .state
        .search
        .hybrid_search("influential rapper", filter, 5)
        .await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, rapper.id);
    Ok(())
}

#[tokio::test]
async fn test_list_filters_and_pages() -> Result<()> {
    let (harness, _) = TestHarness::seeded().await?;
    let catalog = &harness.state.catalog;

    let ethics = catalog
        .list_questions(ListQuestions {
            tags: vec!["ethics".into()],
            ..Default::default()
        })
        .await?;
    assert_eq!(ethics.len(), 5);

    let page = catalog
        .list_questions(ListQuestions {
            limit: 3,
            offset: 6,
            ..Default::default()
        })
        .await?;
    assert_eq!(page.len(), 1);

    let text = catalog
        .list_questions(ListQuestions {
            text: Some("MORALITY".into()),
            ..Default::default()
        })
        .await?;
    assert_eq!(text.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_bulk_store_rejects_whole_batch() -> Result<()> {
    let harness = TestHarness::new().await?;
    let mut items = exam_questions();
    items.push(NewQuestion::new("   "));

    let err = harness
        .state
        .catalog
        .bulk_store_questions(items)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidRequest(_)));
    assert_eq!(harness.state.catalog.count().await?, 0);
    assert_eq!(harness.lexical.num_docs(), 0);
    Ok(())
}

#[tokio::test]
async fn test_catalog_over_in_memory_index() -> Result<()> {
    let harness = TestHarness::new().await?;
    let catalog = QuestionCatalog::new(
        harness.store.clone(),
        Arc::new(Bm25Search::in_memory()?),
        Arc::new(MockEmbedder::new(TEST_DIMENSION)),
    );

    let q = catalog
        .store_question(NewQuestion::new("Describe love in three sentences").with_difficulty("easy"))
        .await?;
    assert_eq!(catalog.get_question(q.id).await?, q);
    assert_eq!(catalog.lexical().num_docs(), 1);
    Ok(())
}
