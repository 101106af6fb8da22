//! Shared state for the request handlers.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::questions::QuestionCatalog;
use crate::search::{Bm25Search, HybridSearchConfig, HybridSearchService, StoreVectorIndex};
use crate::storage::QuestionStore;

/// Cloned per request; the services behind the `Arc`s are shared.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<HybridSearchService>,
    pub catalog: Arc<QuestionCatalog>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the store and index under `root` with the configured provider.
    pub async fn open(config: Config, root: &Path) -> Result<Self> {
        let embedder = create_provider(&config.embeddings)
            .with_context(|| "Failed to initialize embedding provider")?;

        let store = QuestionStore::new(&config.db_path(root), embedder.embedding_dimension())
            .await
            .with_context(|| "Failed to initialize question store")?;

        let lexical = Bm25Search::new(&config.bm25_path(root))
            .with_context(|| "Failed to initialize BM25 index")?;

        let state = Self::from_parts(config, embedder, Arc::new(store), Arc::new(lexical))?;
        info!(
            provider = state.search.embedder().provider_name(),
            "Search services ready"
        );
        Ok(state)
    }

    /// Wire the services around already opened components.
    pub fn from_parts(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<QuestionStore>,
        lexical: Arc<Bm25Search>,
    ) -> Result<Self> {
        let hybrid_config = HybridSearchConfig::from_search_config(&config.search)?;
        let vector = StoreVectorIndex::new(store.clone()).with_filters(config.search.semantic_filters);

        let search = HybridSearchService::new(
            embedder.clone(),
            lexical.clone(),
            Arc::new(vector),
            hybrid_config,
        );
        let catalog = QuestionCatalog::new(store, lexical, embedder);

        Ok(Self {
            search: Arc::new(search),
            catalog: Arc::new(catalog),
            config: Arc::new(config),
        })
    }
}
