//! Hybrid question search.
//!
//! The lexical branch and the embed→vector branch run concurrently over the
//! same candidate pool size, then [`ScoreFusion`] merges them. When the
//! semantic branch fails and the fallback policy is `lexical`, the lexical
//! hits are fused alone and the outcome is flagged as degraded.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::fusion::ScoreFusion;
use super::traits::{LexicalSearchIndex, VectorSearchIndex};
use super::types::{FusedResult, LexicalHit, SearchFilter, SemanticHit};
use crate::config::{EmbeddingFallback, SearchConfig};
use crate::embeddings::EmbeddingProvider;
use crate::error::{SearchError, SearchResult};
use crate::metrics::{SEARCH_DEGRADED, SEARCH_ERRORS, SEARCH_LATENCY, SEARCH_REQUESTS, SEARCH_RESULTS};

/// Runtime settings of [`HybridSearchService`].
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    pub fusion: ScoreFusion,
    pub pool_multiplier: usize,
    pub min_pool: usize,
    pub max_top_n: usize,
    pub keyword_limit: usize,
    pub fallback: EmbeddingFallback,
}

impl HybridSearchConfig {
    pub fn from_search_config(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            fusion: ScoreFusion::from_config(config)?,
            pool_multiplier: config.pool_multiplier,
            min_pool: config.min_pool,
            max_top_n: config.max_top_n,
            keyword_limit: config.keyword_limit,
            fallback: config.embedding_fallback,
        })
    }

    /// Candidates requested from each branch
    pub fn pool_size(&self, top_n: usize) -> usize {
        top_n
            .saturating_mul(self.pool_multiplier)
            .max(self.min_pool)
            .max(top_n)
    }
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        let search = SearchConfig::default();
        Self {
            fusion: ScoreFusion::default(),
            pool_multiplier: search.pool_multiplier,
            min_pool: search.min_pool,
            max_top_n: search.max_top_n,
            keyword_limit: search.keyword_limit,
            fallback: search.embedding_fallback,
        }
    }
}

/// Fused results plus the reason the semantic branch was skipped, if it was.
#[derive(Debug, Clone, Serialize)]
pub struct HybridSearchOutcome {
    pub results: Vec<FusedResult>,
    pub degraded: Option<String>,
}

impl HybridSearchOutcome {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

pub struct HybridSearchService {
    embedder: Arc<dyn EmbeddingProvider>,
    lexical: Arc<dyn LexicalSearchIndex>,
    vector: Arc<dyn VectorSearchIndex>,
    config: HybridSearchConfig,
}

impl HybridSearchService {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        lexical: Arc<dyn LexicalSearchIndex>,
        vector: Arc<dyn VectorSearchIndex>,
        config: HybridSearchConfig,
    ) -> Self {
        Self {
            embedder,
            lexical,
            vector,
            config,
        }
    }

    pub fn config(&self) -> &HybridSearchConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Top `top_n` questions by fused lexical + semantic score.
    pub async fn hybrid_search(
        &self,
        query: &str,
        filter: SearchFilter,
        top_n: usize,
    ) -> SearchResult<Vec<FusedResult>> {
        self.hybrid_search_detailed(query, filter, top_n)
            .await
            .map(|outcome| outcome.results)
    }

    /// As [`hybrid_search`](Self::hybrid_search), also reporting degradation.
    pub async fn hybrid_search_detailed(
        &self,
        query: &str,
        filter: SearchFilter,
        top_n: usize,
    ) -> SearchResult<HybridSearchOutcome> {
        SEARCH_REQUESTS.with_label_values(&["hybrid"]).inc();
        record_errors(self.run_hybrid(query, filter, top_n).await)
    }

    async fn run_hybrid(
        &self,
        query: &str,
        filter: SearchFilter,
        top_n: usize,
    ) -> SearchResult<HybridSearchOutcome> {
        let query = self.validate_query(query)?;
        self.validate_top_n(top_n)?;
        let filter = filter.normalized()?;

        let start = Instant::now();
        let pool = self.config.pool_size(top_n);
        debug!(query = query, top_n, pool, "Starting hybrid search");

        let (lexical, semantic) = tokio::join!(
            self.lexical_branch(query, &filter, pool),
            self.semantic_branch(query, &filter, pool)
        );

        let lexical = lexical?;
        let (semantic, degraded) = match semantic {
            Ok(hits) => (hits, None),
            Err(e) => match self.config.fallback {
                EmbeddingFallback::Strict => return Err(e),
                EmbeddingFallback::Lexical => {
                    warn!(
                        error = %e,
                        kind = e.kind(),
                        query = query,
                        "Semantic branch failed, returning lexical-only results"
                    );
                    SEARCH_DEGRADED.inc();
                    (Vec::new(), Some(e.to_string()))
                }
            },
        };

        let lexical_count = lexical.len();
        let semantic_count = semantic.len();
        let mut results = self.config.fusion.fuse(lexical, semantic);
        results.truncate(top_n);

        let elapsed = start.elapsed();
        SEARCH_LATENCY.observe(elapsed.as_secs_f64());
        SEARCH_RESULTS.observe(results.len() as f64);
        info!(
            search_type = "hybrid",
            query = query,
            results = results.len(),
            lexical_hits = lexical_count,
            semantic_hits = semantic_count,
            degraded = degraded.is_some(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Hybrid search completed"
        );

        Ok(HybridSearchOutcome { results, degraded })
    }

    /// Nearest `top_n` questions by embedding distance.
    ///
    /// Fails with `EmbeddingUnavailable` when the query cannot be embedded.
    pub async fn semantic_search(
        &self,
        query: &str,
        filter: SearchFilter,
        top_n: usize,
    ) -> SearchResult<Vec<SemanticHit>> {
        SEARCH_REQUESTS.with_label_values(&["semantic"]).inc();
        record_errors(self.run_semantic(query, filter, top_n).await)
    }

    async fn run_semantic(
        &self,
        query: &str,
        filter: SearchFilter,
        top_n: usize,
    ) -> SearchResult<Vec<SemanticHit>> {
        let query = self.validate_query(query)?;
        self.validate_top_n(top_n)?;
        let filter = filter.normalized()?;

        let start = Instant::now();
        let hits = self.semantic_branch(query, &filter, top_n).await?;

        let elapsed = start.elapsed();
        SEARCH_LATENCY.observe(elapsed.as_secs_f64());
        SEARCH_RESULTS.observe(hits.len() as f64);
        info!(
            search_type = "semantic",
            query = query,
            results = hits.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Semantic search completed"
        );
        Ok(hits)
    }

    /// Full-text matches, highest rank first. `limit` defaults to `keyword_limit`.
    pub async fn keyword_search(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: Option<usize>,
    ) -> SearchResult<Vec<LexicalHit>> {
        SEARCH_REQUESTS.with_label_values(&["keyword"]).inc();
        record_errors(self.run_keyword(query, filter, limit).await)
    }

    async fn run_keyword(
        &self,
        query: &str,
        filter: SearchFilter,
        limit: Option<usize>,
    ) -> SearchResult<Vec<LexicalHit>> {
        let query = self.validate_query(query)?;
        let limit = limit.unwrap_or(self.config.keyword_limit);
        let max_limit = self.config.max_top_n.max(self.config.keyword_limit);
        if limit == 0 || limit > max_limit {
            return Err(SearchError::InvalidRequest(format!(
                "limit must be between 1 and {}, got {}",
                max_limit, limit
            )));
        }
        let filter = filter.normalized()?;

        let start = Instant::now();
        let hits = self.lexical_branch(query, &filter, limit).await?;

        let elapsed = start.elapsed();
        SEARCH_LATENCY.observe(elapsed.as_secs_f64());
        SEARCH_RESULTS.observe(hits.len() as f64);
        info!(
            search_type = "keyword",
            query = query,
            results = hits.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Keyword search completed"
        );
        Ok(hits)
    }

    async fn lexical_branch(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> SearchResult<Vec<LexicalHit>> {
        self.lexical
            .search_text(query, filter, limit)
            .await
            .map_err(SearchError::index)
    }

    async fn semantic_branch(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> SearchResult<Vec<SemanticHit>> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| SearchError::EmbeddingUnavailable(format!("{:#}", e)))?;

        self.vector.search_vector(&vector, filter, limit).await
    }

    fn validate_query<'q>(&self, query: &'q str) -> SearchResult<&'q str> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(SearchError::InvalidRequest(
                "query must not be blank".to_string(),
            ));
        }
        Ok(trimmed)
    }

    fn validate_top_n(&self, top_n: usize) -> SearchResult<()> {
        if top_n == 0 || top_n > self.config.max_top_n {
            return Err(SearchError::InvalidRequest(format!(
                "top_n must be between 1 and {}, got {}",
                self.config.max_top_n, top_n
            )));
        }
        Ok(())
    }
}

fn record_errors<T>(result: SearchResult<T>) -> SearchResult<T> {
    if let Err(e) = &result {
        SEARCH_ERRORS.with_label_values(&[e.kind()]).inc();
    }
    result
}
