use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::traits::VectorSearchIndex;
use super::types::{SearchFilter, SemanticHit};
use crate::error::{SearchError, SearchResult};
use crate::storage::QuestionStore;

/// Over-fetch factor when tags are filtered after retrieval
const TAG_OVERFETCH: usize = 4;

/// Nearest-neighbour branch backed by the question store.
///
/// With `apply_filters` set, difficulty is pushed down to LanceDB as a
/// prefilter and tag containment is checked on the returned rows. Otherwise
/// the filter is ignored on this branch.
pub struct StoreVectorIndex {
    store: Arc<QuestionStore>,
    apply_filters: bool,
}

impl StoreVectorIndex {
    pub fn new(store: Arc<QuestionStore>) -> Self {
        Self {
            store,
            apply_filters: true,
        }
    }

    pub fn with_filters(mut self, apply_filters: bool) -> Self {
        self.apply_filters = apply_filters;
        self
    }

    pub fn store(&self) -> &Arc<QuestionStore> {
        &self.store
    }
}

#[async_trait]
impl VectorSearchIndex for StoreVectorIndex {
    async fn search_vector(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> SearchResult<Vec<SemanticHit>> {
        let expected = self.store.dimension();
        if vector.len() != expected {
            return Err(SearchError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let start = Instant::now();
        let (difficulty, tags): (Option<&str>, &[String]) = if self.apply_filters {
            (filter.difficulty.as_deref(), filter.tags.as_slice())
        } else {
            (None, &[][..])
        };

        let fetch = if tags.is_empty() {
            limit
        } else {
            limit.saturating_mul(TAG_OVERFETCH)
        };

        let matches = self
            .store
            .search(vector, fetch, difficulty)
            .await
            .map_err(SearchError::index)?;

        let hits: Vec<SemanticHit> = matches
            .into_iter()
            .filter(|m| m.question.has_all_tags(tags))
            .take(limit)
            .map(|m| SemanticHit {
                id: m.question.id,
                text: m.question.text,
                tags: m.question.tags,
                distance: m.distance,
            })
            .collect();

        debug!(
            search_type = "vector",
            results = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Vector search completed"
        );
        Ok(hits)
    }

    fn dimension(&self) -> usize {
        self.store.dimension()
    }
}
