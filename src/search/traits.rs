//! Seams between the hybrid search service and its two index branches.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::types::{LexicalHit, SearchFilter, SemanticHit};
use crate::error::SearchResult;
use crate::questions::Question;

/// Full-text ranked search over question text.
#[async_trait]
pub trait LexicalSearchIndex: Send + Sync {
    /// Hits that match the text and pass `filter`, highest rank first.
    ///
    /// An empty vector means nothing matched; failures are errors.
    async fn search_text(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<LexicalHit>>;
}

/// Nearest-neighbour search over stored question embeddings.
#[async_trait]
pub trait VectorSearchIndex: Send + Sync {
    /// Nearest hits first.
    ///
    /// Fails with `DimensionMismatch` when `vector.len() != self.dimension()`.
    async fn search_vector(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> SearchResult<Vec<SemanticHit>>;

    /// Embedding dimensionality of the index
    fn dimension(&self) -> usize;
}

/// Write side of the full-text index, driven by the question catalog.
///
/// Each call is committed before it returns. A failed call leaves the
/// committed content unchanged.
pub trait LexicalIndexWriter: Send + Sync {
    fn upsert_and_commit(&self, questions: &[Question]) -> Result<()>;

    fn delete_and_commit(&self, id: Uuid) -> Result<()>;

    /// Replace the whole index content with `questions`
    fn rebuild(&self, questions: &[Question]) -> Result<()>;

    /// Number of committed documents
    fn num_docs(&self) -> u64;
}
