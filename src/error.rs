//! Error taxonomy for the search core and the question catalog.

use thiserror::Error;

/// Errors surfaced by [`HybridSearchService`](crate::search::HybridSearchService)
/// and [`QuestionCatalog`](crate::questions::QuestionCatalog).
///
/// Store, index, and provider internals use `anyhow::Result`; they are
/// converted to one of these variants at the service boundary.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The embedding provider could not be reached or returned a malformed vector.
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// A vector did not have the configured embedding dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The difficulty/tag filter is malformed.
    #[error("Invalid filter: {0}")]
    InvalidFilterCombination(String),

    /// The request itself is malformed (blank query, out-of-range top_n, ...).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Full-text or vector index query failure.
    #[error("Index query failed: {0:#}")]
    Index(#[source] anyhow::Error),

    /// Question store read/write failure.
    #[error("Storage failure: {0:#}")]
    Storage(#[source] anyhow::Error),
}

impl SearchError {
    /// True for errors caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SearchError::InvalidFilterCombination(_)
                | SearchError::InvalidRequest(_)
                | SearchError::NotFound(_)
        )
    }

    /// Short machine-readable kind, used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchError::EmbeddingUnavailable(_) => "embedding_unavailable",
            SearchError::DimensionMismatch { .. } => "dimension_mismatch",
            SearchError::InvalidFilterCombination(_) => "invalid_filter",
            SearchError::InvalidRequest(_) => "invalid_request",
            SearchError::NotFound(_) => "not_found",
            SearchError::Index(_) => "index",
            SearchError::Storage(_) => "storage",
        }
    }

    /// Wrap a store failure, keeping a `SearchError` raised inside the store as is.
    pub fn storage(err: anyhow::Error) -> Self {
        match err.downcast::<SearchError>() {
            Ok(inner) => inner,
            Err(err) => SearchError::Storage(err),
        }
    }

    /// Wrap an index failure, keeping a `SearchError` raised inside the index as is.
    pub fn index(err: anyhow::Error) -> Self {
        match err.downcast::<SearchError>() {
            Ok(inner) => inner,
            Err(err) => SearchError::Index(err),
        }
    }
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;
