//! Question search: BM25 keyword search, vector search, and their fusion.
//!
//! - `bm25` - Tantivy full-text index over question text
//! - `vector` - nearest-neighbour branch over the question store
//! - `fusion` - min-max (or RRF) score fusion
//! - `hybrid` - the service that runs both branches and fuses them

pub mod bm25;
pub mod fusion;
pub mod hybrid;
pub mod traits;
pub mod types;
mod vector;

pub use bm25::{Bm25Index, Bm25Search};
pub use fusion::{normalize, ScoreFusion};
pub use hybrid::{HybridSearchConfig, HybridSearchOutcome, HybridSearchService};
pub use traits::{LexicalIndexWriter, LexicalSearchIndex, VectorSearchIndex};
pub use types::{parse_tag_list, FusedResult, LexicalHit, SearchFilter, SemanticHit};
pub use vector::StoreVectorIndex;
