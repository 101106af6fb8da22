//! Score fusion for hybrid search.
//!
//! The default strategy min-max normalizes each branch independently,
//! converts semantic distance into similarity (`1 - norm`), and combines the
//! two columns with fixed weights:
//!
//! `score = text_weight * norm_lexical + semantic_weight * (1 - norm_distance)`
//!
//! Branches are joined by question id. An id found in only one branch gets 0
//! for the other. Output is sorted by descending score with a stable sort, so
//! ties keep first-seen order: lexical list order, then semantic-only ids in
//! semantic order.

use anyhow::{bail, Result};
use std::collections::HashMap;
use uuid::Uuid;

use super::types::{FusedResult, LexicalHit, SemanticHit};
use crate::config::{FusionStrategy, SearchConfig, WEIGHT_SUM_TOLERANCE};

pub const DEFAULT_TEXT_WEIGHT: f32 = 0.6;
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.4;
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Min-max normalize `raw` into [0, 1].
///
/// The minimum maps to 0.0 and the maximum to 1.0. When every value is equal
/// the whole column is 0.0. Non-finite inputs are ignored when computing the
/// range and normalize to 0.0.
pub fn normalize(raw: &[f32]) -> Vec<f32> {
    let (min, max) = raw
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0.0; raw.len()];
    }

    raw.iter()
        .map(|&v| {
            if v.is_finite() {
                ((v - min) / range).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Normalize distances and flip them so the nearest hit scores 1.0.
///
/// A degenerate column (all distances equal) stays at 0.0.
pub fn normalize_distances(distances: &[f32]) -> Vec<f32> {
    let normalized = normalize(distances);
    if normalized.iter().all(|&v| v == 0.0) {
        return normalized;
    }
    normalized
        .into_iter()
        .zip(distances)
        .map(|(n, d)| if d.is_finite() { 1.0 - n } else { 0.0 })
        .collect()
}

/// One fused candidate before sorting
struct Candidate {
    id: Uuid,
    text: String,
    tags: Vec<String>,
    lexical: f32,
    semantic: f32,
}

/// Combines lexical and semantic hit lists into one ranking.
#[derive(Debug, Clone)]
pub struct ScoreFusion {
    text_weight: f32,
    semantic_weight: f32,
    strategy: FusionStrategy,
    rrf_k: f32,
}

impl ScoreFusion {
    /// Min-max fusion with the given weights.
    ///
    /// Weights must be finite, non-negative, and sum to 1.0.
    pub fn new(text_weight: f32, semantic_weight: f32) -> Result<Self> {
        for w in [text_weight, semantic_weight] {
            if !w.is_finite() || w < 0.0 {
                bail!("Fusion weights must be non-negative numbers, got {}", w);
            }
        }
        if (text_weight + semantic_weight - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!(
                "Fusion weights must sum to 1.0, got {} + {}",
                text_weight,
                semantic_weight
            );
        }

        Ok(Self {
            text_weight,
            semantic_weight,
            strategy: FusionStrategy::MinMax,
            rrf_k: DEFAULT_RRF_K,
        })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let fusion = Self::new(config.text_weight, config.semantic_weight)?;
        match config.fusion {
            FusionStrategy::MinMax => Ok(fusion),
            FusionStrategy::Rrf => fusion.with_rrf(config.rrf_k),
        }
    }

    /// Switch to weighted reciprocal rank fusion with constant `k`.
    pub fn with_rrf(mut self, k: f32) -> Result<Self> {
        if !k.is_finite() || k <= 0.0 {
            bail!("RRF k must be positive, got {}", k);
        }
        self.strategy = FusionStrategy::Rrf;
        self.rrf_k = k;
        Ok(self)
    }

    pub fn weights(&self) -> (f32, f32) {
        (self.text_weight, self.semantic_weight)
    }

    pub fn strategy(&self) -> FusionStrategy {
        self.strategy
    }

    /// Fuse the two branches. Duplicate ids within a branch keep their first hit.
    pub fn fuse(&self, lexical: Vec<LexicalHit>, semantic: Vec<SemanticHit>) -> Vec<FusedResult> {
        let lexical = dedup_by_id(lexical, |h| h.id);
        let semantic = dedup_by_id(semantic, |h| h.id);

        let (lexical_scores, semantic_scores) = match self.strategy {
            FusionStrategy::MinMax => {
                let ranks: Vec<f32> = lexical.iter().map(|h| h.rank).collect();
                let distances: Vec<f32> = semantic.iter().map(|h| h.distance).collect();
                (normalize(&ranks), normalize_distances(&distances))
            }
            FusionStrategy::Rrf => (
                self.reciprocal_ranks(lexical.len()),
                self.reciprocal_ranks(semantic.len()),
            ),
        };

        let mut candidates: Vec<Candidate> = Vec::with_capacity(lexical.len() + semantic.len());
        let mut positions: HashMap<Uuid, usize> = HashMap::with_capacity(candidates.capacity());

        for (hit, score) in lexical.into_iter().zip(lexical_scores) {
            positions.insert(hit.id, candidates.len());
            candidates.push(Candidate {
                id: hit.id,
                text: hit.text,
                tags: hit.tags,
                lexical: score,
                semantic: 0.0,
            });
        }

        for (hit, score) in semantic.into_iter().zip(semantic_scores) {
            match positions.get(&hit.id) {
                Some(&pos) => candidates[pos].semantic = score,
                None => {
                    positions.insert(hit.id, candidates.len());
                    candidates.push(Candidate {
                        id: hit.id,
                        text: hit.text,
                        tags: hit.tags,
                        lexical: 0.0,
                        semantic: score,
                    });
                }
            }
        }

        let scale = self.score_scale();
        let mut fused: Vec<FusedResult> = candidates
            .into_iter()
            .map(|c| {
                let raw = self.text_weight * c.lexical + self.semantic_weight * c.semantic;
                FusedResult {
                    id: c.id,
                    text: c.text,
                    tags: c.tags,
                    score: (raw * scale).clamp(0.0, 1.0),
                }
            })
            .collect();

        // sort_by is stable: equal scores keep first-seen order
        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        fused
    }

    /// `1 / (k + rank)` for 1-indexed ranks
    fn reciprocal_ranks(&self, len: usize) -> Vec<f32> {
        (1..=len).map(|rank| 1.0 / (self.rrf_k + rank as f32)).collect()
    }

    /// Factor that maps the strategy's best possible score to 1.0
    fn score_scale(&self) -> f32 {
        match self.strategy {
            FusionStrategy::MinMax => 1.0,
            FusionStrategy::Rrf => {
                let best = (self.text_weight + self.semantic_weight) / (self.rrf_k + 1.0);
                if best > 0.0 {
                    1.0 / best
                } else {
                    0.0
                }
            }
        }
    }
}

impl Default for ScoreFusion {
    fn default() -> Self {
        Self {
            text_weight: DEFAULT_TEXT_WEIGHT,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            strategy: FusionStrategy::MinMax,
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

fn dedup_by_id<T>(hits: Vec<T>, id: impl Fn(&T) -> Uuid) -> Vec<T> {
    let mut seen = std::collections::HashSet::with_capacity(hits.len());
    hits.into_iter().filter(|h| seen.insert(id(h))).collect()
}
