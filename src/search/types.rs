//! Hit types and request filters shared by the search branches.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SearchError, SearchResult};

const MAX_FILTER_TAGS: usize = 32;
const MAX_TAG_LEN: usize = 64;

/// A full-text match. `rank` is only comparable within one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexicalHit {
    pub id: Uuid,
    pub text: String,
    pub tags: Vec<String>,
    pub rank: f32,
}

/// A nearest-neighbour match. Smaller `distance` is more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticHit {
    pub id: Uuid,
    pub text: String,
    pub tags: Vec<String>,
    pub distance: f32,
}

/// A hybrid result with its fused score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    pub id: Uuid,
    pub text: String,
    pub tags: Vec<String>,
    pub score: f32,
}

/// Optional difficulty and tag restrictions.
///
/// A candidate passes when its difficulty equals `difficulty` (if set) and its
/// tag set contains every tag in `tags`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchFilter {
    pub difficulty: Option<String>,
    pub tags: Vec<String>,
}

impl SearchFilter {
    pub fn new(difficulty: Option<String>, tags: Vec<String>) -> Self {
        Self { difficulty, tags }
    }

    pub fn is_empty(&self) -> bool {
        self.difficulty.is_none() && self.tags.is_empty()
    }

    /// Trim and de-duplicate tags, rejecting malformed filters.
    pub fn normalized(self) -> SearchResult<Self> {
        let difficulty = match self.difficulty {
            Some(d) => {
                let d = d.trim();
                if d.is_empty() {
                    return Err(SearchError::InvalidFilterCombination(
                        "difficulty must not be blank".to_string(),
                    ));
                }
                Some(d.to_string())
            }
            None => None,
        };

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags {
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(SearchError::InvalidFilterCombination(
                    "tags must not be blank".to_string(),
                ));
            }
            if tag.chars().count() > MAX_TAG_LEN {
                return Err(SearchError::InvalidFilterCombination(format!(
                    "tag '{}' is longer than {} characters",
                    tag, MAX_TAG_LEN
                )));
            }
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }

        if tags.len() > MAX_FILTER_TAGS {
            return Err(SearchError::InvalidFilterCombination(format!(
                "at most {} tags may be requested, got {}",
                MAX_FILTER_TAGS,
                tags.len()
            )));
        }

        Ok(Self { difficulty, tags })
    }

    /// Check a candidate against the filter.
    pub fn matches(&self, difficulty: Option<&str>, tags: &[String]) -> bool {
        if let Some(wanted) = &self.difficulty {
            if difficulty != Some(wanted.as_str()) {
                return false;
            }
        }
        self.tags.iter().all(|t| tags.contains(t))
    }
}

/// Split a comma-separated tag list as received in query strings.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_dedupes_and_trims() {
        let filter = SearchFilter::new(
            Some(" hard ".to_string()),
            vec!["ethics".into(), " ethics".into(), "political".into()],
        )
        .normalized()
        .unwrap();
        assert_eq!(filter.difficulty.as_deref(), Some("hard"));
        assert_eq!(filter.tags, vec!["ethics".to_string(), "political".to_string()]);
    }

    #[test]
    fn test_blank_tag_rejected() {
        let err = SearchFilter::new(None, vec!["ethics".into(), "  ".into()])
            .normalized()
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidFilterCombination(_)));
    }

    #[test]
    fn test_blank_difficulty_rejected() {
        let err = SearchFilter::new(Some("".into()), vec![]).normalized().unwrap_err();
        assert!(matches!(err, SearchError::InvalidFilterCombination(_)));
    }

    #[test]
    fn test_too_many_tags_rejected() {
        let tags = (0..40).map(|i| format!("tag{}", i)).collect();
        assert!(SearchFilter::new(None, tags).normalized().is_err());
    }

    #[test]
    fn test_matches_superset() {
        let filter = SearchFilter::new(Some("easy".into()), vec!["ethics".into()]);
        let tags = vec!["political".to_string(), "ethics".to_string()];
        assert!(filter.matches(Some("easy"), &tags));
        assert!(!filter.matches(Some("hard"), &tags));
        assert!(!filter.matches(None, &tags));
        assert!(!filter.matches(Some("easy"), &["political".to_string()]));
        assert!(SearchFilter::default().matches(None, &[]));
    }

    #[test]
    fn test_parse_tag_list() {
        assert_eq!(parse_tag_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_tag_list("").is_empty());
    }
}
