//! Question catalog: the write path that keeps the vector store and the
//! full-text index in sync.

use chrono::{SubsecRound, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::model::{ListQuestions, NewQuestion, Question, QuestionUpdate, StoredQuestion};
use crate::embeddings::EmbeddingProvider;
use crate::error::{SearchError, SearchResult};
use crate::metrics::STORED_QUESTIONS;
use crate::search::LexicalIndexWriter;
use crate::storage::QuestionStore;

const MAX_TAG_LEN: usize = 64;
const MAX_TAGS: usize = 32;
const MAX_LIST_LIMIT: usize = 500;

pub struct QuestionCatalog {
    store: Arc<QuestionStore>,
    lexical: Arc<dyn LexicalIndexWriter>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl QuestionCatalog {
    pub fn new(
        store: Arc<QuestionStore>,
        lexical: Arc<dyn LexicalIndexWriter>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            lexical,
            embedder,
        }
    }

    pub fn store(&self) -> &Arc<QuestionStore> {
        &self.store
    }

    pub fn lexical(&self) -> &Arc<dyn LexicalIndexWriter> {
        &self.lexical
    }

    /// Validate, embed, and persist one question.
    pub async fn store_question(&self, new: NewQuestion) -> SearchResult<Question> {
        let question = prepare(new)?;

        let embedding = self
            .embedder
            .embed(&question.text)
            .await
            .map_err(|e| SearchError::EmbeddingUnavailable(format!("{:#}", e)))?;

        let stored = StoredQuestion {
            question,
            embedding,
        };
        self.store
            .insert_questions(std::slice::from_ref(&stored))
            .await
            .map_err(SearchError::storage)?;
        if let Err(e) = self
            .lexical
            .upsert_and_commit(std::slice::from_ref(&stored.question))
        {
            self.undo_insert(&[stored.question.id]).await;
            return Err(SearchError::index(e));
        }
        self.refresh_gauge().await;

        info!(id = %stored.question.id, "Stored question");
        Ok(stored.question)
    }

    /// Store many questions. Nothing is written unless every item is valid.
    pub async fn bulk_store_questions(
        &self,
        items: Vec<NewQuestion>,
    ) -> SearchResult<Vec<Question>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let questions = items
            .into_iter()
            .enumerate()
            .map(|(i, new)| {
                prepare(new).map_err(|e| match e {
                    SearchError::InvalidRequest(msg) => {
                        SearchError::InvalidRequest(format!("item {}: {}", i, msg))
                    }
                    other => other,
                })
            })
            .collect::<SearchResult<Vec<Question>>>()?;

        let texts: Vec<String> = questions.iter().map(|q| q.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| SearchError::EmbeddingUnavailable(format!("{:#}", e)))?;

        if embeddings.len() != questions.len() {
            return Err(SearchError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                questions.len(),
                embeddings.len()
            )));
        }

        let stored: Vec<StoredQuestion> = questions
            .into_iter()
            .zip(embeddings)
            .map(|(question, embedding)| StoredQuestion {
                question,
                embedding,
            })
            .collect();

        self.store
            .insert_questions(&stored)
            .await
            .map_err(SearchError::storage)?;

        let questions: Vec<Question> = stored.into_iter().map(|s| s.question).collect();
        if let Err(e) = self.lexical.upsert_and_commit(&questions) {
            let ids: Vec<Uuid> = questions.iter().map(|q| q.id).collect();
            self.undo_insert(&ids).await;
            return Err(SearchError::index(e));
        }
        self.refresh_gauge().await;

        info!(count = questions.len(), "Stored question batch");
        Ok(questions)
    }

    pub async fn get_question(&self, id: Uuid) -> SearchResult<Question> {
        self.store
            .get_question(id)
            .await
            .map_err(SearchError::storage)?
            .ok_or_else(|| not_found(id))
    }

    /// Questions matching every given criterion, oldest first.
    pub async fn list_questions(&self, params: ListQuestions) -> SearchResult<Vec<Question>> {
        if params.limit == 0 || params.limit > MAX_LIST_LIMIT {
            return Err(SearchError::InvalidRequest(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIST_LIMIT, params.limit
            )));
        }

        let needle = params
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        let mut questions: Vec<Question> = self
            .store
            .get_all_questions()
            .await
            .map_err(SearchError::storage)?
            .into_iter()
            .filter(|q| q.has_all_tags(&params.tags))
            .filter(|q| match &params.difficulty {
                Some(d) => q.difficulty.as_ref() == Some(d),
                None => true,
            })
            .filter(|q| match &needle {
                Some(n) => q.text.to_lowercase().contains(n.as_str()),
                None => true,
            })
            .collect();

        questions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(questions
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .collect())
    }

    /// Apply a partial update. The stored embedding is kept.
    pub async fn update_question(
        &self,
        id: Uuid,
        update: QuestionUpdate,
    ) -> SearchResult<Question> {
        let previous = self
            .store
            .get_stored_question(id)
            .await
            .map_err(SearchError::storage)?
            .ok_or_else(|| not_found(id))?;
        let mut stored = previous.clone();

        if let Some(difficulty) = update.difficulty {
            stored.question.difficulty = normalize_difficulty(Some(difficulty))?;
        }
        if let Some(tags) = update.tags {
            let mut merged = stored.question.tags.clone();
            merged.extend(tags);
            stored.question.tags = normalize_tags(merged)?;
        }
        if let Some(question_type) = update.question_type {
            stored.question.question_type = question_type;
        }

        self.store
            .replace_question(&stored)
            .await
            .map_err(SearchError::storage)?;
        if let Err(e) = self
            .lexical
            .upsert_and_commit(std::slice::from_ref(&stored.question))
        {
            if let Err(restore) = self.store.replace_question(&previous).await {
                error!(
                    id = %id,
                    error = %restore,
                    "Store and keyword index disagree on question; run 'examsearch reindex'"
                );
            }
            return Err(SearchError::index(e));
        }

        debug!(id = %id, "Updated question");
        Ok(stored.question)
    }

    /// Remove a question. Returns false when it did not exist.
    pub async fn delete_question(&self, id: Uuid) -> SearchResult<bool> {
        let deleted = self
            .store
            .delete_question(id)
            .await
            .map_err(SearchError::storage)?;

        if deleted {
            if let Err(e) = self.lexical.delete_and_commit(id) {
                error!(
                    id = %id,
                    error = %e,
                    "Deleted question is still in the keyword index; run 'examsearch reindex'"
                );
                return Err(SearchError::index(e));
            }
            self.refresh_gauge().await;
            info!(id = %id, "Deleted question");
        }
        Ok(deleted)
    }

    pub async fn count(&self) -> SearchResult<usize> {
        self.store.count().await.map_err(SearchError::storage)
    }

    /// Rebuild the full-text index from the store. Returns the number indexed.
    pub async fn reindex(&self) -> SearchResult<usize> {
        let questions = self
            .store
            .get_all_questions()
            .await
            .map_err(SearchError::storage)?;
        self.lexical
            .rebuild(&questions)
            .map_err(SearchError::index)?;
        self.refresh_gauge().await;
        Ok(questions.len())
    }

    /// Remove rows whose index write failed, so both sides stay in step.
    async fn undo_insert(&self, ids: &[Uuid]) {
        match self.store.delete_questions(ids).await {
            Ok(()) => warn!(count = ids.len(), "Rolled back stored questions after index failure"),
            Err(e) => error!(
                count = ids.len(),
                error = %e,
                "Questions stored without keyword index entries; run 'examsearch reindex'"
            ),
        }
    }

    async fn refresh_gauge(&self) {
        match self.store.count().await {
            Ok(n) => STORED_QUESTIONS.set(n as f64),
            Err(e) => warn!(error = %e, "Failed to refresh stored question count"),
        }
    }
}

fn not_found(id: Uuid) -> SearchError {
    SearchError::NotFound(format!("question {}", id))
}

/// Turn a request payload into a question with a fresh id
fn prepare(new: NewQuestion) -> SearchResult<Question> {
    let text = new.text.trim();
    if text.is_empty() {
        return Err(SearchError::InvalidRequest(
            "question text must not be blank".to_string(),
        ));
    }

    Ok(Question {
        id: Uuid::new_v4(),
        text: text.to_string(),
        tags: normalize_tags(new.tags)?,
        difficulty: normalize_difficulty(new.difficulty)?,
        question_type: new.question_type,
        exam_id: new.exam_id,
        // the store keeps milliseconds
        created_at: Utc::now().trunc_subsecs(3),
    })
}

fn normalize_difficulty(difficulty: Option<String>) -> SearchResult<Option<String>> {
    match difficulty {
        Some(d) if d.trim().is_empty() => Err(SearchError::InvalidRequest(
            "difficulty must not be blank".to_string(),
        )),
        Some(d) => Ok(Some(d.trim().to_string())),
        None => Ok(None),
    }
}

/// Trim, drop duplicates, keep first-seen order
fn normalize_tags(tags: Vec<String>) -> SearchResult<Vec<String>> {
    let mut seen = HashSet::with_capacity(tags.len());
    let mut out = Vec::with_capacity(tags.len());

    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(SearchError::InvalidRequest("tags must not be blank".to_string()));
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(SearchError::InvalidRequest(format!(
                "tag '{}' is longer than {} characters",
                tag, MAX_TAG_LEN
            )));
        }
        if seen.insert(tag.to_string()) {
            out.push(tag.to_string());
        }
    }

    if out.len() > MAX_TAGS {
        return Err(SearchError::InvalidRequest(format!(
            "a question may carry at most {} tags",
            MAX_TAGS
        )));
    }
    Ok(out)
}
