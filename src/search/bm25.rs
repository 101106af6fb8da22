//! BM25 keyword search over question text using Tantivy.
//!
//! Question text goes through the `question_en` analyzer (simple tokenizer,
//! long-token removal, lowercasing, English stop words, Porter stemming), so
//! "corruption" and "corrupt" share a term. Difficulty and tags are raw
//! keyword fields used only for filtering.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::RwLock;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value as _, STORED, STRING,
};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, StopWordFilter,
    TextAnalyzer, TokenStream,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::traits::{LexicalIndexWriter, LexicalSearchIndex};
use super::types::{LexicalHit, SearchFilter};
use crate::questions::Question;

/// BM25 index directory name within the lexical data dir
const BM25_INDEX_DIR: &str = "bm25.index";

const QUESTION_ANALYZER: &str = "question_en";

const FIELD_ID: &str = "id";
const FIELD_TEXT: &str = "text";
const FIELD_TAGS: &str = "tags";
const FIELD_DIFFICULTY: &str = "difficulty";

const ENGLISH_STOP_WORDS: [&str; 33] = [
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

fn question_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(
            ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()),
        ))
        .filter(Stemmer::new(Language::English))
        .build()
}

/// Fields of the question index.
#[derive(Clone)]
pub struct Bm25Schema {
    schema: Schema,
    id: Field,
    text: Field,
    tags: Field,
    difficulty: Field,
}

impl Bm25Schema {
    pub fn new() -> Self {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(QUESTION_ANALYZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id = schema_builder.add_text_field(FIELD_ID, STRING | STORED);
        let text = schema_builder.add_text_field(FIELD_TEXT, text_options);
        let tags = schema_builder.add_text_field(FIELD_TAGS, STRING | STORED);
        let difficulty = schema_builder.add_text_field(FIELD_DIFFICULTY, STRING | STORED);

        Self {
            schema: schema_builder.build(),
            id,
            text,
            tags,
            difficulty,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl Default for Bm25Schema {
    fn default() -> Self {
        Self::new()
    }
}

/// BM25 question index using Tantivy.
pub struct Bm25Index {
    index: Index,
    schema: Bm25Schema,
    writer: IndexWriter,
    reader: IndexReader,
}

impl Bm25Index {
    /// Create or open an on-disk index under `path`.
    pub fn new(path: &Path) -> Result<Self> {
        let index_path = path.join(BM25_INDEX_DIR);
        let schema = Bm25Schema::new();

        let index = if index_path.exists() {
            info!("Opening existing BM25 index at {:?}", index_path);
            Index::open_in_dir(&index_path)
                .with_context(|| format!("Failed to open BM25 index at {:?}", index_path))?
        } else {
            info!("Creating new BM25 index at {:?}", index_path);
            std::fs::create_dir_all(&index_path).with_context(|| {
                format!("Failed to create BM25 index directory {:?}", index_path)
            })?;
            Index::create_in_dir(&index_path, schema.schema().clone())
                .with_context(|| format!("Failed to create BM25 index at {:?}", index_path))?
        };

        Self::from_index(index, schema)
    }

    /// Create an index that lives only in memory.
    pub fn in_memory() -> Result<Self> {
        let schema = Bm25Schema::new();
        let index = Index::create_in_ram(schema.schema().clone());
        Self::from_index(index, schema)
    }

    fn from_index(index: Index, schema: Bm25Schema) -> Result<Self> {
        // Analyzers are not persisted with the index
        index
            .tokenizers()
            .register(QUESTION_ANALYZER, question_analyzer());

        // 50MB writer heap
        let writer = index
            .writer(50_000_000)
            .with_context(|| "Failed to create index writer")?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .with_context(|| "Failed to create index reader")?;

        Ok(Self {
            index,
            schema,
            writer,
            reader,
        })
    }

    /// Add or replace questions. Changes are visible after [`commit`](Self::commit).
    pub fn upsert_questions(&mut self, questions: &[Question]) -> Result<()> {
        for question in questions {
            let id = question.id.to_string();
            self.writer
                .delete_term(Term::from_field_text(self.schema.id, &id));

            let mut doc = TantivyDocument::default();
            doc.add_text(self.schema.id, &id);
            doc.add_text(self.schema.text, &question.text);
            for tag in &question.tags {
                doc.add_text(self.schema.tags, tag);
            }
            if let Some(difficulty) = &question.difficulty {
                doc.add_text(self.schema.difficulty, difficulty);
            }
            self.writer.add_document(doc)?;
        }

        debug!("Upserted {} questions into BM25 index", questions.len());
        Ok(())
    }

    pub fn delete_question(&mut self, id: Uuid) {
        self.writer
            .delete_term(Term::from_field_text(self.schema.id, &id.to_string()));
        debug!("Deleted question from BM25 index: {}", id);
    }

    /// Commit pending changes and reload the reader.
    pub fn commit(&mut self) -> Result<()> {
        self.writer
            .commit()
            .with_context(|| "Failed to commit BM25 index changes")?;

        self.reader
            .reload()
            .with_context(|| "Failed to reload index reader")?;

        debug!("BM25 index committed");
        Ok(())
    }

    /// Drop changes made since the last commit.
    pub fn rollback(&mut self) {
        if let Err(e) = self.writer.rollback() {
            warn!(error = %e, "Failed to roll back BM25 index changes");
        }
    }

    pub fn clear(&mut self) -> Result<()> {
        self.writer.delete_all_documents()?;
        self.commit()?;
        info!("BM25 index cleared");
        Ok(())
    }

    /// Number of committed documents
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Analyzed terms of `query`, de-duplicated. Query syntax has no meaning
    /// here: operators, quotes and brackets are just text.
    fn text_terms(&self, query: &str) -> Result<Vec<Term>> {
        let mut analyzer = self
            .index
            .tokenizers()
            .get(QUESTION_ANALYZER)
            .ok_or_else(|| anyhow::anyhow!("Analyzer '{}' is not registered", QUESTION_ANALYZER))?;

        let mut terms = Vec::new();
        let mut stream = analyzer.token_stream(query);
        stream.process(&mut |token| {
            terms.push(Term::from_field_text(self.schema.text, &token.text));
        });
        terms.sort();
        terms.dedup();
        Ok(terms)
    }

    /// Any-term-may-match query over `text`, or `None` when nothing survives
    /// analysis (blank or stop-word-only input).
    fn text_query(&self, query: &str) -> Result<Option<Box<dyn Query>>> {
        let terms = self.text_terms(query)?;
        if terms.is_empty() {
            return Ok(None);
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                let q: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, q)
            })
            .collect();
        Ok(Some(Box::new(BooleanQuery::new(clauses))))
    }

    fn build_query(&self, query: &str, filter: &SearchFilter) -> Result<Option<Box<dyn Query>>> {
        let Some(text_query) = self.text_query(query)? else {
            return Ok(None);
        };
        if filter.is_empty() {
            return Ok(Some(text_query));
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query)];

        // Filters restrict the match set but add nothing to the score
        let mut must_term = |field: Field, value: &str| {
            let term = TermQuery::new(
                Term::from_field_text(field, value),
                IndexRecordOption::Basic,
            );
            clauses.push((
                Occur::Must,
                Box::new(ConstScoreQuery::new(Box::new(term), 0.0)),
            ));
        };

        if let Some(difficulty) = &filter.difficulty {
            must_term(self.schema.difficulty, difficulty);
        }
        for tag in &filter.tags {
            must_term(self.schema.tags, tag);
        }

        Ok(Some(Box::new(BooleanQuery::new(clauses))))
    }

    /// Matches for `query` passing `filter`, highest BM25 score first.
    pub fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let Some(parsed_query) = self.build_query(query, filter)? else {
            return Ok(Vec::new());
        };
        let searcher = self.reader.searcher();

        let top_docs = searcher
            .search(&parsed_query, &TopDocs::with_limit(limit))
            .with_context(|| "Failed to execute BM25 search")?;

        let mut results = Vec::with_capacity(top_docs.len());

        for (score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher
                .doc(doc_address)
                .with_context(|| "Failed to retrieve document")?;

            let raw_id = retrieved_doc
                .get_first(self.schema.id)
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("Indexed document has no id"))?;
            let id = Uuid::parse_str(raw_id)
                .with_context(|| format!("Invalid question id in BM25 index: {}", raw_id))?;

            let text = retrieved_doc
                .get_first(self.schema.text)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            let tags = retrieved_doc
                .get_all(self.schema.tags)
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect();

            results.push(LexicalHit {
                id,
                text,
                tags,
                rank: score,
            });
        }

        debug!("BM25 search returned {} results", results.len());
        Ok(results)
    }

    /// Check if an index exists at the given path.
    pub fn exists(path: &Path) -> bool {
        path.join(BM25_INDEX_DIR).exists()
    }
}

/// Thread-safe wrapper around `Bm25Index` for use in async contexts.
pub struct Bm25Search {
    index: RwLock<Bm25Index>,
}

impl Bm25Search {
    /// Open or create an on-disk index under `path`.
    pub fn new(path: &Path) -> Result<Self> {
        Ok(Self::from(Bm25Index::new(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::from(Bm25Index::in_memory()?))
    }

    /// Write access for maintenance. A poisoned lock is recovered.
    pub fn index_mut(&self) -> std::sync::RwLockWriteGuard<'_, Bm25Index> {
        self.index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read access. A poisoned lock is recovered.
    pub fn index(&self) -> std::sync::RwLockReadGuard<'_, Bm25Index> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Upsert and commit in one step. Pending changes are rolled back on failure.
    pub fn upsert_and_commit(&self, questions: &[Question]) -> Result<()> {
        self.write_committed(|index| index.upsert_questions(questions))
    }

    pub fn delete_and_commit(&self, id: Uuid) -> Result<()> {
        self.write_committed(|index| {
            index.delete_question(id);
            Ok(())
        })
    }

    /// Replace the whole index content with `questions`.
    pub fn rebuild(&self, questions: &[Question]) -> Result<()> {
        self.write_committed(|index| {
            index.writer.delete_all_documents()?;
            index.upsert_questions(questions)
        })?;
        info!("Rebuilt BM25 index with {} questions", questions.len());
        Ok(())
    }

    fn write_committed<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Bm25Index) -> Result<()>,
    {
        let mut index = self.index_mut();
        let result = change(&mut *index).and_then(|_| index.commit());
        if result.is_err() {
            index.rollback();
        }
        result
    }

    pub fn num_docs(&self) -> u64 {
        self.index().num_docs()
    }

    pub fn exists(path: &Path) -> bool {
        Bm25Index::exists(path)
    }
}

impl From<Bm25Index> for Bm25Search {
    fn from(index: Bm25Index) -> Self {
        Self {
            index: RwLock::new(index),
        }
    }
}

#[async_trait]
impl LexicalIndexWriter for Bm25Search {
    fn upsert_and_commit(&self, questions: &[Question]) -> Result<()> {
        Bm25Search::upsert_and_commit(self, questions)
    }

    fn delete_and_commit(&self, id: Uuid) -> Result<()> {
        Bm25Search::delete_and_commit(self, id)
    }

    fn rebuild(&self, questions: &[Question]) -> Result<()> {
        Bm25Search::rebuild(self, questions)
    }

    fn num_docs(&self) -> u64 {
        Bm25Search::num_docs(self)
    }
}

impl LexicalSearchIndex for Bm25Search {
    async fn search_text(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        let start = std::time::Instant::now();
        let results = self.index().search(query, filter, limit)?;
        let elapsed = start.elapsed();
        debug!(
            search_type = "bm25",
            query = query,
            results = results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "BM25 search completed"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::QuestionType;
    use chrono::Utc;
    use tempfile::tempdir;

    fn question(text: &str, tags: &[&str], difficulty: Option<&str>) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: text.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            difficulty: difficulty.map(str::to_string),
            question_type: QuestionType::Essay,
            exam_id: None,
            created_at: Utc::now(),
        }
    }

    fn sample_index() -> (Bm25Index, Vec<Question>) {
        let mut index = Bm25Index::in_memory().unwrap();
        let questions = vec![
            question(
                "To what extent can politics be considered a corrupt enterprise?",
                &["political", "ethics", "history"],
                Some("hard"),
            ),
            question(
                "Critically examine whether politics must always involve manipulation and corruption.",
                &["political", "ethics", "leadership"],
                Some("medium"),
            ),
            question(
                "Who is the most influential rapper right now?",
                &["music", "contemporary"],
                Some("easy"),
            ),
        ];
        index.upsert_questions(&questions).unwrap();
        index.commit().unwrap();
        (index, questions)
    }

    #[test]
    fn test_bm25_index_creation() {
        let dir = tempdir().unwrap();
        assert!(Bm25Index::new(dir.path()).is_ok());
        assert!(Bm25Index::exists(dir.path()));
    }

    #[test]
    fn test_stemming_matches_inflections() {
        let (index, questions) = sample_index();
        let results = index.search("corrupt", &SearchFilter::default(), 10).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].rank >= results[1].rank);

        let ids: Vec<Uuid> = results.iter().map(|r| r.id).collect();
        assert!(ids.contains(&questions[0].id));
        assert!(ids.contains(&questions[1].id));
    }

    #[test]
    fn test_any_term_may_match() {
        let (index, _) = sample_index();
        let results = index
            .search("rapper enterprise", &SearchFilter::default(), 10)
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_difficulty_filter() {
        let (index, questions) = sample_index();
        let filter = SearchFilter::new(Some("hard".into()), vec![]);
        let results = index.search("politics", &filter, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, questions[0].id);
    }

    #[test]
    fn test_tag_filter_requires_all_tags() {
        let (index, questions) = sample_index();
        let filter = SearchFilter::new(None, vec!["ethics".into(), "leadership".into()]);
        let results = index.search("politics", &filter, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, questions[1].id);
        assert_eq!(results[0].tags, questions[1].tags);
    }

    #[test]
    fn test_filters_do_not_change_rank() {
        let (index, _) = sample_index();
        let plain = index.search("corruption", &SearchFilter::default(), 10).unwrap();
        let filtered = index
            .search("corruption", &SearchFilter::new(None, vec!["political".into()]), 10)
            .unwrap();
        assert_eq!(plain.len(), filtered.len());
        for (a, b) in plain.iter().zip(&filtered) {
            assert_eq!(a.id, b.id);
            assert!((a.rank - b.rank).abs() < 1e-5);
        }
    }

    #[test]
    fn test_empty_and_stop_word_queries() {
        let (index, _) = sample_index();
        assert!(index.search("", &SearchFilter::default(), 10).unwrap().is_empty());
        assert!(index.search("   ", &SearchFilter::default(), 10).unwrap().is_empty());
        assert!(index.search("the", &SearchFilter::default(), 10).unwrap().is_empty());
        assert!(index.search("xylophone", &SearchFilter::default(), 10).unwrap().is_empty());
    }

    #[test]
    fn test_query_syntax_is_tolerated() {
        let (index, _) = sample_index();
        let results = index
            .search("politics: (corrupt", &SearchFilter::default(), 10)
            .unwrap();
        assert!(!results.is_empty());
    }

    #[test]
    fn test_operator_words_are_plain_text() {
        let (index, _) = sample_index();
        let filter = SearchFilter::default();

        for query in [
            "politics AND",
            "politics IN game",
            "Explain IN detail",
            "is it <fair>",
            "Is a > b fair?",
            "x = y OR corruption",
            "field:[a TO b]",
            "\"unbalanced quote",
        ] {
            assert!(index.search(query, &filter, 10).is_ok(), "{}", query);
        }

        // Operator words are stop words once lowercased
        assert!(index.search("NOT", &filter, 10).unwrap().is_empty());
        assert!(index.search("AND OR NOT", &filter, 10).unwrap().is_empty());

        let hits = index.search("politics AND", &filter, 10).unwrap();
        assert_eq!(hits.len(), 2);
        let hits = index.search("Is a > b corrupt?", &filter, 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_upsert_replaces_document() {
        let (mut index, mut questions) = sample_index();
        questions[2].text = "Name an influential jazz musician.".to_string();
        index.upsert_questions(&questions[2..]).unwrap();
        index.commit().unwrap();

        assert_eq!(index.num_docs(), 3);
        assert!(index.search("rapper", &SearchFilter::default(), 10).unwrap().is_empty());
        assert_eq!(index.search("jazz", &SearchFilter::default(), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_and_clear() {
        let (mut index, questions) = sample_index();
        index.delete_question(questions[0].id);
        index.commit().unwrap();
        assert_eq!(index.num_docs(), 2);

        index.clear().unwrap();
        assert_eq!(index.num_docs(), 0);
        assert!(index.search("corruption", &SearchFilter::default(), 10).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempdir().unwrap();
        let q = question("Discuss the moral implications of calling politics a dirty game.", &["ethics"], None);
        {
            let search = Bm25Search::new(dir.path()).unwrap();
            search.upsert_and_commit(std::slice::from_ref(&q)).unwrap();
        }

        let reopened = Bm25Search::new(dir.path()).unwrap();
        assert_eq!(reopened.num_docs(), 1);
        let results = reopened.index().search("moral", &SearchFilter::default(), 5).unwrap();
        assert_eq!(results[0].id, q.id);
    }

    #[tokio::test]
    async fn test_search_trait() {
        let (index, _) = sample_index();
        let search = Bm25Search::from(index);
        let results = search
            .search_text("influential", &SearchFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }
}
