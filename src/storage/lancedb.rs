use anyhow::{Context, Result};
use arrow_array::types::Float32Type;
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SearchError;
use crate::questions::{Question, QuestionType, StoredQuestion};

const TABLE_NAME: &str = "questions";
/// Upper bound for full-table scans when count_rows fails.
const MAX_QUERY_ROWS: usize = 10_000_000;

/// Every column except the embedding
const QUESTION_COLUMNS: [&str; 7] = [
    "id",
    "text",
    "tags",
    "difficulty",
    "question_type",
    "exam_id",
    "created_at",
];

/// A vector query hit with its L2 distance
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub question: Question,
    pub distance: f32,
}

/// LanceDB table of questions and their embeddings
pub struct QuestionStore {
    db: Connection,
    db_path: PathBuf,
    dimension: usize,
}

impl QuestionStore {
    /// Create or open a store at `path` holding `dimension`-long embeddings.
    ///
    /// Fails with `DimensionMismatch` when an existing table was created with
    /// a different dimension.
    pub async fn new(path: &Path, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be positive");
        }

        let db_path = path.to_path_buf();
        let path_str = path.to_string_lossy();

        info!("Opening LanceDB at: {}", path_str);

        let db = connect(&path_str)
            .execute()
            .await
            .with_context(|| format!("Failed to connect to LanceDB at {}", path_str))?;

        let store = Self {
            db,
            db_path,
            dimension,
        };
        store.check_existing_dimension().await?;
        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self.db.table_names().execute().await?;
        Ok(table_names.iter().any(|n| n == TABLE_NAME))
    }

    async fn check_existing_dimension(&self) -> Result<()> {
        if !self.table_exists().await? {
            return Ok(());
        }

        let table = self.open_table().await?;
        let schema = table.schema().await.context("Failed to read table schema")?;
        let stored = schema
            .field_with_name("vector")
            .ok()
            .and_then(|f| match f.data_type() {
                DataType::FixedSizeList(_, size) => Some(*size as usize),
                _ => None,
            });

        match stored {
            Some(actual) if actual != self.dimension => Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual,
            }
            .into()),
            _ => Ok(()),
        }
    }

    async fn open_table(&self) -> Result<Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .with_context(|| format!("Failed to open table {}", TABLE_NAME))
    }

    /// Get or create the questions table
    async fn get_or_create_table(&self) -> Result<Table> {
        if self.table_exists().await? {
            debug!("Opening existing table: {}", TABLE_NAME);
            self.open_table().await
        } else {
            debug!("Creating new table: {}", TABLE_NAME);
            self.create_table().await
        }
    }

    async fn get_row_count_or_max(table: &Table) -> usize {
        match table.count_rows(None).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = MAX_QUERY_ROWS,
                    "Failed to count rows, using fallback limit"
                );
                MAX_QUERY_ROWS
            }
        }
    }

    async fn create_table(&self) -> Result<Table> {
        let schema = self.table_schema()?;
        let batches = RecordBatchIterator::new(vec![], Arc::new(schema));

        self.db
            .create_table(TABLE_NAME, Box::new(batches))
            .execute()
            .await
            .with_context(|| "Failed to create questions table")
    }

    fn vector_width(&self) -> Result<i32> {
        i32::try_from(self.dimension).context("Embedding dimension does not fit the table schema")
    }

    fn table_schema(&self) -> Result<Schema> {
        Ok(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            // JSON array of strings
            Field::new("tags", DataType::Utf8, false),
            Field::new("difficulty", DataType::Utf8, true),
            Field::new("question_type", DataType::Utf8, false),
            Field::new("exam_id", DataType::Utf8, true),
            // milliseconds since the epoch, UTC
            Field::new("created_at", DataType::Int64, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.vector_width()?,
                ),
                false,
            ),
        ]))
    }

    /// Insert questions. Every embedding must have the store's dimension.
    pub async fn insert_questions(&self, questions: &[StoredQuestion]) -> Result<()> {
        if questions.is_empty() {
            return Ok(());
        }

        for q in questions {
            if q.embedding.len() != self.dimension {
                return Err(SearchError::DimensionMismatch {
                    expected: self.dimension,
                    actual: q.embedding.len(),
                }
                .into());
            }
        }

        let table = self.get_or_create_table().await?;
        let schema = Arc::new(self.table_schema()?);
        let batch = self.questions_to_record_batch(questions, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .with_context(|| "Failed to insert questions")?;

        info!("Inserted {} questions into database", questions.len());
        Ok(())
    }

    fn questions_to_record_batch(
        &self,
        questions: &[StoredQuestion],
        schema: Arc<Schema>,
    ) -> Result<RecordBatch> {
        let ids: Vec<String> = questions.iter().map(|q| q.question.id.to_string()).collect();
        let texts: Vec<&str> = questions.iter().map(|q| q.question.text.as_str()).collect();
        let tags = questions
            .iter()
            .map(|q| serde_json::to_string(&q.question.tags))
            .collect::<std::result::Result<Vec<String>, _>>()
            .context("Failed to encode tags")?;
        let difficulties: Vec<Option<&str>> = questions
            .iter()
            .map(|q| q.question.difficulty.as_deref())
            .collect();
        let types: Vec<&str> = questions
            .iter()
            .map(|q| q.question.question_type.as_str())
            .collect();
        let exam_ids: Vec<Option<String>> = questions
            .iter()
            .map(|q| q.question.exam_id.map(|e| e.to_string()))
            .collect();
        let created: Vec<i64> = questions
            .iter()
            .map(|q| q.question.created_at.timestamp_millis())
            .collect();

        let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            questions
                .iter()
                .map(|q| Some(q.embedding.iter().map(|&v| Some(v)))),
            self.vector_width()?,
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(tags)),
                Arc::new(StringArray::from(difficulties)),
                Arc::new(StringArray::from(types)),
                Arc::new(StringArray::from(exam_ids)),
                Arc::new(Int64Array::from(created)),
                Arc::new(vector_array),
            ],
        )
        .with_context(|| "Failed to create RecordBatch")
    }

    /// Nearest questions to `vector` by L2 distance, nearest first.
    ///
    /// `difficulty` is applied as a prefilter.
    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        difficulty: Option<&str>,
    ) -> Result<Vec<VectorMatch>> {
        if vector.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            }
            .into());
        }
        if limit == 0 || !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let mut query = table
            .vector_search(vector.to_vec())
            .with_context(|| "Failed to create vector search query")?
            .select(Select::Columns(
                QUESTION_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ))
            .limit(limit);

        if let Some(d) = difficulty {
            query = query.only_if(format!("difficulty = '{}'", sql_quote(d)));
        }

        let results = query
            .execute()
            .await
            .with_context(|| "Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .with_context(|| "Failed to collect search results")?;

        let mut matches = Vec::new();
        for batch in &batches {
            let questions = batch_to_questions(batch)?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for (i, question) in questions.into_iter().enumerate() {
                matches.push(VectorMatch {
                    question,
                    distance: distances.value(i),
                });
            }
        }

        // batches may arrive unordered across fragments
        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!("Vector search returned {} questions", matches.len());
        Ok(matches)
    }

    /// Fetch one question without its embedding
    pub async fn get_question(&self, id: Uuid) -> Result<Option<Question>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let table = self.open_table().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::Columns(
                QUESTION_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ))
            .only_if(id_predicate(id))
            .limit(1)
            .execute()
            .await
            .with_context(|| format!("Failed to query question {}", id))?
            .try_collect()
            .await
            .with_context(|| "Failed to collect question")?;

        for batch in &batches {
            if let Some(q) = batch_to_questions(batch)?.into_iter().next() {
                return Ok(Some(q));
            }
        }
        Ok(None)
    }

    /// Fetch one question together with its embedding
    pub async fn get_stored_question(&self, id: Uuid) -> Result<Option<StoredQuestion>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let table = self.open_table().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(id_predicate(id))
            .limit(1)
            .execute()
            .await
            .with_context(|| format!("Failed to query question {}", id))?
            .try_collect()
            .await
            .with_context(|| "Failed to collect question")?;

        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let questions = batch_to_questions(batch)?;
            let vectors = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing vector column"))?;

            if let Some(question) = questions.into_iter().next() {
                let values = vectors.value(0);
                let embedding = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow::anyhow!("Vector column is not Float32"))?
                    .values()
                    .to_vec();
                return Ok(Some(StoredQuestion {
                    question,
                    embedding,
                }));
            }
        }
        Ok(None)
    }

    /// Rewrite a question row in one merge on `id`, inserting it when absent.
    /// A failed merge leaves the previous row in place.
    pub async fn replace_question(&self, stored: &StoredQuestion) -> Result<()> {
        if stored.embedding.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: stored.embedding.len(),
            }
            .into());
        }

        let table = self.get_or_create_table().await?;
        let schema = Arc::new(self.table_schema()?);
        let batch = self.questions_to_record_batch(std::slice::from_ref(stored), schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge = table.merge_insert(&["id"]);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge
            .execute(Box::new(batches))
            .await
            .with_context(|| format!("Failed to replace question {}", stored.question.id))?;

        debug!("Replaced question: {}", stored.question.id);
        Ok(())
    }

    /// Delete a question. Returns false when it did not exist.
    pub async fn delete_question(&self, id: Uuid) -> Result<bool> {
        if !self.table_exists().await? {
            return Ok(false);
        }

        let table = self.open_table().await?;
        let predicate = id_predicate(id);
        let existing = table
            .count_rows(Some(predicate.clone()))
            .await
            .with_context(|| format!("Failed to count rows for question {}", id))?;

        if existing == 0 {
            return Ok(false);
        }

        table
            .delete(&predicate)
            .await
            .with_context(|| format!("Failed to delete question {}", id))?;

        debug!("Deleted question: {}", id);
        Ok(true)
    }

    /// Delete every listed question in one write
    pub async fn delete_questions(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() || !self.table_exists().await? {
            return Ok(());
        }

        let table = self.open_table().await?;
        let predicate = ids_predicate(ids);
        table
            .delete(&predicate)
            .await
            .with_context(|| format!("Failed to delete {} questions", ids.len()))?;

        debug!("Deleted {} questions", ids.len());
        Ok(())
    }

    /// Every stored question, embeddings excluded
    pub async fn get_all_questions(&self) -> Result<Vec<Question>> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let total_rows = Self::get_row_count_or_max(&table).await;
        if total_rows == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::Columns(
                QUESTION_COLUMNS.iter().map(|c| c.to_string()).collect(),
            ))
            .limit(total_rows)
            .execute()
            .await
            .with_context(|| "Failed to query all questions")?
            .try_collect()
            .await
            .with_context(|| "Failed to collect questions")?;

        let mut questions = Vec::new();
        for batch in &batches {
            questions.extend(batch_to_questions(batch)?);
        }

        debug!("Retrieved {} questions from database", questions.len());
        Ok(questions)
    }

    pub async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .with_context(|| "Failed to count questions")
    }

    /// Drop all questions
    pub async fn clear(&self) -> Result<()> {
        if self.table_exists().await? {
            self.db
                .drop_table(TABLE_NAME)
                .await
                .with_context(|| "Failed to drop questions table")?;
        }

        info!("Cleared all questions from database");
        Ok(())
    }
}

fn sql_quote(value: &str) -> String {
    value.replace('\'', "''")
}

fn id_predicate(id: Uuid) -> String {
    format!("id = '{}'", id)
}

fn ids_predicate(ids: &[Uuid]) -> String {
    let list: Vec<String> = ids.iter().map(|id| format!("'{}'", id)).collect();
    format!("id IN ({})", list.join(", "))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

fn optional_value(column: &StringArray, i: usize) -> Option<String> {
    if column.is_null(i) {
        None
    } else {
        Some(column.value(i).to_string())
    }
}

fn batch_to_questions(batch: &RecordBatch) -> Result<Vec<Question>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let tags = string_column(batch, "tags")?;
    let difficulties = string_column(batch, "difficulty")?;
    let types = string_column(batch, "question_type")?;
    let exam_ids = string_column(batch, "exam_id")?;
    let created = batch
        .column_by_name("created_at")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing created_at column"))?;

    let mut questions = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let id = Uuid::parse_str(ids.value(i))
            .with_context(|| format!("Invalid question id: {}", ids.value(i)))?;
        let tag_list: Vec<String> = serde_json::from_str(tags.value(i))
            .with_context(|| format!("Invalid tags for question {}", id))?;
        let question_type: QuestionType = types.value(i).parse()?;
        let exam_id = optional_value(exam_ids, i)
            .map(|e| Uuid::parse_str(&e))
            .transpose()
            .with_context(|| format!("Invalid exam id for question {}", id))?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(created.value(i))
            .ok_or_else(|| anyhow::anyhow!("Invalid created_at for question {}", id))?;

        questions.push(Question {
            id,
            text: texts.value(i).to_string(),
            tags: tag_list,
            difficulty: optional_value(difficulties, i),
            question_type,
            exam_id,
            created_at,
        });
    }
    Ok(questions)
}
