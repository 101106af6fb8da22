use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use examsearch::embeddings::{EmbeddingProvider, FailingEmbedder, MockEmbedder};
use examsearch::questions::{NewQuestion, Question, QuestionType};
use examsearch::search::Bm25Search;
use examsearch::storage::QuestionStore;
use examsearch::web::AppState;
use examsearch::Config;

pub const TEST_DIMENSION: usize = 256;

/// The catalog used by the search tests: one music question and six on
/// politics and ethics.
pub fn exam_questions() -> Vec<NewQuestion> {
    vec![
        NewQuestion::new("Who is the most influential rapper right now?")
            .with_tags(["music", "contemporary", "poetry"])
            .with_type(QuestionType::ShortAnswer),
        NewQuestion::new("Do you agree that politics is a dirty game? Explain your view.")
            .with_tags(["political", "ethics", "governance", "society"])
            .with_type(QuestionType::Essay),
        NewQuestion::new("To what extent can politics be considered a corrupt enterprise?")
            .with_tags(["political", "ethics", "governance", "history"])
            .with_type(QuestionType::Essay),
        NewQuestion::new("Is the phrase 'politics is a dirty game' justified in today's world?")
            .with_tags(["political", "philosophy", "global", "media"])
            .with_type(QuestionType::Essay),
        NewQuestion::new(
            "Critically examine whether politics must always involve manipulation and corruption.",
        )
        .with_tags(["political", "ethics", "critical-thinking", "leadership"])
        .with_type(QuestionType::Essay),
        NewQuestion::new("Discuss the moral implications of calling politics a dirty game.")
            .with_tags(["political", "ethics", "philosophy", "society"])
            .with_type(QuestionType::Essay),
        NewQuestion::new("Is it fair to say that politics and morality cannot coexist?")
            .with_tags(["political", "ethics", "philosophy", "leadership"])
            .with_type(QuestionType::Essay),
    ]
}

pub struct TestHarness {
    pub temp_dir: TempDir,
    pub store: Arc<QuestionStore>,
    pub lexical: Arc<Bm25Search>,
    pub state: AppState,
}

impl TestHarness {
    /// Empty store and index in a temp dir, embedding with `MockEmbedder`.
    pub async fn new() -> Result<Self> {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let store = Arc::new(
            QuestionStore::new(&config.db_path(temp_dir.path()), TEST_DIMENSION).await?,
        );
        let lexical = Arc::new(Bm25Search::new(&config.bm25_path(temp_dir.path()))?);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder::new(TEST_DIMENSION));
        let state = AppState::from_parts(config, embedder, store.clone(), lexical.clone())?;

        Ok(Self {
            temp_dir,
            store,
            lexical,
            state,
        })
    }

    /// Harness preloaded with [`exam_questions`].
    pub async fn seeded() -> Result<(Self, Vec<Question>)> {
        let harness = Self::new().await?;
        let stored = harness
            .state
            .catalog
            .bulk_store_questions(exam_questions())
            .await?;
        Ok((harness, stored))
    }

    /// State over the same store and index whose embedder always fails.
    pub fn with_failing_embedder(&self, config: Config) -> Result<AppState> {
        AppState::from_parts(
            config,
            Arc::new(FailingEmbedder::new(TEST_DIMENSION)),
            self.store.clone(),
            self.lexical.clone(),
        )
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}
