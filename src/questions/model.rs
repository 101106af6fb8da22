use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of answer a question expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    MultiResponse,
    TrueFalse,
    #[default]
    ShortAnswer,
    Essay,
    Code,
    Numerical,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::MultiResponse => "multi_response",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::Essay => "essay",
            QuestionType::Code => "code",
            QuestionType::Numerical => "numerical",
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuestionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mcq" => Ok(QuestionType::Mcq),
            "multi_response" => Ok(QuestionType::MultiResponse),
            "true_false" => Ok(QuestionType::TrueFalse),
            "short_answer" => Ok(QuestionType::ShortAnswer),
            "essay" => Ok(QuestionType::Essay),
            "code" => Ok(QuestionType::Code),
            "numerical" => Ok(QuestionType::Numerical),
            other => Err(anyhow::anyhow!("Unknown question type: {}", other)),
        }
    }
}

/// A stored question, without its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub text: String,
    pub tags: Vec<String>,
    pub difficulty: Option<String>,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub exam_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn has_all_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tags.contains(t))
    }
}

/// A question row as written to the vector store
#[derive(Debug, Clone)]
pub struct StoredQuestion {
    pub question: Question,
    pub embedding: Vec<f32>,
}

/// Payload for creating a question
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewQuestion {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default, rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub exam_id: Option<Uuid>,
}

impl NewQuestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }

    pub fn with_type(mut self, question_type: QuestionType) -> Self {
        self.question_type = question_type;
        self
    }
}

/// Partial update. Tags are appended, the other fields replace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionUpdate {
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, rename = "type")]
    pub question_type: Option<QuestionType>,
}

/// Catalog listing parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuestions {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    /// Case-insensitive substring of the question text
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for ListQuestions {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            difficulty: None,
            text: None,
            limit: default_list_limit(),
            offset: 0,
        }
    }
}

fn default_list_limit() -> usize {
    20
}
