mod catalog;
mod model;

pub use catalog::QuestionCatalog;
pub use model::{
    ListQuestions, NewQuestion, Question, QuestionType, QuestionUpdate, StoredQuestion,
};
