mod lancedb;

pub use self::lancedb::{QuestionStore, VectorMatch};
