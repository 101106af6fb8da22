pub mod cli;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod questions;
pub mod search;
pub mod storage;
pub mod web;

pub use config::Config;
pub use error::{SearchError, SearchResult};
