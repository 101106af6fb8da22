//! Bulk import of questions from a JSON file.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;
use tracing::info;

use super::open_state;
use crate::questions::NewQuestion;

/// Read a JSON array of questions.
pub fn read_questions(file: &Path) -> Result<Vec<NewQuestion>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let questions: Vec<NewQuestion> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of questions", file.display()))?;

    if let Some(pos) = questions.iter().position(|q| q.text.trim().is_empty()) {
        bail!("Question {} in {} has blank text", pos, file.display());
    }
    Ok(questions)
}

pub async fn run(file: &Path) -> Result<()> {
    let questions = read_questions(file)?;
    if questions.is_empty() {
        println!("No questions found in {}", file.display());
        return Ok(());
    }

    let (state, _root) = open_state().await?;
    let batch_size = state.config.embeddings.batch_size.max(1);
    let start = Instant::now();

    let pb = ProgressBar::new(questions.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] Importing: [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let mut stored = 0;
    for batch in questions.chunks(batch_size) {
        let written = state.catalog.bulk_store_questions(batch.to_vec()).await?;
        stored += written.len();
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("done");

    let elapsed = start.elapsed();
    info!(
        stored,
        elapsed_ms = elapsed.as_millis() as u64,
        "Import completed"
    );
    println!(
        "Imported {} questions in {:.2}s",
        stored,
        elapsed.as_secs_f64()
    );
    Ok(())
}
