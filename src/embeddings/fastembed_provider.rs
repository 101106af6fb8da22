use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::provider::{validate_embedding, EmbeddingProvider, HealthStatus};
use crate::config::EmbeddingsConfig;
use crate::metrics::{EMBEDDING_FAILURES, EMBEDDING_LATENCY, EMBEDDING_REQUESTS};

pub const DEFAULT_FASTEMBED_MODEL: &str = "nomic-embed-text-v1.5";

/// Local embedding provider backed by a fastembed ONNX model
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    batch_size: usize,
}

impl FastEmbedProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_FASTEMBED_MODEL.to_string());
        let model_type = parse_model_name(&model_name);

        info!("Loading embedding model: {}", model_name);

        let model = TextEmbedding::try_new(
            InitOptions::new(model_type).with_show_download_progress(true),
        )
        .with_context(|| format!("Failed to initialize embedding model: {}", model_name))?;

        info!("Embedding model loaded successfully");

        Ok(Self {
            model: Arc::new(model),
            model_name,
            batch_size: config.batch_size.max(1),
        })
    }
}

fn parse_model_name(name: &str) -> EmbeddingModel {
    match name {
        "nomic-embed-text-v1.5" | "nomic-embed-text" | "nomic-ai/nomic-embed-text-v1.5" => {
            EmbeddingModel::NomicEmbedTextV15
        }
        "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
        "bge-small-en-v1.5" | "bge-small" | "BAAI/bge-small-en-v1.5" => {
            EmbeddingModel::BGESmallENV15
        }
        "bge-base-en-v1.5" | "bge-base" | "BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        _ => {
            warn!("Unknown model '{}', falling back to nomic-embed-text-v1.5", name);
            EmbeddingModel::NomicEmbedTextV15
        }
    }
}

fn model_dimension(model_name: &str) -> usize {
    match model_name {
        name if name.contains("bge-small") => 384,
        name if name.contains("MiniLM") || name.contains("minilm") => 384,
        _ => 768,
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("No embedding generated for query"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        EMBEDDING_REQUESTS.inc();
        let start = Instant::now();

        // fastembed is synchronous
        let model = self.model.clone();
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        let result = tokio::task::spawn_blocking(move || {
            let mut embeddings = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(batch_size) {
                let batch: Vec<&str> = chunk.iter().map(|s| s.as_str()).collect();
                let batch_embeddings = model
                    .embed(batch, None)
                    .with_context(|| "Failed to generate embeddings")?;
                embeddings.extend(batch_embeddings);
            }
            Ok::<Vec<Vec<f32>>, anyhow::Error>(embeddings)
        })
        .await
        .context("FastEmbed processing task failed")
        .and_then(|inner| inner)
        .and_then(|vectors| {
            let dimension = self.embedding_dimension();
            vectors
                .into_iter()
                .map(|v| validate_embedding(v, dimension))
                .collect::<Result<Vec<_>>>()
        });

        match result {
            Ok(vectors) => {
                EMBEDDING_LATENCY.observe(start.elapsed().as_secs_f64());
                Ok(vectors)
            }
            Err(e) => {
                EMBEDDING_FAILURES.inc();
                Err(e)
            }
        }
    }

    fn embedding_dimension(&self) -> usize {
        model_dimension(&self.model_name)
    }

    fn provider_name(&self) -> &'static str {
        "fastembed"
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        match self.embed("health check").await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy {
                error: e.to_string(),
            }),
        }
    }
}
