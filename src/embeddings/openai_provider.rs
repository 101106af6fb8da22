use anyhow::{anyhow, Context, Result};
use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::provider::{validate_embedding, EmbeddingProvider, HealthStatus};
use crate::config::EmbeddingsConfig;
use crate::metrics::{EMBEDDING_FAILURES, EMBEDDING_LATENCY, EMBEDDING_REQUESTS};

pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

const INITIAL_BACKOFF_MS: u64 = 200;
const MAX_BACKOFF_MS: u64 = 5_000;

/// OpenAI (or OpenAI-compatible) embedding provider
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
    batch_size: usize,
    timeout: Duration,
    max_retries: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let api_key = load_api_key(config.openai_api_key.as_deref())
            .context("Failed to load OpenAI API key")?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = &config.openai_base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        let dimension = model_dimension(&model);

        info!("Initialized OpenAI provider with model: {} ({} dims)", model, dimension);

        Ok(Self {
            client: Client::with_config(openai_config),
            model,
            dimension,
            batch_size: config.batch_size.clamp(1, 2048),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(input)
            .build()
            .context("Failed to build OpenAI request")?;

        let mut attempt = 0;
        let mut backoff = INITIAL_BACKOFF_MS;

        loop {
            let call = self.client.embeddings().create(request.clone());
            let outcome = match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(anyhow!(e).context("OpenAI API request failed")),
                Err(_) => Err(anyhow!("OpenAI API request timed out after {:?}", self.timeout)),
            };

            match outcome {
                Ok(response) => {
                    let mut data = response.data;
                    data.sort_by_key(|d| d.index);
                    return data
                        .into_iter()
                        .map(|d| validate_embedding(d.embedding, self.dimension))
                        .collect();
                }
                Err(e) if attempt >= self.max_retries => return Err(e),
                Err(e) => {
                    warn!("OpenAI request failed (attempt {}): {:#}", attempt + 1, e);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF_MS);
                    attempt += 1;
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| anyhow!("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        EMBEDDING_REQUESTS.inc();
        let start = Instant::now();

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            match self.request(batch.to_vec()).await {
                Ok(vectors) if vectors.len() == batch.len() => all.extend(vectors),
                Ok(vectors) => {
                    EMBEDDING_FAILURES.inc();
                    return Err(anyhow!(
                        "OpenAI returned {} embeddings for {} inputs",
                        vectors.len(),
                        batch.len()
                    ));
                }
                Err(e) => {
                    EMBEDDING_FAILURES.inc();
                    return Err(e);
                }
            }
            debug!("Embedded batch of {} texts", batch.len());
        }

        EMBEDDING_LATENCY.observe(start.elapsed().as_secs_f64());
        Ok(all)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        match self.embed("health check").await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) if e.to_string().contains("rate_limit") => Ok(HealthStatus::Degraded {
                reason: "Rate limited".to_string(),
            }),
            Err(e) => Ok(HealthStatus::Unhealthy {
                error: e.to_string(),
            }),
        }
    }
}

/// Embedding dimension for known OpenAI models
fn model_dimension(model_name: &str) -> usize {
    match model_name {
        "text-embedding-3-large" => 3072,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

/// Resolve the API key: explicit value, `${VAR}` reference, then OPENAI_API_KEY.
fn load_api_key(configured: Option<&str>) -> Result<String> {
    match configured {
        Some(key) if key.starts_with("${") && key.ends_with('}') => {
            let var_name = &key[2..key.len() - 1];
            std::env::var(var_name)
                .with_context(|| format!("Environment variable {} not set", var_name))
        }
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => std::env::var("OPENAI_API_KEY")
            .context("No API key configured and OPENAI_API_KEY environment variable not set"),
    }
}
