use anyhow::{bail, Result};
use async_trait::async_trait;

/// Turns text into fixed-length vectors.
///
/// Implementations only perform the outbound call and must not write to any
/// store. Retry policy belongs to the caller unless the provider's own
/// configuration enables retries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text into a vector of `embedding_dimension()` floats
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimension of the vectors this provider produces
    fn embedding_dimension(&self) -> usize;

    /// Provider name for logging and metrics
    fn provider_name(&self) -> &'static str;

    /// Check if the provider is reachable and answering
    async fn health_check(&self) -> Result<HealthStatus>;
}

/// Health status for provider monitoring
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded { reason: String },
    Unhealthy { error: String },
}

impl HealthStatus {
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded { .. } => "degraded",
            HealthStatus::Unhealthy { .. } => "unhealthy",
        }
    }
}

/// Reject vectors of the wrong length or with non-finite components.
pub fn validate_embedding(vector: Vec<f32>, expected: usize) -> Result<Vec<f32>> {
    if vector.len() != expected {
        bail!(
            "Malformed embedding: expected {} dimensions, got {}",
            expected,
            vector.len()
        );
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        bail!("Malformed embedding: non-finite value at index {}", pos);
    }
    Ok(vector)
}
