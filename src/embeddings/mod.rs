mod fastembed_provider;
pub mod mock;
mod openai_provider;
mod provider;

pub use fastembed_provider::{FastEmbedProvider, DEFAULT_FASTEMBED_MODEL};
pub use mock::{FailingEmbedder, MockEmbedder};
pub use openai_provider::{OpenAIProvider, DEFAULT_OPENAI_MODEL};
pub use provider::{validate_embedding, EmbeddingProvider, HealthStatus};

use anyhow::Result;
use std::sync::Arc;

use crate::config::{EmbeddingProviderKind, EmbeddingsConfig};

/// Build the configured embedding provider
pub fn create_provider(config: &EmbeddingsConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderKind::OpenAI => Arc::new(OpenAIProvider::new(config)?),
        EmbeddingProviderKind::FastEmbed => Arc::new(FastEmbedProvider::new(config)?),
    };
    Ok(provider)
}
