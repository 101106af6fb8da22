use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".examsearch";
const CONFIG_FILE: &str = "config.toml";

/// Tolerance when checking that fusion weights sum to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Embedding provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Remote OpenAI (or OpenAI-compatible) embeddings API
    #[default]
    OpenAI,
    /// Local ONNX model through fastembed
    FastEmbed,
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::FastEmbed => write!(f, "fastembed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Model name; `None` picks the provider's default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Batch size for bulk embedding
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// API key, or a `${VAR}` reference. Falls back to OPENAI_API_KEY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,

    /// Base URL for OpenAI-compatible endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_base_url: Option<String>,

    /// Per-request timeout for remote providers
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry attempts for remote providers (0 = fail on first error)
    #[serde(default)]
    pub max_retries: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: None,
            batch_size: default_batch_size(),
            openai_api_key: None,
            openai_base_url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_batch_size() -> usize {
    32
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the LanceDB database (relative to .examsearch/)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory holding the BM25 index (relative to .examsearch/)
    #[serde(default = "default_bm25_dir")]
    pub bm25_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bm25_dir: default_bm25_dir(),
        }
    }
}

fn default_db_path() -> String {
    "questions.lance".to_string()
}

fn default_bm25_dir() -> String {
    "lexical".to_string()
}

/// How lexical and semantic scores are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Min-max normalize each branch, invert distance, weighted sum
    #[default]
    MinMax,
    /// Weighted reciprocal rank fusion
    Rrf,
}

impl std::fmt::Display for FusionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FusionStrategy::MinMax => write!(f, "min_max"),
            FusionStrategy::Rrf => write!(f, "rrf"),
        }
    }
}

/// What `hybrid_search` does when the semantic branch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingFallback {
    /// Fuse lexical hits alone and flag the response as degraded
    #[default]
    Lexical,
    /// Propagate the semantic failure to the caller
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Weight of the normalized lexical score
    #[serde(default = "default_text_weight")]
    pub text_weight: f32,

    /// Weight of the normalized semantic score
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    #[serde(default)]
    pub fusion: FusionStrategy,

    /// RRF k constant (only used with `fusion = "rrf"`)
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Branch pool = max(top_n * pool_multiplier, min_pool)
    #[serde(default = "default_pool_multiplier")]
    pub pool_multiplier: usize,

    #[serde(default = "default_min_pool")]
    pub min_pool: usize,

    #[serde(default = "default_top_n")]
    pub default_top_n: usize,

    #[serde(default = "default_max_top_n")]
    pub max_top_n: usize,

    /// Result cap for standalone keyword search
    #[serde(default = "default_keyword_limit")]
    pub keyword_limit: usize,

    #[serde(default)]
    pub embedding_fallback: EmbeddingFallback,

    /// Apply difficulty/tag filters to the semantic branch too
    #[serde(default = "default_semantic_filters")]
    pub semantic_filters: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            text_weight: default_text_weight(),
            semantic_weight: default_semantic_weight(),
            fusion: FusionStrategy::default(),
            rrf_k: default_rrf_k(),
            pool_multiplier: default_pool_multiplier(),
            min_pool: default_min_pool(),
            default_top_n: default_top_n(),
            max_top_n: default_max_top_n(),
            keyword_limit: default_keyword_limit(),
            embedding_fallback: EmbeddingFallback::default(),
            semantic_filters: default_semantic_filters(),
        }
    }
}

fn default_text_weight() -> f32 {
    0.6
}

fn default_semantic_weight() -> f32 {
    0.4
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_pool_multiplier() -> usize {
    4
}

fn default_min_pool() -> usize {
    20
}

fn default_top_n() -> usize {
    5
}

fn default_max_top_n() -> usize {
    100
}

fn default_keyword_limit() -> usize {
    50
}

fn default_semantic_filters() -> bool {
    true
}

impl SearchConfig {
    /// Candidate pool requested from each branch for a given `top_n`.
    pub fn pool_size(&self, top_n: usize) -> usize {
        top_n
            .saturating_mul(self.pool_multiplier)
            .max(self.min_pool)
            .max(top_n)
    }
}

/// REST server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to rolling files
    #[serde(default)]
    pub enabled: bool,

    /// Write logs to stderr
    #[serde(default = "default_true")]
    pub stderr: bool,

    /// File log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (relative paths resolve against the project root)
    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,

    /// hourly, daily, minutely, never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stderr: true,
            level: default_log_level(),
            directory: default_log_dir(),
            rotation: default_rotation(),
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".examsearch/logs")
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_file_prefix() -> String {
    "examsearch.log".to_string()
}

impl Config {
    /// Load configuration from the .examsearch directory
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        let config: Config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {:?}", config_path))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", config_path))?
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the .examsearch directory
    pub fn save(&self, root: &Path) -> Result<()> {
        let config_dir = root.join(CONFIG_DIR);
        let config_path = config_dir.join(CONFIG_FILE);

        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Reject settings the search service cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.search;
        for (name, w) in [("text_weight", s.text_weight), ("semantic_weight", s.semantic_weight)] {
            if !w.is_finite() || w < 0.0 {
                bail!("search.{} must be a non-negative number, got {}", name, w);
            }
        }
        if (s.text_weight + s.semantic_weight - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!(
                "search.text_weight + search.semantic_weight must sum to 1.0, got {}",
                s.text_weight + s.semantic_weight
            );
        }
        if s.pool_multiplier == 0 {
            bail!("search.pool_multiplier must be at least 1");
        }
        if s.default_top_n == 0 || s.default_top_n > s.max_top_n {
            bail!(
                "search.default_top_n must be between 1 and max_top_n ({})",
                s.max_top_n
            );
        }
        if s.rrf_k <= 0.0 || !s.rrf_k.is_finite() {
            bail!("search.rrf_k must be positive");
        }
        Ok(())
    }

    /// Get the path to the .examsearch directory
    pub fn data_dir(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR)
    }

    /// Get the path to the LanceDB database
    pub fn db_path(&self, root: &Path) -> PathBuf {
        Self::data_dir(root).join(&self.storage.db_path)
    }

    /// Get the directory that holds the BM25 index
    pub fn bm25_path(&self, root: &Path) -> PathBuf {
        Self::data_dir(root).join(&self.storage.bm25_dir)
    }

    /// Check if examsearch is initialized in the given directory
    pub fn is_initialized(root: &Path) -> bool {
        Self::data_dir(root).join(CONFIG_FILE).exists()
    }
}
