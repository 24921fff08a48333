use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            min_chars: default_min_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    2000
}
fn default_min_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Cosine similarity below this is treated as "no relevant context".
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    8
}
fn default_min_score() -> f32 {
    0.15
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// `"openai"`, `"ollama"`, or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub embed_model: Option<String>,
    #[serde(default)]
    pub completion_model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Embedding batches in flight at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            embed_model: None,
            completion_model: None,
            url: None,
            batch_size: 64,
            parallelism: 4,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_parallelism() -> usize {
    4
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    /// Overall character budget for the retrieved context window.
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            context_budget_chars: default_context_budget(),
        }
    }
}

fn default_context_budget() -> usize {
    16_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Resident snapshots before least-recently-queried eviction.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Ceiling on one ingestion attempt; on timeout nothing is published.
    #[serde(default = "default_ingest_timeout")]
    pub ingest_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ingest_timeout_secs: default_ingest_timeout(),
        }
    }
}

fn default_capacity() -> usize {
    8
}
fn default_ingest_timeout() -> u64 {
    600
}

impl InferenceConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.min_chars > config.chunking.max_chars {
        anyhow::bail!("chunking.min_chars must be <= chunking.max_chars");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [0.0, 1.0]");
    }
    if config.index.capacity == 0 {
        anyhow::bail!("index.capacity must be >= 1");
    }
    if config.inference.is_enabled() {
        if config.inference.embed_model.is_none() {
            anyhow::bail!(
                "inference.embed_model must be specified when provider is '{}'",
                config.inference.provider
            );
        }
        if config.inference.batch_size == 0 {
            anyhow::bail!("inference.batch_size must be >= 1");
        }
        if config.inference.parallelism == 0 {
            anyhow::bail!("inference.parallelism must be >= 1");
        }
    }
    match config.inference.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown inference provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    Ok(())
}
