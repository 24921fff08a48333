//! Inference service abstraction and implementations.
//!
//! Defines the [`InferenceService`] trait — the seam to the hosted model:
//! `embed` for batched vector embeddings and `complete` for grounded
//! answer generation. Implementations:
//!
//! - **[`DisabledService`]** — returns errors; used when inference is not
//!   configured (the default).
//! - **[`OpenAiService`]** — OpenAI embeddings + chat completions with
//!   batching, retry, and backoff. Requires `OPENAI_API_KEY`.
//! - **[`OllamaService`]** — a local Ollama instance's `/api/embed` and
//!   `/api/generate` endpoints.
//!
//! Because the service is an injected capability (`Arc<dyn
//! InferenceService>`), tests substitute a deterministic stub and the rest
//! of the pipeline never knows the difference.
//!
//! # Retry Strategy
//!
//! Transient errors use exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::InferenceConfig;

/// Seam to the external inference collaborator.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Embedding model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generate a completion for a fully-assembled prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Create the appropriate [`InferenceService`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider cannot
/// be initialized (missing model or API key).
pub fn create_service(config: &InferenceConfig) -> Result<Arc<dyn InferenceService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledService)),
        "openai" => Ok(Arc::new(OpenAiService::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaService::new(config)?)),
        other => bail!("Unknown inference provider: {}", other),
    }
}

// ============ Shared HTTP plumbing ============

/// POST a JSON body with the retry strategy described in the module docs.
async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    what: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut req = client.post(url).header("Content-Type", "application/json");
        if let Some(token) = bearer {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        match req.json(body).send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!("{} error {}", what, status));
                    continue;
                }

                // Client error (not 429) — don't retry
                bail!("{} error {}", what, status);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("{} connection error: {}", what, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} failed after retries", what)))
}

fn parse_embedding_array(value: &serde_json::Value) -> Result<Vec<f32>> {
    let arr = value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid response: embedding is not an array"))?;
    Ok(arr.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
}

// ============ Disabled Service ============

/// A no-op service that always returns errors.
///
/// Used when `inference.provider = "disabled"` in the configuration.
pub struct DisabledService;

#[async_trait]
impl InferenceService for DisabledService {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Inference provider is disabled")
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        bail!("Inference provider is disabled")
    }
}

// ============ OpenAI Service ============

/// Inference via the OpenAI API.
///
/// Embeddings through `POST /v1/embeddings`, completions through
/// `POST /v1/chat/completions`. Requires the `OPENAI_API_KEY` environment
/// variable.
pub struct OpenAiService {
    embed_model: String,
    completion_model: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiService {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let embed_model = config
            .embed_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("inference.embed_model required for OpenAI provider"))?;
        let completion_model = config
            .completion_model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            embed_model,
            completion_model,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl InferenceService for OpenAiService {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": self.embed_model,
            "input": texts,
        });

        let json = post_json_with_retry(
            &self.client,
            "https://api.openai.com/v1/embeddings",
            Some(&api_key),
            &body,
            self.max_retries,
            "OpenAI embeddings API",
        )
        .await?;

        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item
                .get("embedding")
                .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
            embeddings.push(parse_embedding_array(embedding)?);
        }
        Ok(embeddings)
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": self.completion_model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.0,
        });

        let json = post_json_with_retry(
            &self.client,
            "https://api.openai.com/v1/chat/completions",
            Some(&api_key),
            &body,
            self.max_retries,
            "OpenAI chat API",
        )
        .await?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

// ============ Ollama Service ============

/// Inference via a local Ollama instance.
///
/// Calls `POST /api/embed` and `POST /api/generate` on the configured URL
/// (default: `http://localhost:11434`). Requires Ollama to be running with
/// the models pulled.
pub struct OllamaService {
    embed_model: String,
    completion_model: String,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaService {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let embed_model = config
            .embed_model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("inference.embed_model required for Ollama provider"))?;
        let completion_model = config
            .completion_model
            .clone()
            .unwrap_or_else(|| embed_model.clone());
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            embed_model,
            completion_model,
            url,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl InferenceService for OllamaService {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": texts,
        });

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama embed API",
        )
        .await?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

        embeddings.iter().map(parse_embedding_array).collect()
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.completion_model,
            "prompt": prompt,
            "stream": false,
        });

        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url),
            None,
            &body,
            self.max_retries,
            "Ollama generate API",
        )
        .await?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}
