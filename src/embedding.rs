//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **Gemini** (`provider = "gemini"`), calling `batchEmbedContents` with a
//!   retrieval task type.
//! - **OpenAI** (`provider = "openai"`), calling `POST /v1/embeddings`.
//! - **Disabled** (`provider = "disabled"`), which always errors.
//!
//! Both live providers batch their inputs and retry transient failures with
//! exponential backoff: HTTP 429 and 5xx are retried, other 4xx fail
//! immediately, network errors are retried. Backoff doubles per attempt,
//! capped at 32 seconds.
//!
//! Also provides vector utilities for the local store:
//! [`vec_to_blob`] / [`blob_to_vec`] encode vectors as little-endian `f32`
//! bytes for SQLite BLOB storage, and [`cosine_similarity`] scores two
//! vectors.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// What the embedding will be used for. Gemini distinguishes document and
/// query embeddings; OpenAI ignores the distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    Document,
    Query,
}

impl EmbedTask {
    fn gemini_task_type(self) -> &'static str {
        match self {
            EmbedTask::Document => "RETRIEVAL_DOCUMENT",
            EmbedTask::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Trait for embedding providers. The actual computation is performed by
/// [`embed_texts`], which dispatches on the configured provider name.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"embedding-001"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
}

/// Embed a batch of texts using the configured provider. Returns one vector
/// per input text, in input order.
pub async fn embed_texts(
    config: &EmbeddingConfig,
    texts: &[String],
    task: EmbedTask,
) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "gemini" => embed_gemini(config, texts, task).await,
        "openai" => embed_openai(config, texts).await,
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single query text, for semantic retrieval.
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let results = embed_texts(config, &[text.to_string()], EmbedTask::Query).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Query-embedding abstraction held by the chat engine, so retrieval can be
/// tested without network access.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// [`Embedder`] backed by the configured remote provider.
pub struct ApiEmbedder {
    config: EmbeddingConfig,
}

impl ApiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        embed_query(&self.config, text).await
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

// ============ Gemini Provider ============

/// Embedding provider using the Google Generative Language API.
///
/// Requires the `GOOGLE_API_KEY` environment variable.
pub struct GeminiProvider {
    model: String,
    dims: usize,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Gemini provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Gemini provider"))?;
        if std::env::var("GOOGLE_API_KEY").is_err() {
            bail!("GOOGLE_API_KEY environment variable not set");
        }
        Ok(Self {
            model: normalize_gemini_model(&model),
            dims,
        })
    }
}

impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// Accepts both `"embedding-001"` and the fully qualified
/// `"models/embedding-001"` spelling.
fn normalize_gemini_model(model: &str) -> String {
    model.trim_start_matches("models/").to_string()
}

async fn embed_gemini(
    config: &EmbeddingConfig,
    texts: &[String],
    task: EmbedTask,
) -> Result<Vec<Vec<f32>>> {
    let api_key = std::env::var("GOOGLE_API_KEY")
        .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY not set"))?;
    let model = normalize_gemini_model(
        config
            .model
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?,
    );

    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents?key={}",
        model, api_key
    );

    let requests: Vec<serde_json::Value> = texts
        .iter()
        .map(|text| {
            serde_json::json!({
                "model": format!("models/{}", model),
                "content": { "parts": [ { "text": text } ] },
                "taskType": task.gemini_task_type(),
            })
        })
        .collect();
    let body = serde_json::json!({ "requests": requests });

    let json = post_with_backoff(config, &url, None, &body, "Gemini").await?;
    parse_gemini_response(&json)
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("embeddings")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embeddings array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let values = item
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing values"))?;
        let vec: Vec<f32> = values
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let json = post_with_backoff(
        config,
        "https://api.openai.com/v1/embeddings",
        Some(&format!("Bearer {}", api_key)),
        &body,
        "OpenAI",
    )
    .await?;
    parse_openai_response(&json)
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

// ============ Shared HTTP retry loop ============

/// POST a JSON body with exponential-backoff retry. 429/5xx and network
/// errors are retried up to `max_retries` times; other 4xx fail immediately.
async fn post_with_backoff(
    config: &EmbeddingConfig,
    url: &str,
    authorization: Option<&str>,
    body: &serde_json::Value,
    api_name: &str,
) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(auth) = authorization {
            request = request.header("Authorization", auth);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        api_name,
                        status,
                        body_text
                    ));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", api_name, status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "gemini" => Ok(Box::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Box::new(OpenAIProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encodes an embedding as little-endian f32 bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decodes a BLOB written by [`vec_to_blob`]. Trailing bytes that do not
/// form a whole f32 are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().unwrap_or_default()))
        .collect()
}

/// Cosine similarity of two embeddings, in `[-1, 1]`. Mismatched lengths,
/// empty input, and zero vectors all score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm = |v: &[f32]| v.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm(a) * norm(b);
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
