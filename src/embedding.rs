//! Embedding provider abstraction and the Cohere implementation.
//!
//! Defines the [`EmbeddingProvider`] trait consumed by ingestion and
//! retrieval, plus vector utilities:
//! - [`normalize_l2`] — scale a vector to unit Euclidean norm
//! - [`cosine_similarity`] — similarity between two embedding vectors
//!
//! Every vector leaving a provider is unit-normalized so cosine-similarity
//! search behaves as expected downstream; the zero vector is the one
//! degenerate case passed through untouched.
//!
//! Authentication failures and rate limits are surfaced as errors for that
//! call and are not retried here — retry policy belongs to the operator
//! layer.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;

/// Converts text into fixed-dimension, unit-norm vectors.
///
/// Implementations must return exactly one vector per input, in input
/// order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of document chunks.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Vector dimensionality (e.g. `384`).
    fn dimension(&self) -> usize;
}

/// Create the configured [`EmbeddingProvider`].
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "cohere" => Ok(Box::new(CohereProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embedding provider backed by the Cohere Embed API.
///
/// Calls `POST /v1/embed` with up to 96 texts per request (the provider's
/// batch limit), using `input_type = "search_document"` for chunks and
/// `"search_query"` for queries. Requires the API key environment variable
/// named in the config.
pub struct CohereProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

const COHERE_EMBED_URL: &str = "https://api.cohere.ai/v1/embed";

impl CohereProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size,
        })
    }

    async fn embed_batch(&self, texts: &[String], input_type: &str) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "texts": texts,
            "model": self.model,
            "input_type": input_type,
        });

        debug!(count = texts.len(), input_type, "calling Cohere embed API");

        let response = self
            .client
            .post(COHERE_EMBED_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Cohere embed request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            match status.as_u16() {
                401 => bail!("Cohere API error 401: invalid or missing API key"),
                429 => bail!("Cohere API error 429: rate limit exceeded"),
                _ => bail!("Cohere API error {}: {}", status, body_text),
            }
        }

        let json: serde_json::Value = response.json().await?;
        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Cohere response: missing embeddings array"))?;

        if embeddings.len() != texts.len() {
            bail!(
                "Cohere returned {} embeddings for {} texts",
                embeddings.len(),
                texts.len()
            );
        }

        let mut out = Vec::with_capacity(embeddings.len());
        for item in embeddings {
            let values = item
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("Invalid Cohere response: embedding not an array"))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect::<Vec<f32>>();
            out.push(normalize_l2(values));
        }

        Ok(out)
    }
}

#[async_trait]
impl EmbeddingProvider for CohereProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embed_batch(batch, "search_document").await?;
            all.extend(embeddings);
        }
        Ok(all)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()], "search_query").await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Scale a vector to unit L2 norm. The zero vector is returned unchanged.
pub fn normalize_l2(vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.into_iter().map(|x| x / norm).collect()
    } else {
        vec
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
