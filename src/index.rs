//! Vector index abstraction and implementations.
//!
//! Defines the [`VectorIndex`] trait consumed by ingestion and retrieval:
//! - **[`PineconeIndex`]** — REST client for a remote Pinecone index.
//!   Lazily creates the index (fixed dimension, cosine metric) if absent
//!   and polls until it is ready; the data-plane host is resolved once and
//!   reused (first caller wins).
//! - **[`MemoryIndex`]** — brute-force cosine scan over an in-process map,
//!   for local runs and tests.
//!
//! Upserts are idempotent: re-upserting an existing vector ID overwrites it
//! in place, which is what makes re-ingestion converge instead of
//! duplicating.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::embedding::cosine_similarity;
use crate::models::{ChunkMetadata, IndexStats, RetrievedChunk, VectorRecord};

/// External similarity index keyed by vector ID.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Make sure the backing index exists and is ready for traffic.
    async fn ensure_ready(&self) -> Result<()>;

    /// Insert or overwrite vectors by ID.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// Remove every vector belonging to a document. Absence of prior
    /// vectors is not an error.
    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<()>;

    /// Top-`k` nearest chunks by cosine similarity, best first.
    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;

    async fn stats(&self) -> Result<IndexStats>;
}

/// Create the configured [`VectorIndex`].
pub fn create_index(config: &IndexConfig, dimension: usize) -> Result<Box<dyn VectorIndex>> {
    match config.provider.as_str() {
        "pinecone" => Ok(Box::new(PineconeIndex::new(config, dimension)?)),
        "memory" => Ok(Box::new(MemoryIndex::new())),
        other => bail!("Unknown index provider: {}", other),
    }
}

// ============ Pinecone ============

const PINECONE_CONTROL_URL: &str = "https://api.pinecone.io";

/// Remote Pinecone index over its REST API.
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    index_name: String,
    dimension: usize,
    /// Data-plane host, resolved once by [`ensure_ready`](VectorIndex::ensure_ready).
    host: OnceCell<String>,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig, dimension: usize) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            index_name: config.index_name.clone(),
            dimension,
            host: OnceCell::new(),
        })
    }

    /// Resolve (and memoize) the data-plane host, creating the index first
    /// if it does not exist yet.
    async fn data_host(&self) -> Result<&str> {
        self.host
            .get_or_try_init(|| self.resolve_host())
            .await
            .map(|s| s.as_str())
    }

    async fn resolve_host(&self) -> Result<String> {
        let describe_url = format!("{}/indexes/{}", PINECONE_CONTROL_URL, self.index_name);

        let response = self
            .client
            .get(&describe_url)
            .header("Api-Key", &self.api_key)
            .send()
            .await
            .context("Pinecone describe-index request failed")?;

        if response.status().as_u16() == 404 {
            self.create_remote_index().await?;
        } else if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {}: {}", status, body);
        }

        // Poll until the index reports ready and a host is assigned.
        loop {
            let json: serde_json::Value = self
                .client
                .get(&describe_url)
                .header("Api-Key", &self.api_key)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let ready = json
                .pointer("/status/ready")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let host = json.get("host").and_then(|v| v.as_str());

            if ready {
                if let Some(host) = host {
                    info!(index = %self.index_name, host, "Pinecone index ready");
                    return Ok(host.to_string());
                }
            }

            debug!(index = %self.index_name, "waiting for index to be ready");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn create_remote_index(&self) -> Result<()> {
        info!(
            index = %self.index_name,
            dimension = self.dimension,
            "creating Pinecone index"
        );

        let body = serde_json::json!({
            "name": self.index_name,
            "dimension": self.dimension,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } },
        });

        let response = self
            .client
            .post(format!("{}/indexes", PINECONE_CONTROL_URL))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Pinecone create-index request failed")?;

        // 409 means another worker created it first; that is fine.
        if !response.status().is_success() && response.status().as_u16() != 409 {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Pinecone index creation failed {}: {}", status, body);
        }

        Ok(())
    }

    async fn data_post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let host = self.data_host().await?;

        let response = self
            .client
            .post(format!("https://{}{}", host, path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Pinecone request failed: {}", path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {} on {}: {}", status, path, body);
        }

        Ok(response.json().await.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn ensure_ready(&self) -> Result<()> {
        self.data_host().await?;
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let vectors: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                // Chunk text rides along in metadata so search results can
                // return it without a second lookup.
                let mut metadata = serde_json::to_value(&r.metadata).unwrap_or_default();
                if let Some(obj) = metadata.as_object_mut() {
                    obj.insert("text".to_string(), serde_json::Value::from(r.text.clone()));
                }
                serde_json::json!({
                    "id": r.id,
                    "values": r.values,
                    "metadata": metadata,
                })
            })
            .collect();

        self.data_post("/vectors/upsert", serde_json::json!({ "vectors": vectors }))
            .await?;
        Ok(())
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<()> {
        self.data_post(
            "/vectors/delete",
            serde_json::json!({ "filter": { "doc_id": { "$eq": doc_id } } }),
        )
        .await?;
        Ok(())
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let json = self
            .data_post(
                "/query",
                serde_json::json!({
                    "vector": query,
                    "topK": k,
                    "includeMetadata": true,
                }),
            )
            .await?;

        let matches = json
            .get("matches")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            let score = m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
            let Some(metadata_json) = m.get("metadata") else {
                warn!("Pinecone match without metadata, skipping");
                continue;
            };
            let text = metadata_json
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string();
            let metadata: ChunkMetadata = serde_json::from_value(metadata_json.clone())
                .context("Pinecone match metadata did not match expected schema")?;
            results.push(RetrievedChunk {
                text,
                metadata,
                score,
            });
        }

        Ok(results)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let json = self
            .data_post("/describe_index_stats", serde_json::json!({}))
            .await?;

        let namespaces = json
            .get("namespaces")
            .and_then(|n| n.as_object())
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();

        Ok(IndexStats {
            total_vector_count: json
                .get("totalVectorCount")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            dimension: json.get("dimension").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
            namespaces,
        })
    }
}

// ============ In-memory ============

struct StoredVector {
    values: Vec<f32>,
    text: String,
    metadata: ChunkMetadata,
}

/// In-memory index for local runs and tests. Search is a brute-force
/// cosine scan over all stored vectors.
pub struct MemoryIndex {
    vectors: RwLock<HashMap<String, StoredVector>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            vectors: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored vectors (test convenience).
    pub fn len(&self) -> usize {
        self.vectors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut vectors = self.vectors.write().unwrap();
        for r in records {
            vectors.insert(
                r.id.clone(),
                StoredVector {
                    values: r.values.clone(),
                    text: r.text.clone(),
                    metadata: r.metadata.clone(),
                },
            );
        }
        Ok(())
    }

    async fn delete_by_doc_id(&self, doc_id: &str) -> Result<()> {
        let mut vectors = self.vectors.write().unwrap();
        vectors.retain(|_, v| v.metadata.doc_id != doc_id);
        Ok(())
    }

    async fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let vectors = self.vectors.read().unwrap();

        let mut scored: Vec<RetrievedChunk> = vectors
            .values()
            .map(|v| RetrievedChunk {
                text: v.text.clone(),
                metadata: v.metadata.clone(),
                score: cosine_similarity(query, &v.values),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let vectors = self.vectors.read().unwrap();
        let dimension = vectors.values().next().map(|v| v.values.len()).unwrap_or(0);
        Ok(IndexStats {
            total_vector_count: vectors.len() as u64,
            dimension,
            namespaces: Vec::new(),
        })
    }
}
