//! TOML configuration loading and validation.
//!
//! The configuration is loaded once at startup into an immutable [`Config`]
//! and passed by reference to the components that need it. [`validate`] is a
//! pure function returning every violation at once; [`load_config`] fails
//! with the full list rather than the first problem found.
//!
//! Secrets are never stored in the config file: each provider section names
//! the environment variable its API key is read from, and the key is
//! resolved when the client is constructed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub language: LanguageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Directory scanned for PDF files.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    /// JSON file mapping filename → last-ingested fingerprint.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Upper bound on vectors per upsert request.
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            cache_path: default_cache_path(),
            upsert_batch_size: default_upsert_batch_size(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("./docs")
}
fn default_cache_path() -> PathBuf {
    PathBuf::from(".processed_files.json")
}
fn default_upsert_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    400
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"cohere"` is the only remote provider.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Environment variable holding the API key.
    #[serde(default = "default_cohere_key_env")]
    pub api_key_env: String,
    /// Provider-side batch limit (texts per request).
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            api_key_env: default_cohere_key_env(),
            batch_size: default_embed_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "cohere".to_string()
}
fn default_embedding_model() -> String {
    "embed-english-light-v3.0".to_string()
}
fn default_dimension() -> usize {
    384
}
fn default_cohere_key_env() -> String {
    "COHERE_API_KEY".to_string()
}
fn default_embed_batch_size() -> usize {
    96
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `"pinecone"` for the remote index, `"memory"` for an in-process
    /// brute-force index (local runs and tests).
    #[serde(default = "default_index_provider")]
    pub provider: String,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_pinecone_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            index_name: default_index_name(),
            api_key_env: default_pinecone_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_provider() -> String {
    "pinecone".to_string()
}
fn default_index_name() -> String {
    "docquery".to_string()
}
fn default_pinecone_key_env() -> String {
    "PINECONE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"gemini"` is the only provider.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key_env: default_gemini_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}
fn default_gemini_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of nearest chunks retrieved per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Most-recent turns passed to contextualization and generation.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_history_limit() -> usize {
    8
}

/// Empirically chosen language-detection constants. Kept configurable; the
/// defaults match observed behavior rather than any derivation.
#[derive(Debug, Deserialize, Clone)]
pub struct LanguageConfig {
    /// Fraction of common-English tokens at or above which text is treated
    /// as likely English.
    #[serde(default = "default_english_word_ratio")]
    pub english_word_ratio: f64,
    /// Confidence a detector must exceed to override likely-English text.
    #[serde(default = "default_english_override_confidence")]
    pub english_override_confidence: f64,
    /// Minimum confidence to accept a non-English detection otherwise.
    #[serde(default = "default_non_english_confidence")]
    pub non_english_confidence: f64,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            english_word_ratio: default_english_word_ratio(),
            english_override_confidence: default_english_override_confidence(),
            non_english_confidence: default_non_english_confidence(),
        }
    }
}

fn default_english_word_ratio() -> f64 {
    0.3
}
fn default_english_override_confidence() -> f64 {
    0.9
}
fn default_non_english_confidence() -> f64 {
    0.7
}

/// Check a configuration, returning every violation found. Pure — no I/O,
/// no environment access.
pub fn validate(config: &Config) -> Vec<String> {
    let mut violations = Vec::new();

    if config.chunking.chunk_size == 0 {
        violations.push("chunking.chunk_size must be > 0".to_string());
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        violations.push("chunking.chunk_overlap must be < chunking.chunk_size".to_string());
    }

    if config.embedding.dimension == 0 {
        violations.push("embedding.dimension must be > 0".to_string());
    }
    if config.embedding.batch_size == 0 {
        violations.push("embedding.batch_size must be > 0".to_string());
    }
    match config.embedding.provider.as_str() {
        "cohere" => {}
        other => violations.push(format!(
            "Unknown embedding provider: '{}'. Must be cohere.",
            other
        )),
    }

    match config.index.provider.as_str() {
        "pinecone" | "memory" => {}
        other => violations.push(format!(
            "Unknown index provider: '{}'. Must be pinecone or memory.",
            other
        )),
    }
    if config.index.index_name.is_empty() {
        violations.push("index.index_name must not be empty".to_string());
    }

    match config.llm.provider.as_str() {
        "gemini" => {}
        other => violations.push(format!("Unknown llm provider: '{}'. Must be gemini.", other)),
    }

    if config.ingest.upsert_batch_size == 0 {
        violations.push("ingest.upsert_batch_size must be > 0".to_string());
    }

    if config.retrieval.top_k == 0 {
        violations.push("retrieval.top_k must be >= 1".to_string());
    }

    for (name, value) in [
        (
            "language.english_word_ratio",
            config.language.english_word_ratio,
        ),
        (
            "language.english_override_confidence",
            config.language.english_override_confidence,
        ),
        (
            "language.non_english_confidence",
            config.language.non_english_confidence,
        ),
    ] {
        if !(0.0..=1.0).contains(&value) {
            violations.push(format!("{} must be in [0.0, 1.0]", name));
        }
    }

    violations
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let violations = validate(&config);
    if !violations.is_empty() {
        anyhow::bail!("Invalid configuration:\n  - {}", violations.join("\n  - "));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert!(validate(&config).is_empty());
        assert_eq!(config.chunking.chunk_size, 400);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.history_limit, 8);
        assert_eq!(config.ingest.upsert_batch_size, 100);
        assert_eq!(config.embedding.batch_size, 96);
    }

    #[test]
    fn test_overlap_must_be_less_than_size() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            chunk_size = 100
            chunk_overlap = 100
            "#,
        )
        .unwrap();
        let violations = validate(&config);
        assert!(violations.iter().any(|v| v.contains("chunk_overlap")));
    }

    #[test]
    fn test_collects_all_violations() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            provider = "bert"
            dimension = 0

            [index]
            provider = "chroma"

            [language]
            english_word_ratio = 1.5
            "#,
        )
        .unwrap();
        let violations = validate(&config);
        assert!(violations.len() >= 4, "got: {:?}", violations);
    }

    #[test]
    fn test_threshold_overrides() {
        let config: Config = toml::from_str(
            r#"
            [language]
            english_word_ratio = 0.25
            non_english_confidence = 0.8
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_empty());
        assert_eq!(config.language.english_word_ratio, 0.25);
        assert_eq!(config.language.english_override_confidence, 0.9);
        assert_eq!(config.language.non_english_confidence, 0.8);
    }
}
