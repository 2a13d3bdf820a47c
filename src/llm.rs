//! Language model abstraction and the Gemini implementation.
//!
//! The whole pipeline needs exactly one capability from the model: complete
//! a conversation under a system instruction. Contextualization, answer
//! generation, translation, and title generation all go through
//! [`ChatModel::generate`] with different prompts and temperatures.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::models::{ConversationTurn, Role};

/// A text-completion model. Non-deterministic and non-idempotent; callers
/// own any retry policy.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete `input` under `system` with `history` as prior turns.
    async fn generate(
        &self,
        system: &str,
        history: &[ConversationTurn],
        input: &str,
        temperature: f32,
    ) -> Result<String>;
}

/// Create the configured [`ChatModel`].
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Chat model backed by the Gemini `generateContent` REST API.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

impl GeminiModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    async fn generate(
        &self,
        system: &str,
        history: &[ConversationTurn],
        input: &str,
        temperature: f32,
    ) -> Result<String> {
        let mut contents: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": turn.text }],
                })
            })
            .collect();
        contents.push(serde_json::json!({
            "role": "user",
            "parts": [{ "text": input }],
        }));

        let body = serde_json::json!({
            "system_instruction": { "parts": [{ "text": system }] },
            "contents": contents,
            "generationConfig": { "temperature": temperature },
        });

        debug!(model = %self.model, turns = history.len(), "calling Gemini API");

        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_BASE_URL, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            match status.as_u16() {
                401 | 403 => bail!("Gemini API error {}: invalid or missing API key", status),
                429 => bail!("Gemini API error 429: rate limit exceeded"),
                _ => bail!("Gemini API error {}: {}", status, body_text),
            }
        }

        let json: serde_json::Value = response.json().await?;
        let parts = json
            .pointer("/candidates/0/content/parts")
            .and_then(|p| p.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: no candidates"))?;

        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();

        if text.is_empty() {
            bail!("Gemini returned an empty completion");
        }

        Ok(text.trim().to_string())
    }
}
