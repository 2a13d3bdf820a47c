//! The question-answering pipeline.
//!
//! [`ChatEngine`] owns one instance of every collaborator and threads a
//! question through the fixed stages: language normalization, history-aware
//! retrieval, grounded generation. Collaborators are constructed once and
//! shared; per-question state lives entirely in arguments and return values.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::generator::AnswerGenerator;
use crate::index::{create_index, VectorIndex};
use crate::language::LanguageNormalizer;
use crate::llm::{create_model, ChatModel};
use crate::models::{ChatResponse, ConversationTurn};
use crate::retriever::{dedup_sources, recent_turns, HistoryAwareRetriever};

/// Answers questions against the indexed corpus.
pub struct ChatEngine {
    normalizer: LanguageNormalizer,
    retriever: HistoryAwareRetriever,
    generator: AnswerGenerator,
    index: Arc<dyn VectorIndex>,
    history_limit: usize,
}

impl ChatEngine {
    /// Build the engine from configuration, constructing the real embedding,
    /// index, and model clients.
    pub fn new(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let index: Arc<dyn VectorIndex> =
            Arc::from(create_index(&config.index, config.embedding.dimension)?);
        let llm: Arc<dyn ChatModel> = Arc::from(create_model(&config.llm)?);
        Ok(Self::with_components(config, llm, embedder, index))
    }

    /// Build the engine from pre-constructed collaborators.
    pub fn with_components(
        config: &Config,
        llm: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let normalizer = LanguageNormalizer::new(llm.clone(), config.language.clone());
        let retriever = HistoryAwareRetriever::new(
            llm.clone(),
            embedder,
            index.clone(),
            config.retrieval.top_k,
            config.retrieval.history_limit,
        );
        let generator = AnswerGenerator::new(llm);
        Self {
            normalizer,
            retriever,
            generator,
            index,
            history_limit: config.retrieval.history_limit,
        }
    }

    /// The vector index backing this engine.
    pub fn index(&self) -> Arc<dyn VectorIndex> {
        self.index.clone()
    }

    /// Answer `question` given prior `history`. The answer comes back in the
    /// question's language; retrieval and grounding run in English.
    pub async fn answer(
        &self,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<ChatResponse> {
        let (english_query, detected_language) =
            self.normalizer.process_user_query(question).await;
        info!(language = %detected_language, "processing question");

        // The same bounded window feeds contextualization and generation.
        let window = recent_turns(history, self.history_limit);

        let (chunks, retrieval_query) =
            self.retriever.retrieve(&english_query, window).await?;

        let answer = self
            .generator
            .generate(&english_query, &chunks, window, &detected_language)
            .await?;

        Ok(ChatResponse {
            answer,
            sources: dedup_sources(&chunks),
            detected_language,
            retrieval_query,
        })
    }

    /// A short title for a session opened with `first_message`. Never fails.
    pub async fn title_for(&self, first_message: &str) -> String {
        self.generator.generate_title(first_message).await
    }
}
