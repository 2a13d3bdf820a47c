//! History-aware retrieval.
//!
//! A follow-up like "how much was allocated to it?" is useless as a search
//! query on its own. Before retrieval, the current query is rewritten into
//! a standalone form using the recent conversation — the model is told to
//! reformulate only, never to answer. When there is no history the query is
//! used verbatim and no model call is made.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::models::{ConversationTurn, RetrievedChunk, SourceAttribution};

const CONTEXTUALIZE_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question \
which can be understood without the chat history. Do NOT answer the question, \
just reformulate it if needed and otherwise return it as is.";

const CONTEXTUALIZE_TEMPERATURE: f32 = 0.3;

/// The most recent `limit` turns, in their original chronological order.
pub fn recent_turns(history: &[ConversationTurn], limit: usize) -> &[ConversationTurn] {
    let start = history.len().saturating_sub(limit);
    &history[start..]
}

/// Collapse retrieved chunks into (document, page) attributions,
/// deduplicated while preserving retrieval order.
pub fn dedup_sources(chunks: &[RetrievedChunk]) -> Vec<SourceAttribution> {
    let mut seen = std::collections::HashSet::new();
    let mut sources = Vec::new();

    for chunk in chunks {
        let attribution = SourceAttribution {
            doc_name: chunk.metadata.doc_name.clone(),
            page_number: chunk.metadata.page_number,
        };
        if seen.insert(attribution.clone()) {
            sources.push(attribution);
        }
    }

    sources
}

/// Rewrites follow-up queries into standalone form, then retrieves the
/// top-K nearest chunks.
pub struct HistoryAwareRetriever {
    llm: Arc<dyn ChatModel>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    history_limit: usize,
}

impl HistoryAwareRetriever {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        history_limit: usize,
    ) -> Self {
        Self {
            llm,
            embedder,
            index,
            top_k,
            history_limit,
        }
    }

    /// Retrieve context for `query`, returning the chunks and the query
    /// actually used for retrieval.
    pub async fn retrieve(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<(Vec<RetrievedChunk>, String)> {
        let window = recent_turns(history, self.history_limit);

        let retrieval_query = if window.is_empty() {
            query.to_string()
        } else {
            debug!(turns = window.len(), "contextualizing query against history");
            self.llm
                .generate(
                    CONTEXTUALIZE_PROMPT,
                    window,
                    query,
                    CONTEXTUALIZE_TEMPERATURE,
                )
                .await?
        };

        let embedding = self.embedder.embed_query(&retrieval_query).await?;
        let chunks = self
            .index
            .similarity_search(&embedding, self.top_k)
            .await?;

        info!(
            retrieved = chunks.len(),
            query = %retrieval_query,
            "retrieval complete"
        );

        Ok((chunks, retrieval_query))
    }
}
