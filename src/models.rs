//! Core data models used throughout docquery.
//!
//! These types represent the pages, chunks, and conversation turns that flow
//! through the ingestion and question-answering pipeline, plus the report
//! types produced by an ingestion run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One page of text extracted from a PDF. Never mutated after loading.
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// 1-indexed physical page number in the source PDF.
    pub page_number: u32,
    pub text: String,
}

/// A bounded-length, overlapping segment of a page's text — the unit stored
/// in the vector index.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 1-indexed page the chunk was cut from.
    pub page_number: u32,
    /// 0-indexed position within the page, assigned in split order.
    pub chunk_index: u32,
    pub text: String,
}

/// Metadata attached to every stored vector.
///
/// This schema is wire-relevant: re-ingestion relies on `doc_id` for
/// deletion and the retriever reads `doc_name`/`page_number` back out of
/// search results for source attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub doc_name: String,
    /// 1-indexed page number.
    pub page_number: u32,
    /// 0-indexed chunk position within the page.
    pub chunk_index: u32,
    pub source: String,
    /// ISO-8601 ingestion timestamp.
    pub ingested_at: String,
}

/// A vector ready for upsert: stable ID, unit-norm embedding, metadata,
/// and the chunk text it embeds.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// `{doc_id}_{page_number}_{chunk_index}` — globally unique and
    /// re-derivable, so re-ingestion overwrites in place.
    pub id: String,
    pub values: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of a conversation, immutable once created. Turns are ordered by
/// creation time within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceAttribution>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

/// Where a retrieved chunk came from, deduplicated by (name, page) within
/// a single answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub doc_name: String,
    pub page_number: u32,
}

/// Vector index statistics as reported by the backing index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub total_vector_count: u64,
    pub dimension: usize,
    pub namespaces: Vec<String>,
}

/// Terminal state of one file in an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Fingerprint matched the cache and `force` was not set.
    Skipped,
    /// Chunks were produced and upserted (possibly fewer vectors than
    /// chunks if individual batches failed).
    Succeeded,
    /// The PDF had no extractable text. Not an error.
    Empty,
    /// The file could not be loaded or processed at all.
    Failed,
}

/// Per-file detail record in an ingestion report.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    pub pages: usize,
    pub chunks: usize,
    pub vectors_added: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of an ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// `"success"` if zero errors, `"partial"` otherwise.
    pub status: String,
    pub documents_ingested: usize,
    pub total_chunks: usize,
    pub errors: usize,
    pub details: Vec<FileReport>,
    #[serde(skip)]
    pub started_at: Option<DateTime<Utc>>,
}

/// Final product of the query pipeline for one user question.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Answer text in the user's original language, citation-scrubbed.
    pub answer: String,
    /// Deduplicated source attributions, in retrieval order.
    pub sources: Vec<SourceAttribution>,
    /// ISO 639-1 code detected for the user's question.
    pub detected_language: String,
    /// The (possibly rewritten) English query actually used for retrieval.
    pub retrieval_query: String,
}
