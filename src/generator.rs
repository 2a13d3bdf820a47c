//! Grounded answer generation and post-processing.
//!
//! Builds the grounding prompt from retrieved chunks and conversation
//! history, invokes the model, and scrubs any inline citations it emitted
//! anyway. Citations are carried out-of-band as [`SourceAttribution`]
//! records; the system prompt forbids them inline, and the regex scrub is
//! defense-in-depth for when the model ignores that instruction.
//!
//! Also produces short session titles from the first message — a soft path
//! that must never block or fail the message flow.
//!
//! [`SourceAttribution`]: crate::models::SourceAttribution

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use regex::Regex;
use tracing::{info, warn};

use crate::language::language_name;
use crate::llm::ChatModel;
use crate::models::{ConversationTurn, RetrievedChunk};

/// Fixed phrase the model is told to use when the context has no answer.
pub const NOT_FOUND_PHRASE: &str =
    "I couldn't find information about that in the indexed documents.";

const RAG_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions about \
an indexed collection of PDF documents.

ABOUT YOU:
- You help users find and understand information contained in the indexed documents
- You make document content accessible and easy to understand

IMPORTANT INSTRUCTIONS:
1. For greeting messages (like \"hi\", \"hello\", \"what can you do\", \"who are you\"), introduce yourself and explain your purpose.
2. Answer questions based on the provided context documents when available.
3. If the answer is not found in the context, say \"I couldn't find information about that in the indexed documents.\"
4. Be concise but thorough in your answers.
5. DO NOT include source citations (like \"Document 1, Page 1\" or similar references) in your response. The sources are tracked separately and will be displayed automatically.
6. Focus on providing clear, natural answers without mentioning document names or page numbers.
7. If the question is unclear, ask for clarification.
8. Always maintain a helpful and professional tone.";

const ANSWER_TEMPERATURE: f32 = 0.3;
const TITLE_TEMPERATURE: f32 = 0.1;
const TITLE_MAX_CHARS: usize = 50;

/// Parenthesized citation, possibly several joined by semicolons:
/// `(Document 1, Page 1.0; Document 2, Page 10.0)`.
static CITATION_PAREN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\([^)]*Document\s+\d+[^)]*Page\s+[\d.]+[^)]*\)").unwrap()
});

/// Bare citation outside parentheses: `Document 1, Page 1.0` with optional
/// semicolon-joined continuations.
static CITATION_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Document\s+\d+[^();\n]*Page\s+[\d.]+(?:\s*;\s*Document\s+\d+[^();\n]*Page\s+[\d.]+)*")
        .unwrap()
});

static EMPTY_PARENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\(\s*\)").unwrap());
static REPEAT_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([.,;:!?])").unwrap());
static REPEAT_PERIODS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\.(?:\s*\.)+").unwrap());
static REPEAT_COMMAS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*,(?:\s*,)+").unwrap());

/// Remove citation-shaped text the model emitted despite instructions,
/// then tidy the leftover punctuation. Applying this twice yields the same
/// result as applying it once.
pub fn clean_source_citations(text: &str) -> String {
    let cleaned = CITATION_PAREN.replace_all(text, "");
    let cleaned = CITATION_BARE.replace_all(&cleaned, "");
    let cleaned = EMPTY_PARENS.replace_all(&cleaned, "");
    let cleaned = REPEAT_SPACES.replace_all(&cleaned, " ");
    let cleaned = SPACE_BEFORE_PUNCT.replace_all(&cleaned, "$1");
    let cleaned = REPEAT_PERIODS.replace_all(&cleaned, ".");
    let cleaned = REPEAT_COMMAS.replace_all(&cleaned, ",");
    cleaned.trim().to_string()
}

/// Render retrieved chunks into the context block the model grounds on.
/// The ordinal/name/page framing exists only for the model; it never
/// reaches the user.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Document {}: {}, Page {}]\n{}",
                i + 1,
                chunk.metadata.doc_name,
                chunk.metadata.page_number,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn build_system_prompt(chunks: &[RetrievedChunk], response_language: &str) -> String {
    let mut prompt = RAG_SYSTEM_PROMPT.to_string();

    if response_language != "en" {
        let name = language_name(response_language);
        prompt.push_str(&format!(
            "\n\nCRITICAL: The user asked their question in {name} ({code}). \
             You MUST respond in {name} ({code}). Do NOT respond in English. \
             All your responses must be in {name}.",
            name = name,
            code = response_language,
        ));
    }

    prompt.push_str("\n\nContext from documents:\n");
    prompt.push_str(&format_context(chunks));
    prompt
}

/// Generates grounded answers and session titles.
pub struct AnswerGenerator {
    llm: Arc<dyn ChatModel>,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// Answer the (English) `query` from `chunks`, in `response_language`.
    /// The returned text is already citation-scrubbed.
    pub async fn generate(
        &self,
        query: &str,
        chunks: &[RetrievedChunk],
        history: &[ConversationTurn],
        response_language: &str,
    ) -> Result<String> {
        info!(
            chunks = chunks.len(),
            language = response_language,
            "generating answer"
        );

        let system = build_system_prompt(chunks, response_language);
        let response = self
            .llm
            .generate(&system, history, query, ANSWER_TEMPERATURE)
            .await?;

        Ok(clean_source_citations(&response))
    }

    /// Produce a 3–6 word session title from the first message, truncated
    /// to 50 characters. Never fails: any error falls back to the first
    /// five words of the message.
    pub async fn generate_title(&self, first_message: &str) -> String {
        let system = "Generate a very short title (3-6 words) for a chat that starts with \
                      this message. Return only the title, nothing else.";

        match self
            .llm
            .generate(system, &[], first_message, TITLE_TEMPERATURE)
            .await
        {
            Ok(title) => truncate_chars(title.trim(), TITLE_MAX_CHARS),
            Err(e) => {
                warn!(error = %e, "title generation failed, using fallback");
                let fallback = first_message
                    .split_whitespace()
                    .take(5)
                    .collect::<Vec<_>>()
                    .join(" ");
                truncate_chars(&fallback, TITLE_MAX_CHARS)
            }
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect::<String>().trim().to_string()
}
