//! # docquery
//!
//! **A multilingual question-answering pipeline over local PDF documents.**
//!
//! docquery ingests a directory of PDFs into a vector index (page-aware
//! recursive chunking, Cohere embeddings, Pinecone or in-memory storage)
//! and answers questions about them through a retrieval-augmented chat
//! loop: queries in any supported language are normalized to English,
//! rewritten against conversation history into standalone form, matched
//! against the index, and answered in the user's language with out-of-band
//! source attributions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │  PDFs    │──▶│   Ingestion  │──▶│ Vector index   │
//! │ (./docs) │   │ chunk+embed  │   │ Pinecone/mem  │
//! └──────────┘   └──────────────┘   └──────┬────────┘
//!                                          │
//!   question ──▶ language ──▶ history- ────┤
//!                normalize    aware        ▼
//!                             retrieval  grounded
//!                                        generation ──▶ answer + sources
//! ```
//!
//! ## Data Flow
//!
//! 1. **Ingestion** ([`ingest`]) scans for PDFs, fingerprints them, and
//!    skips unchanged files. New content is split per page by the
//!    recursive chunker ([`chunk`]), embedded ([`embedding`]), and
//!    upserted under stable IDs ([`ids`]) so re-runs overwrite in place.
//! 2. A question is language-normalized ([`language`]): detected, and
//!    translated to English when needed.
//! 3. The **retriever** ([`retriever`]) rewrites follow-ups into
//!    standalone queries using recent history, then runs top-K cosine
//!    search against the index ([`index`]).
//! 4. The **generator** ([`generator`]) grounds the model on the
//!    retrieved chunks, forces the response language, and scrubs inline
//!    citations; attributions travel separately.
//! 5. The **engine** ([`pipeline`]) wires the stages together behind one
//!    call, exposed via the `docq` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! docq ingest                    # index ./docs into the vector store
//! docq ingest --force            # re-index unchanged files too
//! docq ask "what changed in the 2026 budget?"
//! docq chat                      # interactive session with history
//! docq stats                     # index statistics
//! ```

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod generator;
pub mod ids;
pub mod index;
pub mod ingest;
pub mod language;
pub mod llm;
pub mod models;
pub mod pdf;
pub mod pipeline;
pub mod retriever;
