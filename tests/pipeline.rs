//! End-to-end pipeline tests over the in-memory index.
//!
//! Asserts: incremental ingestion skips unchanged files, force re-ingests,
//! empty PDFs are reported without failing the run, failed files do not
//! poison the cache, and a question flows through language normalization,
//! retrieval, and generation to a scrubbed answer with source attributions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use docquery::config::Config;
use docquery::embedding::EmbeddingProvider;
use docquery::index::{MemoryIndex, VectorIndex};
use docquery::ingest::Ingestor;
use docquery::llm::ChatModel;
use docquery::models::{
    ConversationTurn, FileStatus, IngestReport, VectorRecord,
};
use docquery::pipeline::ChatEngine;

/// Minimal valid PDF with one page per entry in `pages`. Builds the body
/// first, then the xref with correct byte offsets so pdf-extract can parse
/// it. Page text must not contain parentheses or backslashes.
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    let kids = (0..n)
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids, n
        )
        .as_bytes(),
    );

    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        let page_obj = 4 + 2 * i;
        let content_obj = page_obj + 1;

        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_obj, content_obj
            )
            .as_bytes(),
        );

        let stream = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET\n", text);
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n",
                content_obj,
                stream.len()
            )
            .as_bytes(),
        );
        out.extend_from_slice(stream.as_bytes());
        out.extend_from_slice(b"endstream endobj\n");
    }

    let size = 4 + 2 * n;
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for off in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, xref_start
        )
        .as_bytes(),
    );
    out
}

/// Deterministic text-derived unit vectors; no network.
struct HashEmbedder;

fn hash_embedding(text: &str) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    let mut v: Vec<f32> = digest[..8].iter().map(|b| *b as f32 / 255.0 + 0.01).collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    for x in &mut v {
        *x /= norm;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embedding(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(hash_embedding(text))
    }

    fn dimension(&self) -> usize {
        8
    }
}

/// Routes each pipeline prompt to a canned reply by inspecting the system
/// instruction, standing in for the remote model.
struct ScriptedModel;

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn generate(
        &self,
        system: &str,
        _history: &[ConversationTurn],
        input: &str,
        _temperature: f32,
    ) -> Result<String> {
        if system.contains("Context from documents") {
            Ok("The projected deficit is 4.4 percent (Document 1, Page 1.0).".to_string())
        } else if system.contains("very short title") {
            Ok("Deficit question".to_string())
        } else if system.contains("professional translator") {
            Ok(input.to_string())
        } else {
            // Contextualization: the query is already standalone.
            Ok(input.to_string())
        }
    }
}

/// An index whose writes always fail, for error-isolation tests.
struct BrokenIndex;

#[async_trait]
impl VectorIndex for BrokenIndex {
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _records: &[VectorRecord]) -> Result<()> {
        anyhow::bail!("index unavailable")
    }

    async fn delete_by_doc_id(&self, _doc_id: &str) -> Result<()> {
        Ok(())
    }

    async fn similarity_search(
        &self,
        _query: &[f32],
        _k: usize,
    ) -> Result<Vec<docquery::models::RetrievedChunk>> {
        Ok(Vec::new())
    }

    async fn stats(&self) -> Result<docquery::models::IndexStats> {
        Ok(docquery::models::IndexStats::default())
    }
}

fn test_config(tmp: &Path) -> Config {
    let mut cfg: Config = toml::from_str("").unwrap();
    cfg.ingest.cache_path = tmp.join("cache.json");
    cfg.index.provider = "memory".to_string();
    cfg
}

fn write_fiscal_pdf(docs: &Path) -> PathBuf {
    let path = docs.join("fiscal.pdf");
    std::fs::write(
        &path,
        pdf_with_pages(&[
            "The fiscal deficit for the coming year is projected at 4.4 percent of GDP.",
            "Capital expenditure on infrastructure rises to 11.2 lakh crore under the plan.",
        ]),
    )
    .unwrap();
    path
}

fn setup() -> (TempDir, Config, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    let cfg = test_config(tmp.path());
    (tmp, cfg, docs)
}

async fn run_ingest(cfg: &Config, index: Arc<MemoryIndex>, docs: &Path, force: bool) -> IngestReport {
    let ingestor = Ingestor::new(cfg, Arc::new(HashEmbedder), index);
    ingestor.run(docs, force, false).await.unwrap()
}

#[tokio::test]
async fn test_ingest_then_skip_unchanged() {
    let (_tmp, cfg, docs) = setup();
    write_fiscal_pdf(&docs);
    let index = Arc::new(MemoryIndex::new());

    let first = run_ingest(&cfg, index.clone(), &docs, false).await;
    assert_eq!(first.status, "success");
    assert_eq!(first.documents_ingested, 1);
    assert_eq!(first.details[0].status, FileStatus::Succeeded);
    assert_eq!(first.details[0].pages, 2);
    assert!(first.total_chunks >= 2);
    let stored = index.len();
    assert_eq!(stored, first.details[0].vectors_added);

    let second = run_ingest(&cfg, index.clone(), &docs, false).await;
    assert_eq!(second.status, "success");
    assert_eq!(second.documents_ingested, 0);
    assert_eq!(second.details[0].status, FileStatus::Skipped);
    assert_eq!(second.details[0].doc_id, first.details[0].doc_id);
    assert_eq!(index.len(), stored);
}

#[tokio::test]
async fn test_force_reingests_in_place() {
    let (_tmp, cfg, docs) = setup();
    write_fiscal_pdf(&docs);
    let index = Arc::new(MemoryIndex::new());

    run_ingest(&cfg, index.clone(), &docs, false).await;
    let stored = index.len();

    let forced = run_ingest(&cfg, index.clone(), &docs, true).await;
    assert_eq!(forced.details[0].status, FileStatus::Succeeded);
    assert!(forced.details[0].vectors_added > 0);
    // Stable IDs: same content lands on the same vectors.
    assert_eq!(index.len(), stored);
}

#[tokio::test]
async fn test_changed_file_is_reprocessed() {
    let (_tmp, cfg, docs) = setup();
    let path = write_fiscal_pdf(&docs);
    let index = Arc::new(MemoryIndex::new());

    run_ingest(&cfg, index.clone(), &docs, false).await;

    std::fs::write(
        &path,
        pdf_with_pages(&["A revised edition with entirely different figures throughout."]),
    )
    .unwrap();

    let second = run_ingest(&cfg, index.clone(), &docs, false).await;
    assert_eq!(second.details[0].status, FileStatus::Succeeded);
    assert_eq!(second.details[0].pages, 1);
}

#[tokio::test]
async fn test_empty_pdf_is_reported_not_failed() {
    let (_tmp, cfg, docs) = setup();
    std::fs::write(docs.join("blank.pdf"), pdf_with_pages(&[" "])).unwrap();
    let index = Arc::new(MemoryIndex::new());

    let report = run_ingest(&cfg, index.clone(), &docs, false).await;
    assert_eq!(report.status, "success");
    assert_eq!(report.details[0].status, FileStatus::Empty);
    assert_eq!(report.details[0].chunks, 0);
    assert!(index.is_empty());

    // Empty files are cached too; the re-run skips them.
    let second = run_ingest(&cfg, index, &docs, false).await;
    assert_eq!(second.details[0].status, FileStatus::Skipped);
}

#[tokio::test]
async fn test_failed_upsert_batches_leave_file_succeeded() {
    let (_tmp, cfg, docs) = setup();
    write_fiscal_pdf(&docs);

    let ingestor = Ingestor::new(&cfg, Arc::new(HashEmbedder), Arc::new(BrokenIndex));
    let report = ingestor.run(&docs, false, false).await.unwrap();

    // Batches are independent; losing some (here, all) still counts the
    // file as ingested, with the shortfall visible in vectors_added.
    assert_eq!(report.status, "success");
    assert_eq!(report.details[0].status, FileStatus::Succeeded);
    assert_eq!(report.details[0].vectors_added, 0);
    assert!(report.details[0].chunks > 0);

    // The fingerprint was recorded, so the next run skips the file.
    let retry = run_ingest(&cfg, Arc::new(MemoryIndex::new()), &docs, false).await;
    assert_eq!(retry.details[0].status, FileStatus::Skipped);
}

#[tokio::test]
async fn test_corrupt_pdf_fails_that_file_only() {
    let (_tmp, cfg, docs) = setup();
    std::fs::write(docs.join("broken.pdf"), b"not a pdf at all").unwrap();
    write_fiscal_pdf(&docs);
    let index = Arc::new(MemoryIndex::new());

    let report = run_ingest(&cfg, index, &docs, false).await;
    assert_eq!(report.status, "partial");
    assert_eq!(report.errors, 1);
    assert_eq!(report.documents_ingested, 1);

    let broken = report
        .details
        .iter()
        .find(|r| r.filename == "broken.pdf")
        .unwrap();
    assert_eq!(broken.status, FileStatus::Failed);
    assert!(broken.error.is_some());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let (_tmp, cfg, docs) = setup();
    write_fiscal_pdf(&docs);
    let index = Arc::new(MemoryIndex::new());

    let ingestor = Ingestor::new(&cfg, Arc::new(HashEmbedder), index.clone());
    let report = ingestor.run(&docs, false, true).await.unwrap();
    assert_eq!(report.details[0].status, FileStatus::Succeeded);
    assert!(report.details[0].chunks > 0);
    assert!(index.is_empty());
    assert!(!cfg.ingest.cache_path.exists());
}

#[tokio::test]
async fn test_page_metadata_survives_the_round_trip() {
    let (_tmp, cfg, docs) = setup();
    write_fiscal_pdf(&docs);
    let index = Arc::new(MemoryIndex::new());

    run_ingest(&cfg, index.clone(), &docs, false).await;

    let all = index
        .similarity_search(&hash_embedding("anything"), 100)
        .await
        .unwrap();
    let mut pages: Vec<u32> = all.iter().map(|c| c.metadata.page_number).collect();
    pages.sort();
    pages.dedup();
    assert_eq!(pages, vec![1, 2]);
    for chunk in &all {
        assert_eq!(chunk.metadata.doc_name, "fiscal.pdf");
        assert_eq!(chunk.metadata.source, "local_pdf");
        assert!(chunk
            .metadata
            .doc_id
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }
}

#[tokio::test]
async fn test_question_flows_to_scrubbed_answer_with_sources() {
    let (_tmp, cfg, docs) = setup();
    write_fiscal_pdf(&docs);
    let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder);

    let ingestor = Ingestor::new(&cfg, embedder.clone(), index.clone());
    ingestor.run(&docs, false, false).await.unwrap();

    let engine = ChatEngine::with_components(&cfg, Arc::new(ScriptedModel), embedder, index);
    let question = "What is the projected fiscal deficit for this year?";
    let response = engine.answer(question, &[]).await.unwrap();

    assert_eq!(response.answer, "The projected deficit is 4.4 percent.");
    assert_eq!(response.detected_language, "en");
    assert_eq!(response.retrieval_query, question);
    assert!(!response.sources.is_empty());
    assert_eq!(response.sources[0].doc_name, "fiscal.pdf");
}

/// Records how many history turns each pipeline stage was handed.
struct TurnCountingModel {
    contextualize_turns: std::sync::Mutex<Option<usize>>,
    generation_turns: std::sync::Mutex<Option<usize>>,
}

impl TurnCountingModel {
    fn new() -> Self {
        Self {
            contextualize_turns: std::sync::Mutex::new(None),
            generation_turns: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChatModel for TurnCountingModel {
    async fn generate(
        &self,
        system: &str,
        history: &[ConversationTurn],
        input: &str,
        _temperature: f32,
    ) -> Result<String> {
        if system.contains("Context from documents") {
            *self.generation_turns.lock().unwrap() = Some(history.len());
            Ok("An answer.".to_string())
        } else {
            *self.contextualize_turns.lock().unwrap() = Some(history.len());
            Ok(input.to_string())
        }
    }
}

#[tokio::test]
async fn test_history_window_bounds_contextualization_and_generation() {
    let (_tmp, cfg, _docs) = setup();
    let model = Arc::new(TurnCountingModel::new());
    let engine = ChatEngine::with_components(
        &cfg,
        model.clone(),
        Arc::new(HashEmbedder),
        Arc::new(MemoryIndex::new()),
    );

    let history: Vec<ConversationTurn> = (0..12)
        .map(|i| ConversationTurn::user(format!("turn {}", i)))
        .collect();
    engine.answer("and the year before that", &history).await.unwrap();

    // history_limit defaults to 8; both stages must see the same window.
    assert_eq!(*model.contextualize_turns.lock().unwrap(), Some(8));
    assert_eq!(*model.generation_turns.lock().unwrap(), Some(8));
}

#[tokio::test]
async fn test_session_title() {
    let (_tmp, cfg, _docs) = setup();
    let engine = ChatEngine::with_components(
        &cfg,
        Arc::new(ScriptedModel),
        Arc::new(HashEmbedder),
        Arc::new(MemoryIndex::new()),
    );
    assert_eq!(engine.title_for("what about the deficit").await, "Deficit question");
}
