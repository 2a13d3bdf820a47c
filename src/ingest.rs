//! Idempotent PDF ingestion.
//!
//! Scans a directory for PDFs, fingerprints each file, and skips anything
//! already ingested at the same content. Changed or forced files are chunked,
//! embedded, and upserted under stable vector IDs so re-ingestion overwrites
//! in place. One bad file never aborts the run; it is reported and the run
//! continues.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_pages;
use crate::config::{ChunkingConfig, Config};
use crate::embedding::EmbeddingProvider;
use crate::ids;
use crate::index::VectorIndex;
use crate::models::{
    ChunkMetadata, FileReport, FileStatus, IngestReport, VectorRecord,
};
use crate::pdf::load_pdf_pages;

const SOURCE_LOCAL_PDF: &str = "local_pdf";

/// Filename → content fingerprint cache, persisted as JSON next to the
/// corpus. A missing or unreadable cache degrades to "nothing processed yet".
pub struct ProcessedFiles {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl ProcessedFiles {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "processed-files cache is corrupt, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, entries }
    }

    pub fn matches(&self, filename: &str, fingerprint: &str) -> bool {
        self.entries.get(filename).map(String::as_str) == Some(fingerprint)
    }

    pub fn record(&mut self, filename: &str, fingerprint: &str) {
        self.entries
            .insert(filename.to_string(), fingerprint.to_string());
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache {}", self.path.display()))
    }
}

/// All `.pdf` files directly inside `dir` (no recursion), sorted by path so
/// runs are deterministic.
pub fn scan_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Source directory does not exist: {}", dir.display());
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Drives an ingestion run over a directory of PDFs.
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
    upsert_batch_size: usize,
    cache_path: PathBuf,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            embedder,
            index,
            chunking: config.chunking.clone(),
            upsert_batch_size: config.ingest.upsert_batch_size,
            cache_path: PathBuf::from(&config.ingest.cache_path),
        }
    }

    /// Ingest every PDF under `dir`. `force` re-ingests files whose
    /// fingerprints match the cache, deleting their old vectors first.
    /// `dry_run` chunks and reports but never embeds, upserts, or touches
    /// the cache.
    pub async fn run(&self, dir: &Path, force: bool, dry_run: bool) -> Result<IngestReport> {
        let started_at = Utc::now();
        let paths = scan_pdfs(dir)?;
        info!(dir = %dir.display(), files = paths.len(), force, dry_run, "starting ingestion");

        let mut cache = ProcessedFiles::load(&self.cache_path);
        let mut details = Vec::with_capacity(paths.len());

        for path in &paths {
            let report = self.process_file(path, &mut cache, force, dry_run).await;
            if !dry_run && report.status != FileStatus::Skipped {
                if let Err(e) = cache.save() {
                    warn!(error = %e, "failed to persist processed-files cache");
                }
            }
            details.push(report);
        }

        let documents_ingested = details
            .iter()
            .filter(|r| r.status == FileStatus::Succeeded)
            .count();
        let total_chunks = details.iter().map(|r| r.chunks).sum();
        let errors = details
            .iter()
            .filter(|r| r.status == FileStatus::Failed)
            .count();

        let status = if errors == 0 { "success" } else { "partial" };
        info!(documents_ingested, total_chunks, errors, status, "ingestion finished");

        Ok(IngestReport {
            status: status.to_string(),
            documents_ingested,
            total_chunks,
            errors,
            details,
            started_at: Some(started_at),
        })
    }

    async fn process_file(
        &self,
        path: &Path,
        cache: &mut ProcessedFiles,
        force: bool,
        dry_run: bool,
    ) -> FileReport {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let fingerprint = match ids::file_fingerprint(path) {
            Ok(fp) => fp,
            Err(e) => return failed(filename, None, e),
        };

        let doc_id = ids::doc_id(&filename, &fingerprint);

        if !force && cache.matches(&filename, &fingerprint) {
            info!(file = %filename, "unchanged, skipping");
            return FileReport {
                filename,
                status: FileStatus::Skipped,
                doc_id: Some(doc_id),
                pages: 0,
                chunks: 0,
                vectors_added: 0,
                error: None,
            };
        }

        let pages = match load_pdf_pages(path) {
            Ok(pages) => pages,
            Err(e) => return failed(filename, Some(doc_id), e),
        };

        if pages.is_empty() {
            warn!(file = %filename, "no extractable text");
            if !dry_run {
                cache.record(&filename, &fingerprint);
            }
            return FileReport {
                filename,
                status: FileStatus::Empty,
                doc_id: Some(doc_id),
                pages: 0,
                chunks: 0,
                vectors_added: 0,
                error: None,
            };
        }

        let chunks = chunk_pages(&pages, self.chunking.chunk_size, self.chunking.chunk_overlap);
        info!(file = %filename, pages = pages.len(), chunks = chunks.len(), "chunked");

        if dry_run {
            return FileReport {
                filename,
                status: FileStatus::Succeeded,
                doc_id: Some(doc_id),
                pages: pages.len(),
                chunks: chunks.len(),
                vectors_added: 0,
                error: None,
            };
        }

        // Forced re-ingestion replaces whatever is stored for this document.
        // Stable IDs already overwrite matching chunks; the delete clears
        // stale vectors left over from a previous, longer version.
        if force {
            if let Err(e) = self.index.delete_by_doc_id(&doc_id).await {
                warn!(file = %filename, error = %e, "stale vector cleanup failed, continuing");
            }
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = match self.embedder.embed_documents(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => return failed(filename, Some(doc_id), e),
        };

        let ingested_at = Utc::now().to_rfc3339();
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, values)| VectorRecord {
                id: ids::vector_id(&doc_id, chunk.page_number, chunk.chunk_index),
                values,
                text: chunk.text.clone(),
                metadata: ChunkMetadata {
                    doc_id: doc_id.clone(),
                    doc_name: filename.clone(),
                    page_number: chunk.page_number,
                    chunk_index: chunk.chunk_index,
                    source: SOURCE_LOCAL_PDF.to_string(),
                    ingested_at: ingested_at.clone(),
                },
            })
            .collect();

        // Batches are independent: a failed batch is logged and skipped, and
        // the file still counts as ingested with however many vectors made
        // it in.
        let mut vectors_added = 0;
        for batch in records.chunks(self.upsert_batch_size) {
            match self.index.upsert(batch).await {
                Ok(()) => vectors_added += batch.len(),
                Err(e) => {
                    error!(file = %filename, batch = batch.len(), error = %e, "upsert batch failed, skipping");
                }
            }
        }

        cache.record(&filename, &fingerprint);
        info!(file = %filename, vectors_added, "ingested");

        FileReport {
            filename,
            status: FileStatus::Succeeded,
            doc_id: Some(doc_id),
            pages: pages.len(),
            chunks: chunks.len(),
            vectors_added,
            error: None,
        }
    }
}

fn failed(filename: String, doc_id: Option<String>, error: anyhow::Error) -> FileReport {
    error!(file = %filename, error = %error, "ingestion failed for file");
    FileReport {
        filename,
        status: FileStatus::Failed,
        doc_id,
        pages: 0,
        chunks: 0,
        vectors_added: 0,
        error: Some(error.to_string()),
    }
}
