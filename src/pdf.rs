//! Per-page PDF text extraction.
//!
//! Pages are numbered before empty-page filtering, so the page numbers
//! carried into vector metadata always match the physical PDF page.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::models::PageRecord;

/// Load a PDF and extract its text page by page, dropping pages with no
/// extractable text. An empty result is a valid outcome (scanned or
/// image-only PDFs), not an error.
pub fn load_pdf_pages(path: &Path) -> Result<Vec<PageRecord>> {
    info!(path = %path.display(), "loading PDF");

    let pages = pdf_extract::extract_text_by_pages(path)
        .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

    let records: Vec<PageRecord> = pages
        .into_iter()
        .enumerate()
        .filter_map(|(i, text)| {
            if text.trim().is_empty() {
                debug!(page = i + 1, "skipping empty page");
                None
            } else {
                Some(PageRecord {
                    page_number: (i + 1) as u32,
                    text,
                })
            }
        })
        .collect();

    info!(
        path = %path.display(),
        pages = records.len(),
        "extracted non-empty pages"
    );

    Ok(records)
}
