//! Separator-priority text chunker.
//!
//! Splits page text into chunks that respect a configurable maximum length,
//! with up to `chunk_overlap` characters shared between consecutive chunks.
//! Splitting prefers boundaries in this order: paragraph break (`\n\n`),
//! line break (`\n`), sentence end (`". "`), plain space, and finally a hard
//! character cut — falling back to the next separator only when the
//! preferred one cannot produce fitting pieces.
//!
//! Lengths are measured in Unicode scalar values so multilingual text is
//! counted the same way regardless of encoding width. Each chunk is
//! assigned a 0-based index per source page in split order.

use std::collections::VecDeque;

use crate::models::{Chunk, PageRecord};

/// Boundary preference ladder. A hard character cut is the implicit last
/// resort when none of these occur in an oversized piece.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split a single page's text into chunk strings.
///
/// Empty or whitespace-only input yields an empty sequence. No returned
/// chunk exceeds `chunk_size` characters; consecutive chunks share at most
/// `chunk_overlap` characters. `chunk_overlap` must be smaller than
/// `chunk_size` (enforced by config validation).
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    debug_assert!(chunk_overlap < chunk_size);

    if text.trim().is_empty() {
        return Vec::new();
    }

    split_recursive(text, chunk_size, chunk_overlap, &SEPARATORS)
}

/// Chunk every page of a document, assigning position-local indices
/// starting at 0 on each page.
pub fn chunk_pages(pages: &[PageRecord], chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in pages {
        for (i, text) in split_text(&page.text, chunk_size, chunk_overlap)
            .into_iter()
            .enumerate()
        {
            chunks.push(Chunk {
                page_number: page.page_number,
                chunk_index: i as u32,
                text,
            });
        }
    }

    chunks
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursively split on the highest-priority separator present, merging
/// fitting pieces and descending a level for oversized ones.
fn split_recursive(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    // First separator that actually occurs in this text wins; the rest
    // remain available for oversized pieces.
    let chosen = separators.iter().position(|sep| text.contains(sep));

    let (sep, remaining) = match chosen {
        Some(i) => (separators[i], &separators[i + 1..]),
        None => return split_hard(text, chunk_size, chunk_overlap),
    };

    let splits = split_keeping_separator(text, sep);

    let mut out = Vec::new();
    let mut fitting: Vec<String> = Vec::new();

    for piece in splits {
        if char_len(&piece) < chunk_size {
            fitting.push(piece);
        } else {
            // Flush the fitting run before handling the oversized piece so
            // output order matches input order.
            if !fitting.is_empty() {
                out.extend(merge_splits(&fitting, chunk_size, chunk_overlap));
                fitting.clear();
            }
            if remaining.is_empty() {
                out.extend(split_hard(&piece, chunk_size, chunk_overlap));
            } else {
                out.extend(split_recursive(&piece, chunk_size, chunk_overlap, remaining));
            }
        }
    }

    if !fitting.is_empty() {
        out.extend(merge_splits(&fitting, chunk_size, chunk_overlap));
    }

    out
}

/// Split on `sep`, attaching the separator to the piece that follows it so
/// concatenating the pieces reconstructs the input exactly.
fn split_keeping_separator(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut first = true;

    for part in text.split(sep) {
        let piece = if first {
            first = false;
            part.to_string()
        } else {
            format!("{}{}", sep, part)
        };
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }

    pieces
}

/// Greedily pack fitting pieces into chunks up to `chunk_size`, carrying a
/// tail of at most `chunk_overlap` characters into the next chunk.
fn merge_splits(splits: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: VecDeque<&String> = VecDeque::new();
    let mut total = 0usize;

    for piece in splits {
        let len = char_len(piece);

        if total + len > chunk_size && !current.is_empty() {
            push_joined(&mut chunks, &current);

            // Shed from the front until within the overlap budget and the
            // incoming piece fits.
            while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                if let Some(front) = current.pop_front() {
                    total -= char_len(front);
                } else {
                    break;
                }
            }
        }

        current.push_back(piece);
        total += len;
    }

    push_joined(&mut chunks, &current);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, pieces: &VecDeque<&String>) {
    let joined: String = pieces.iter().map(|s| s.as_str()).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Hard character cut for text with no usable boundary: fixed-size windows
/// stepping by `chunk_size - chunk_overlap`.
fn split_hard(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}
