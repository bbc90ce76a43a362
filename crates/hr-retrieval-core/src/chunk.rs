//! Overlapping, boundary-preferring text chunker.
//!
//! Splits page text into passages of at most `chunk_size` characters, with
//! consecutive passages sharing roughly `chunk_overlap` characters so that a
//! sentence straddling a boundary survives intact in at least one chunk.
//!
//! # Algorithm
//!
//! 1. Open a window of `chunk_size` characters at the current start.
//! 2. If the rest of the text fits, emit it and stop.
//! 3. Otherwise cut at the last paragraph break (`\n\n`) in the window; if
//!    there is none, the last line break, then the last `". "`, then the
//!    last space, then a hard character cut at the window end.
//!    A cut is only accepted if it lies beyond `chunk_overlap` characters
//!    from the start, which guarantees forward progress.
//! 4. The next window starts `chunk_overlap` characters before the cut,
//!    nudged forward to the next word start.
//!
//! Spans are contiguous or overlapping and together cover the whole input,
//! so no character is ever dropped. Chunk *content* is trimmed of
//! surrounding whitespace; [`split_spans`] exposes the exact byte ranges.
//!
//! Tables never pass through here: each table is one chunk regardless of
//! size (see [`crate::table`]).

use std::ops::Range;

use anyhow::{bail, Result};

use crate::models::{Chunk, ChunkKind, Provenance};

pub const DEFAULT_CHUNK_SIZE: usize = 1200;
pub const DEFAULT_CHUNK_OVERLAP: usize = 250;

/// Split preference order, coarsest first. The hard cut is implicit.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Chunk sizing in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingParams {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

/// Compute the byte ranges of each chunk.
///
/// Returns no spans for empty or whitespace-only text. For any other input
/// the first span starts at 0, the last ends at `text.len()`, and each span
/// starts at or before the previous span's end.
pub fn split_spans(text: &str, params: &ChunkingParams) -> Vec<Range<usize>> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let size = params.chunk_size.max(1);
    let overlap = params.chunk_overlap.min(size - 1);

    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        let window_end = advance_chars(text, start, size);
        if window_end >= text.len() {
            spans.push(start..text.len());
            break;
        }

        let min_break = advance_chars(text, start, overlap + 1);
        let end = find_break(text, start, min_break, window_end);
        spans.push(start..end);
        start = overlap_start(text, start, end, overlap);
    }

    spans
}

/// Split text into trimmed, non-empty passages.
pub fn split_text(text: &str, params: &ChunkingParams) -> Vec<String> {
    split_spans(text, params)
        .into_iter()
        .map(|span| text[span].trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Chunk one page of prose, assigning sequence indices from `next_index`.
pub fn chunk_page(
    source_document: &str,
    page: u32,
    text: &str,
    params: &ChunkingParams,
    next_index: &mut u32,
) -> Vec<Chunk> {
    split_text(text, params)
        .into_iter()
        .map(|content| {
            let chunk = Chunk {
                content,
                provenance: Provenance::new(source_document, page),
                kind: ChunkKind::Text,
                sequence_index: *next_index,
            };
            *next_index += 1;
            chunk
        })
        .collect()
}

/// Byte offset reached by moving `n` characters forward from `from`.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

/// Byte offset reached by moving `n` characters back from `to`.
fn retreat_chars(text: &str, to: usize, n: usize) -> usize {
    if n == 0 {
        return to;
    }
    text[..to]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn find_break(text: &str, start: usize, min_break: usize, window_end: usize) -> usize {
    let window = &text[start..window_end];
    for sep in SEPARATORS {
        if let Some(pos) = window.rfind(sep) {
            let cut = start + pos + sep.len();
            if cut >= min_break {
                return cut;
            }
        }
    }
    window_end
}

fn overlap_start(text: &str, start: usize, end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }
    // `end` lies more than `overlap` characters past `start`, so this stays ahead of it.
    let candidate = retreat_chars(text, end, overlap);
    debug_assert!(candidate > start);

    let at_word_start = text[..candidate]
        .chars()
        .next_back()
        .is_some_and(char::is_whitespace);
    if at_word_start {
        return candidate;
    }

    // Begin the overlap at a word rather than mid-word.
    match text[candidate..end].find(char::is_whitespace) {
        Some(ws) => {
            let after = advance_chars(text, candidate + ws, 1);
            if after < end {
                after
            } else {
                candidate
            }
        }
        None => candidate,
    }
}
