//! Paragraph-accumulating chunker with sliding-window overlap.

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::Settings;
use crate::error::ChunkingError;
use crate::types::{Chunk, ChunkMetadata, FileType, CHARS_PER_TOKEN, PARAGRAPH_SEPARATOR};

/// Splits raw text into overlapping passages with bounded size.
///
/// Sizes are token-oriented and converted to characters with the fixed
/// 1 token ~ 4 chars approximation; this is a heuristic, not tokenization.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

/// Introspection numbers for a text, before any chunking happens.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkStats {
    pub chars: usize,
    pub estimated_tokens: usize,
    pub estimated_chunks: usize,
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Chunker {
    pub fn new(settings: &Settings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            overlap: settings.chunk_overlap,
        }
    }

    pub fn with_params(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Split `text` into chunks with metadata.
    ///
    /// `chunk_size`/`overlap` override the configured defaults for this call
    /// only, in token units. Fails on empty input and on `overlap >=
    /// chunk_size`.
    pub fn chunk(
        &self,
        text: &str,
        source: &str,
        file_type: FileType,
        chunk_size: Option<usize>,
        overlap: Option<usize>,
    ) -> Result<Vec<Chunk>, ChunkingError> {
        if text.trim().is_empty() {
            return Err(ChunkingError::EmptyText);
        }

        let chunk_size = chunk_size.unwrap_or(self.chunk_size);
        let overlap = overlap.unwrap_or(self.overlap);
        if overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                chunk_size,
                overlap,
            });
        }

        info!(source, chunk_size, overlap, "chunking document");

        let char_budget = chunk_size * CHARS_PER_TOKEN;
        let char_overlap = overlap * CHARS_PER_TOKEN;

        let pieces = split_by_chars(text, char_budget, char_overlap);
        let total_chunks = pieces.len();
        let created_at = Utc::now();

        let mut chunks = Vec::with_capacity(total_chunks);
        // Running cursor over the emitted-chunk stream. Advanced by each
        // chunk's own length, so overlapped characters are counted twice and
        // offsets drift from true source positions.
        let mut cursor = 0usize;
        for (chunk_index, piece) in pieces.into_iter().enumerate() {
            let char_count = piece.chars().count();
            let metadata = ChunkMetadata {
                source: source.to_string(),
                chunk_index,
                total_chunks,
                file_type,
                created_at,
                char_count,
                start_char: cursor,
                end_char: cursor + char_count,
            };
            cursor += char_count;
            chunks.push(Chunk {
                id: format!("{source}_chunk_{chunk_index}"),
                text: piece.trim().to_string(),
                embedding: None,
                metadata,
            });
        }

        info!(source, count = chunks.len(), "chunks created");
        Ok(chunks)
    }

    /// Size estimates for `text`; no side effects.
    pub fn stats(&self, text: &str) -> ChunkStats {
        let chars = text.chars().count();
        let estimated_tokens = chars / CHARS_PER_TOKEN;
        let estimated_chunks = std::cmp::max(1, estimated_tokens / self.chunk_size);
        ChunkStats {
            chars,
            estimated_tokens,
            estimated_chunks,
            chunk_size: self.chunk_size,
            overlap: self.overlap,
        }
    }
}

/// Character-budget splitter. Sizes here are already in characters.
///
/// Accumulates paragraphs into a buffer; when the next paragraph would
/// overflow the budget the buffer is emitted and the new buffer is seeded
/// with the last `overlap` characters of it. A lone paragraph bigger than
/// the whole budget is hard-split into windows with stride
/// `chunk_size - overlap`.
fn split_by_chars(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split(PARAGRAPH_SEPARATOR) {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }
        let para_len = para.chars().count();
        let current_len = current.chars().count();

        // +2 accounts for the separator that joining would insert.
        if current_len + para_len + 2 > chunk_size {
            if !current.is_empty() {
                let seed = tail_chars(&current, overlap);
                chunks.push(std::mem::take(&mut current));
                current = format!("{seed}{PARAGRAPH_SEPARATOR}{para}");
            } else if para_len > chunk_size {
                hard_split_into(&mut chunks, para, chunk_size, overlap);
            } else {
                current = para.to_string();
            }
        } else if current.is_empty() {
            current = para.to_string();
        } else {
            current.push_str(PARAGRAPH_SEPARATOR);
            current.push_str(para);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Fixed-size character windows; consecutive windows share `overlap` chars.
fn hard_split_into(chunks: &mut Vec<String>, para: &str, chunk_size: usize, overlap: usize) {
    let chars: Vec<char> = para.chars().collect();
    let stride = chunk_size - overlap;
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        start += stride;
    }
}

/// Last `n` characters of `s` (whole string if shorter).
fn tail_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    if count <= n {
        s.to_string()
    } else {
        s.chars().skip(count - n).collect()
    }
}
