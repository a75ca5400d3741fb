//! Domain types shared by the chunker, index, and query pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Paragraph boundary used when splitting documents into chunks.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Delimiter inserted between chunks when assembling a query context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Token-to-character approximation used by the chunker (1 token ~ 4 chars).
pub const CHARS_PER_TOKEN: usize = 4;

/// Scores at or above this band as [`Relevance::High`].
pub const RELEVANCE_HIGH: f32 = 0.80;
/// Scores at or above this (and below high) band as [`Relevance::Medium`].
pub const RELEVANCE_MEDIUM: f32 = 0.65;

/// Kind of source document a chunk was cut from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[serde(rename = "txt")]
    Text,
    #[serde(rename = "md")]
    Markdown,
    #[serde(rename = "pdf")]
    Pdf,
}

impl FileType {
    /// Map a lowercase file extension to a supported type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Coarse relevance band derived from a similarity score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl Relevance {
    /// Band a similarity score via the fixed thresholds.
    pub fn from_score(score: f32) -> Self {
        if score >= RELEVANCE_HIGH {
            Self::High
        } else if score >= RELEVANCE_MEDIUM {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Positional and provenance metadata attached to every chunk.
///
/// `start_char`/`end_char` are offsets within the emitted-chunk stream: the
/// cursor advances by each chunk's own length and is not corrected for
/// characters duplicated by overlap seeding, so offsets drift from true
/// source positions once overlap has occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub file_type: FileType,
    pub created_at: DateTime<Utc>,
    pub char_count: usize,
    pub start_char: usize,
    pub end_char: usize,
}

/// A bounded text passage plus metadata and an optional embedding.
///
/// Chunks are created without an embedding; the ingestion path attaches one
/// before indexing. A chunk whose `embedding` is `None` is excluded when
/// added to the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: ChunkMetadata,
}

/// One ranked hit from a similarity search. Built per call, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
    pub relevance: Relevance,
}
