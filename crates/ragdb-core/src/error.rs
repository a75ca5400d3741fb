//! Error types, one enum per concern.
//!
//! Every variant carries the parameters relevant to diagnosis (sizes, paths,
//! thresholds). Failures are surfaced to the caller unmodified; nothing is
//! retried or swallowed inside the core.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while splitting text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("text cannot be empty")]
    EmptyText,

    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Failures at the embedding capability boundary.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("text cannot be empty")]
    EmptyText,

    #[error("no non-blank texts in batch of {submitted}")]
    EmptyBatch { submitted: usize },

    #[error("embedding model unavailable at {path}: {reason}")]
    ModelUnavailable { path: PathBuf, reason: String },

    #[error("embedding failed for text of {text_len} chars: {reason}")]
    Inference { text_len: usize, reason: String },
}

/// Failures in the similarity index and its persistence.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("index is empty or not loaded")]
    EmptyIndex,

    #[error("no chunks with embeddings to add ({received} received)")]
    NoEmbeddedChunks { received: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("index artifact missing: {path}")]
    MissingArtifact { path: PathBuf },

    #[error("restored chunk count ({chunks}) does not match index rows ({rows})")]
    Misaligned { chunks: usize, rows: usize },

    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode {path}")]
    Codec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures while loading source documents.
#[derive(Debug, Error)]
pub enum DocumentLoadError {
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("unsupported extension \"{extension}\" for {path}")]
    UnsupportedExtension { path: PathBuf, extension: String },

    #[error("failed to read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// Top-level error surfaced by the query pipeline and evaluator.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error(transparent)]
    DocumentLoad(#[from] DocumentLoadError),

    /// Search returned zero results after score filtering. Terminal for the
    /// request; the only "legitimately empty" outcome a caller can rely on.
    #[error("no results with score >= {min_score}")]
    InsufficientResults { min_score: f32 },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A worker task was cancelled or panicked before delivering its result.
    #[error("background task failed: {reason}")]
    Background { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
