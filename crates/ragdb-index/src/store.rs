//! Vector store: flat index + parallel chunk records + persistence.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use ragdb_core::config::Settings;
use ragdb_core::error::VectorStoreError;
use ragdb_core::types::{Chunk, Relevance, SearchResult};

use crate::flat::{l2_normalize, FlatIpIndex};

/// Whether an index is present. `Empty` makes "search before load/add"
/// a checked state instead of a nullable field.
///
/// `add` is all-or-nothing, so no intermediate building state can ever be
/// observed and none is represented.
#[derive(Debug, Clone)]
pub enum IndexState {
    Empty,
    Ready(FlatIpIndex),
}

/// Chunk records and their vectors, in exact 1:1 positional correspondence.
///
/// Invariant: after any successful mutation, `chunks.len()` equals the
/// index row count. A failed `add` leaves the store unchanged.
///
/// Mutations take `&mut self`; concurrent use goes through an external
/// `RwLock` (one writer, many searching readers).
#[derive(Debug)]
pub struct VectorStore {
    state: IndexState,
    chunks: Vec<Chunk>,
    dimension: usize,
    normalize: bool,
    min_score: f32,
    vectors_path: PathBuf,
    chunks_path: PathBuf,
}

impl VectorStore {
    pub fn new(settings: &Settings) -> Self {
        Self {
            state: IndexState::Empty,
            chunks: Vec::new(),
            dimension: settings.embedding_dimension,
            normalize: settings.normalize_embeddings,
            min_score: settings.min_similarity_score,
            vectors_path: settings.vectors_path(),
            chunks_path: settings.chunks_path(),
        }
    }

    /// Add embedded chunks to the index.
    ///
    /// Chunks without an embedding are dropped first; fails if none remain
    /// or if any surviving embedding has the wrong dimension. Validation
    /// happens before any mutation, so a failing call changes nothing.
    /// Returns the number of chunks actually indexed.
    pub fn add(&mut self, chunks: Vec<Chunk>) -> Result<usize, VectorStoreError> {
        let received = chunks.len();
        let valid: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| c.embedding.is_some())
            .collect();
        if valid.is_empty() {
            return Err(VectorStoreError::NoEmbeddedChunks { received });
        }

        let mut rows: Vec<Vec<f32>> = Vec::with_capacity(valid.len());
        for chunk in &valid {
            let embedding = chunk.embedding.as_deref().unwrap_or_default();
            if embedding.len() != self.dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: self.dimension,
                    got: embedding.len(),
                });
            }
            let mut row = embedding.to_vec();
            if self.normalize {
                // Inner product over unit vectors == cosine similarity.
                l2_normalize(&mut row);
            }
            rows.push(row);
        }

        match &mut self.state {
            IndexState::Ready(index) => index.push_rows(&rows),
            IndexState::Empty => {
                let mut index = FlatIpIndex::new(self.dimension);
                index.push_rows(&rows);
                self.state = IndexState::Ready(index);
            }
        }
        let added = valid.len();
        self.chunks.extend(valid);

        info!(added, total = self.chunks.len(), "chunks indexed");
        Ok(added)
    }

    /// Exact top-`k` search with score filtering and relevance banding.
    ///
    /// `min_score` defaults to the configured similarity threshold. The
    /// index is asked for `min(2k, n)` candidates to leave headroom for the
    /// filter; if fewer than `k` survive, the result is simply shorter and
    /// no backfill is attempted. Results come back in descending score order.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        min_score: Option<f32>,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let index = match &self.state {
            IndexState::Ready(index) if !self.chunks.is_empty() => index,
            _ => return Err(VectorStoreError::EmptyIndex),
        };
        if query.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        let min_score = min_score.unwrap_or(self.min_score);

        let mut query = query.to_vec();
        if self.normalize {
            l2_normalize(&mut query);
        }

        let search_k = std::cmp::min(2 * k, self.chunks.len());
        let mut results = Vec::new();
        for (row, score) in index.search(&query, search_k) {
            if score < min_score {
                continue;
            }
            let chunk = self.chunks[row].clone();
            results.push(SearchResult {
                chunk,
                score,
                relevance: Relevance::from_score(score),
            });
            if results.len() == k {
                break;
            }
        }

        info!(count = results.len(), min_score, "search complete");
        Ok(results)
    }

    /// Persist the matrix and the chunk sequence as two paired artifacts.
    ///
    /// Each artifact is written to a temp file and renamed into place, so a
    /// concurrent reader never observes a half-written file.
    pub fn save(&self) -> Result<(), VectorStoreError> {
        let index = match &self.state {
            IndexState::Ready(index) => index,
            IndexState::Empty => return Err(VectorStoreError::EmptyIndex),
        };

        if let Some(parent) = self.vectors_path.parent() {
            fs::create_dir_all(parent).map_err(|e| VectorStoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        write_json_atomic(&self.vectors_path, index)?;
        write_json_atomic(&self.chunks_path, &self.chunks)?;

        info!(
            vectors = %self.vectors_path.display(),
            chunks = %self.chunks_path.display(),
            "index saved"
        );
        Ok(())
    }

    /// Restore both artifacts, replacing any in-memory state.
    ///
    /// Fails if either artifact is missing, and hard-fails if the restored
    /// chunk count disagrees with the restored row count; a silent mismatch
    /// would pair scores with the wrong chunks.
    pub fn load(&mut self) -> Result<(), VectorStoreError> {
        for path in [&self.vectors_path, &self.chunks_path] {
            if !path.exists() {
                return Err(VectorStoreError::MissingArtifact { path: path.clone() });
            }
        }

        let index: FlatIpIndex = read_json(&self.vectors_path)?;
        let chunks: Vec<Chunk> = read_json(&self.chunks_path)?;

        if index.dimension() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                got: index.dimension(),
            });
        }
        if chunks.len() != index.rows() {
            return Err(VectorStoreError::Misaligned {
                chunks: chunks.len(),
                rows: index.rows(),
            });
        }

        self.state = IndexState::Ready(index);
        self.chunks = chunks;
        info!(total = self.chunks.len(), "index loaded");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, IndexState::Ready(_)) && !self.chunks.is_empty()
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Default score threshold applied when a search passes `None`.
    pub fn default_min_score(&self) -> f32 {
        self.min_score
    }

    pub fn clear(&mut self) {
        self.state = IndexState::Empty;
        self.chunks.clear();
        info!("index cleared");
    }
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), VectorStoreError> {
    let payload = serde_json::to_vec(value).map_err(|e| VectorStoreError::Codec {
        path: path.to_path_buf(),
        source: e,
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    fs::write(&tmp_path, payload).map_err(|e| VectorStoreError::Io {
        path: tmp_path.clone(),
        source: e,
    })?;
    fs::rename(&tmp_path, path).map_err(|e| VectorStoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, VectorStoreError> {
    let raw = fs::read(path).map_err(|e| VectorStoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&raw).map_err(|e| VectorStoreError::Codec {
        path: path.to_path_buf(),
        source: e,
    })
}
