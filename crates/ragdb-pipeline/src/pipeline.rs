//! One-query RAG pipeline: embed, search, aggregate a bounded context.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::task;
use tracing::info;

use ragdb_core::config::Settings;
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_core::types::{SearchResult, CONTEXT_SEPARATOR};
use ragdb_index::VectorStore;

/// Shared handle to the store: many concurrent searching readers, one
/// writer during ingestion or reload.
pub type SharedStore = Arc<RwLock<VectorStore>>;

/// A leftover budget at or below this is not worth filling with a fragment.
const MIN_TRUNCATION_BUDGET: usize = 100;
/// Marker appended to a chunk that was cut to fit the remaining budget.
const ELLIPSIS: &str = "...";

/// Aggregate numbers for one processed query.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub chunk_count: usize,
    pub total_chars: usize,
    pub avg_score: f32,
    pub sources_count: usize,
}

/// Everything the caller gets back for one query.
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub query: String,
    pub context: String,
    pub sources: Vec<String>,
    pub scores: Vec<f32>,
    pub chunk_count: usize,
    pub metadata: ResponseMetadata,
}

/// Owned handles to the embedding capability and the shared store.
/// Constructed once at startup and injected wherever queries are served.
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    store: SharedStore,
    max_context_length: usize,
    default_top_k: usize,
    default_min_score: f32,
}

impl RagPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, store: SharedStore, settings: &Settings) -> Self {
        Self {
            embedder,
            store,
            max_context_length: settings.max_context_length,
            default_top_k: settings.default_top_k,
            default_min_score: settings.min_similarity_score,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Run one query end to end.
    ///
    /// Embedding and the index scan are CPU-bound and run on the blocking
    /// pool; the calling task is suspended until each completes. Within a
    /// query, embed always finishes before search starts.
    ///
    /// Zero surviving results is terminal for the request and reported as
    /// [`Error::InsufficientResults`] with the threshold that was applied.
    pub async fn process(
        &self,
        query: &str,
        k: usize,
        min_score: Option<f32>,
    ) -> Result<RagResponse> {
        info!(query, k, "rag query");
        let min_score = min_score.unwrap_or(self.default_min_score);

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let query_vec = task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| Error::Background {
                reason: e.to_string(),
            })??;

        let store = Arc::clone(&self.store);
        let results = task::spawn_blocking(move || {
            let guard = store.read().unwrap_or_else(|e| e.into_inner());
            guard.search(&query_vec, k, Some(min_score))
        })
        .await
        .map_err(|e| Error::Background {
            reason: e.to_string(),
        })??;

        if results.is_empty() {
            return Err(Error::InsufficientResults { min_score });
        }

        let context = aggregate_context(&results, self.max_context_length);
        let sources = extract_sources(&results);
        let scores: Vec<f32> = results.iter().map(|r| r.score).collect();

        let metadata = ResponseMetadata {
            chunk_count: results.len(),
            total_chars: context.chars().count(),
            avg_score: scores.iter().sum::<f32>() / scores.len() as f32,
            sources_count: sources.len(),
        };

        info!(
            chunks = results.len(),
            chars = metadata.total_chars,
            "rag query complete"
        );

        Ok(RagResponse {
            query: query.to_string(),
            context,
            sources,
            scores,
            chunk_count: results.len(),
            metadata,
        })
    }
}

/// Concatenate result texts, best first, under a character budget.
///
/// The first chunk that would overflow is truncated to the leftover budget
/// (with an ellipsis marker) only when more than [`MIN_TRUNCATION_BUDGET`]
/// characters remain; aggregation stops there either way. Separators are
/// not counted against the budget.
fn aggregate_context(results: &[SearchResult], max_length: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;

    for result in results {
        let text = &result.chunk.text;
        let len = text.chars().count();

        if total + len > max_length {
            let remaining = max_length - total;
            if remaining > MIN_TRUNCATION_BUDGET {
                let truncated: String = text.chars().take(remaining).collect();
                parts.push(format!("{truncated}{ELLIPSIS}"));
            }
            break;
        }

        parts.push(text.clone());
        total += len;
    }

    parts.join(CONTEXT_SEPARATOR)
}

/// Distinct source ids in first-seen order, read from ALL returned results,
/// including chunks the length budget excluded from the context. This can
/// overstate what the context actually contains.
fn extract_sources(results: &[SearchResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for result in results {
        let source = &result.chunk.metadata.source;
        if seen.insert(source.clone()) {
            sources.push(source.clone());
        }
    }
    sources
}
