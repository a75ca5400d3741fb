//! Retrieval-quality evaluation over labeled queries.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::info;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;

use crate::pipeline::SharedStore;

/// One labeled query: the text plus the sources a perfect retrieval would
/// surface.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalQuery {
    pub query: String,
    pub expected_sources: Vec<String>,
}

/// Per-query evaluation detail.
#[derive(Debug, Clone, Serialize)]
pub struct QueryEvaluation {
    pub query: String,
    pub recall: f32,
    pub precision: f32,
    pub avg_score: f32,
    pub found_sources: Vec<String>,
    pub expected_sources: Vec<String>,
    pub retrieved_count: usize,
}

/// Macro-averaged metrics over the whole batch, 3-decimal rounded.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub recall_at_k: f32,
    pub precision_at_k: f32,
    pub avg_similarity: f32,
    pub total_queries: usize,
    pub details: Vec<QueryEvaluation>,
}

/// Runs labeled queries through the same embed+search path as the pipeline.
pub struct Evaluator {
    embedder: Arc<dyn Embedder>,
    store: SharedStore,
}

impl Evaluator {
    pub fn new(embedder: Arc<dyn Embedder>, store: SharedStore) -> Self {
        Self { embedder, store }
    }

    /// Evaluate `queries` at cutoff `k`.
    ///
    /// Searches run unfiltered (`min_score = 0`) so the numbers measure raw
    /// ranking quality rather than threshold effects. Each query is weighted
    /// equally in the averages regardless of how many results it returned.
    pub async fn evaluate(&self, queries: &[EvalQuery], k: usize) -> Result<EvalReport> {
        info!(count = queries.len(), k, "evaluating queries");

        if queries.is_empty() {
            return Ok(EvalReport {
                recall_at_k: 0.0,
                precision_at_k: 0.0,
                avg_similarity: 0.0,
                total_queries: 0,
                details: Vec::new(),
            });
        }

        let mut total_recall = 0.0f32;
        let mut total_precision = 0.0f32;
        let mut total_similarity = 0.0f32;
        let mut details = Vec::with_capacity(queries.len());

        for item in queries {
            let expected: HashSet<String> = item.expected_sources.iter().cloned().collect();

            let embedder = Arc::clone(&self.embedder);
            let text = item.query.clone();
            let query_vec = task::spawn_blocking(move || embedder.embed(&text))
                .await
                .map_err(|e| Error::Background {
                    reason: e.to_string(),
                })??;

            let store = Arc::clone(&self.store);
            let results = task::spawn_blocking(move || {
                let guard = store.read().unwrap_or_else(|e| e.into_inner());
                guard.search(&query_vec, k, Some(0.0))
            })
            .await
            .map_err(|e| Error::Background {
                reason: e.to_string(),
            })??;

            let found: HashSet<String> = results
                .iter()
                .map(|r| r.chunk.metadata.source.clone())
                .collect();

            let query_recall = recall(&expected, &found);
            let query_precision = precision(&expected, &found);
            let avg_score = if results.is_empty() {
                0.0
            } else {
                results.iter().map(|r| r.score).sum::<f32>() / results.len() as f32
            };

            total_recall += query_recall;
            total_precision += query_precision;
            total_similarity += avg_score;

            details.push(QueryEvaluation {
                query: item.query.clone(),
                recall: round3(query_recall),
                precision: round3(query_precision),
                avg_score: round3(avg_score),
                found_sources: sorted(found),
                expected_sources: sorted(expected),
                retrieved_count: results.len(),
            });
        }

        let n = queries.len() as f32;
        Ok(EvalReport {
            recall_at_k: round3(total_recall / n),
            precision_at_k: round3(total_precision / n),
            avg_similarity: round3(total_similarity / n),
            total_queries: queries.len(),
            details,
        })
    }
}

/// Fraction of expected sources that were retrieved. Vacuously 1.0 when
/// nothing was expected.
pub fn recall(expected: &HashSet<String>, found: &HashSet<String>) -> f32 {
    if expected.is_empty() {
        return 1.0;
    }
    expected.intersection(found).count() as f32 / expected.len() as f32
}

/// Fraction of retrieved sources that were expected. 0.0 when nothing was
/// retrieved.
pub fn precision(expected: &HashSet<String>, found: &HashSet<String>) -> f32 {
    if found.is_empty() {
        return 0.0;
    }
    expected.intersection(found).count() as f32 / found.len() as f32
}

fn round3(x: f32) -> f32 {
    (x * 1000.0).round() / 1000.0
}

fn sorted(set: HashSet<String>) -> Vec<String> {
    let mut v: Vec<String> = set.into_iter().collect();
    v.sort();
    v
}
