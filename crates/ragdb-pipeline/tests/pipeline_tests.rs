use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tempfile::TempDir;

use ragdb_core::config::Settings;
use ragdb_core::error::{EmbeddingError, Error};
use ragdb_core::traits::Embedder;
use ragdb_core::types::{Chunk, ChunkMetadata, FileType};
use ragdb_index::VectorStore;
use ragdb_pipeline::{eval, EvalQuery, Evaluator, RagPipeline, SharedStore};

/// Maps texts to fixed vectors by their first character so tests control
/// ranking exactly: 'a' scores 1.0 against itself, 'b' 0.9, 'c' 0.8, and
/// anything else is orthogonal.
struct KeyedEmbedder;

impl Embedder for KeyedEmbedder {
    fn dim(&self) -> usize {
        4
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }
        let v = match text.chars().next() {
            Some('a') => vec![1.0, 0.0, 0.0, 0.0],
            Some('b') => vec![0.9, (1.0f32 - 0.81).sqrt(), 0.0, 0.0],
            Some('c') => vec![0.8, (1.0f32 - 0.64).sqrt(), 0.0, 0.0],
            _ => vec![0.0, 0.0, 0.0, 1.0],
        };
        Ok(v)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

fn settings(dir: &TempDir, max_context_length: usize) -> Settings {
    Settings {
        embedding_dimension: 4,
        max_context_length,
        index_dir: dir.path().to_string_lossy().to_string(),
        ..Settings::default()
    }
}

fn chunk(id: &str, source: &str, text: String, embedding: Vec<f32>) -> Chunk {
    let char_count = text.chars().count();
    Chunk {
        id: id.to_string(),
        text,
        embedding: Some(embedding),
        metadata: ChunkMetadata {
            source: source.to_string(),
            chunk_index: 0,
            total_chunks: 1,
            file_type: FileType::Text,
            created_at: Utc::now(),
            char_count,
            start_char: 0,
            end_char: char_count,
        },
    }
}

/// Store with three chunks ('a' > 'b' > 'c' against an 'a' query), each
/// `len` characters long, from three distinct sources.
fn seeded_store(settings: &Settings, len: usize) -> SharedStore {
    let embedder = KeyedEmbedder;
    let mut store = VectorStore::new(settings);
    let chunks = ["a", "b", "c"]
        .iter()
        .map(|tag| {
            let text = tag.repeat(len);
            let embedding = embedder.embed(&text).expect("embed");
            chunk(
                &format!("{tag}.txt_chunk_0"),
                &format!("{tag}.txt"),
                text,
                embedding,
            )
        })
        .collect();
    store.add(chunks).expect("add");
    Arc::new(RwLock::new(store))
}

#[tokio::test]
async fn process_returns_ranked_context_and_metadata() {
    let tmp = TempDir::new().expect("tempdir");
    let settings = settings(&tmp, 2000);
    let store = seeded_store(&settings, 30);
    let pipeline = RagPipeline::new(Arc::new(KeyedEmbedder), store, &settings);

    let response = pipeline
        .process("aaa query", 3, Some(0.0))
        .await
        .expect("process");

    assert_eq!(response.query, "aaa query");
    assert_eq!(response.chunk_count, 3);
    assert_eq!(response.scores.len(), 3);
    assert!(response.scores[0] > response.scores[1]);
    assert!(response.scores[1] > response.scores[2]);

    // Best chunk leads the context
    assert!(response.context.starts_with(&"a".repeat(30)));
    assert_eq!(response.sources, vec!["a.txt", "b.txt", "c.txt"]);
    assert_eq!(response.metadata.sources_count, 3);
    assert_eq!(response.metadata.chunk_count, 3);
    assert_eq!(
        response.metadata.total_chars,
        response.context.chars().count()
    );
    assert!(response.metadata.avg_score > 0.8);
}

#[tokio::test]
async fn no_results_above_threshold_is_a_terminal_error() {
    let tmp = TempDir::new().expect("tempdir");
    let settings = settings(&tmp, 2000);
    let store = seeded_store(&settings, 30);
    let pipeline = RagPipeline::new(Arc::new(KeyedEmbedder), store, &settings);

    // 'z' query is orthogonal to everything; the default 0.65 threshold
    // filters every candidate.
    let err = pipeline.process("zzz", 3, None).await.unwrap_err();
    match err {
        Error::InsufficientResults { min_score } => {
            assert!((min_score - 0.65).abs() < 1e-6);
        }
        other => panic!("expected InsufficientResults, got {other:?}"),
    }
}

#[tokio::test]
async fn tight_budget_keeps_only_the_first_chunk() {
    // max_context_length 50 with 30-char chunks: the second chunk's 20
    // leftover chars are under the 100-char minimum, so only the first
    // chunk makes it into the context while chunk_count still reflects all
    // returned results.
    let tmp = TempDir::new().expect("tempdir");
    let settings = settings(&tmp, 50);
    let store = seeded_store(&settings, 30);
    let pipeline = RagPipeline::new(Arc::new(KeyedEmbedder), store, &settings);

    let response = pipeline
        .process("aaa", 3, Some(0.0))
        .await
        .expect("process");

    assert_eq!(response.context, "a".repeat(30));
    assert_eq!(response.chunk_count, 3);
    // Sources still list chunks that were excluded from the context
    assert_eq!(response.sources, vec!["a.txt", "b.txt", "c.txt"]);
}

#[tokio::test]
async fn overflowing_chunk_is_truncated_with_marker() {
    // 300-char chunks under a 450 budget: the first fits whole, the second
    // gets the remaining 150 chars plus the ellipsis, the third is dropped.
    let tmp = TempDir::new().expect("tempdir");
    let settings = settings(&tmp, 450);
    let store = seeded_store(&settings, 300);
    let pipeline = RagPipeline::new(Arc::new(KeyedEmbedder), store, &settings);

    let response = pipeline
        .process("aaa", 3, Some(0.0))
        .await
        .expect("process");

    let parts: Vec<&str> = response.context.split("\n\n---\n\n").collect();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0], "a".repeat(300));
    assert_eq!(parts[1], format!("{}...", "b".repeat(150)));
    assert!(!response.context.contains('c'));
}

#[tokio::test]
async fn evaluator_scores_labeled_queries() {
    let tmp = TempDir::new().expect("tempdir");
    let settings = settings(&tmp, 2000);
    let store = seeded_store(&settings, 30);
    let evaluator = Evaluator::new(Arc::new(KeyedEmbedder), store);

    let queries = vec![
        EvalQuery {
            query: "aaa".to_string(),
            expected_sources: vec!["a.txt".to_string()],
        },
        EvalQuery {
            query: "abc".to_string(),
            expected_sources: vec![],
        },
    ];

    // k=2 retrieves sources {a.txt, b.txt} for both queries
    let report = evaluator.evaluate(&queries, 2).await.expect("evaluate");

    assert_eq!(report.total_queries, 2);
    assert_eq!(report.details.len(), 2);

    // Query 1: expected a.txt was found -> recall 1.0; one of two retrieved
    // sources was expected -> precision 0.5
    assert!((report.details[0].recall - 1.0).abs() < 1e-6);
    assert!((report.details[0].precision - 0.5).abs() < 1e-6);
    assert_eq!(report.details[0].retrieved_count, 2);
    assert_eq!(report.details[0].found_sources, vec!["a.txt", "b.txt"]);

    // Query 2: nothing expected -> vacuous recall 1.0, precision 0.0
    assert!((report.details[1].recall - 1.0).abs() < 1e-6);
    assert!((report.details[1].precision - 0.0).abs() < 1e-6);

    // Macro averages
    assert!((report.recall_at_k - 1.0).abs() < 1e-6);
    assert!((report.precision_at_k - 0.25).abs() < 1e-6);
    assert!((report.avg_similarity - 0.95).abs() < 1e-3);
}

#[tokio::test]
async fn evaluator_handles_empty_batch() {
    let tmp = TempDir::new().expect("tempdir");
    let settings = settings(&tmp, 2000);
    let store = seeded_store(&settings, 30);
    let evaluator = Evaluator::new(Arc::new(KeyedEmbedder), store);

    let report = evaluator.evaluate(&[], 5).await.expect("evaluate");
    assert_eq!(report.total_queries, 0);
    assert!(report.details.is_empty());
    assert_eq!(report.recall_at_k, 0.0);
}

#[test]
fn recall_is_vacuously_one_and_precision_zero_on_empty_found() {
    let empty: HashSet<String> = HashSet::new();
    let found: HashSet<String> = ["x.txt".to_string()].into_iter().collect();

    assert_eq!(eval::recall(&empty, &found), 1.0);
    assert_eq!(eval::recall(&empty, &empty), 1.0);
    assert_eq!(eval::precision(&found, &empty), 0.0);
    assert_eq!(eval::precision(&empty, &empty), 0.0);
}
