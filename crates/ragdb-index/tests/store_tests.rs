use chrono::Utc;
use tempfile::TempDir;

use ragdb_core::config::Settings;
use ragdb_core::error::VectorStoreError;
use ragdb_core::types::{Chunk, ChunkMetadata, FileType, Relevance};
use ragdb_index::VectorStore;

fn test_settings(dir: &TempDir) -> Settings {
    Settings {
        embedding_dimension: 4,
        normalize_embeddings: true,
        min_similarity_score: 0.65,
        index_dir: dir.path().to_string_lossy().to_string(),
        ..Settings::default()
    }
}

fn chunk(id: &str, source: &str, text: &str, embedding: Option<Vec<f32>>) -> Chunk {
    let char_count = text.chars().count();
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        embedding,
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

#[test]
fn add_filters_unembedded_and_counts() {
    let tmp = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(&test_settings(&tmp));

    let chunks = vec![
        chunk("a_chunk_0", "a.txt", "alpha", Some(vec![1.0, 0.0, 0.0, 0.0])),
        chunk("a_chunk_1", "a.txt", "beta", None),
        chunk("b_chunk_0", "b.txt", "gamma", Some(vec![0.0, 1.0, 0.0, 0.0])),
    ];
    let added = store.add(chunks).expect("add");

    assert_eq!(added, 2);
    assert_eq!(store.total_chunks(), 2);
    assert!(store.is_loaded());

    // Every added chunk is reachable through search
    let hits = store
        .search(&[1.0, 0.0, 0.0, 0.0], 5, Some(0.0))
        .expect("search");
    assert!(hits.iter().any(|r| r.chunk.id == "a_chunk_0"));
    let hits = store
        .search(&[0.0, 1.0, 0.0, 0.0], 5, Some(0.0))
        .expect("search");
    assert!(hits.iter().any(|r| r.chunk.id == "b_chunk_0"));
}

#[test]
fn add_without_embeddings_is_rejected_and_harmless() {
    let tmp = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(&test_settings(&tmp));

    let err = store
        .add(vec![chunk("a_chunk_0", "a.txt", "alpha", None)])
        .unwrap_err();
    assert!(matches!(
        err,
        VectorStoreError::NoEmbeddedChunks { received: 1 }
    ));
    assert_eq!(store.total_chunks(), 0);
    assert!(!store.is_loaded());
}

#[test]
fn add_is_all_or_nothing_on_dimension_mismatch() {
    let tmp = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(&test_settings(&tmp));

    let err = store
        .add(vec![
            chunk("a_chunk_0", "a.txt", "good", Some(vec![1.0, 0.0, 0.0, 0.0])),
            chunk("a_chunk_1", "a.txt", "bad", Some(vec![1.0, 0.0])),
        ])
        .unwrap_err();
    assert!(matches!(
        err,
        VectorStoreError::DimensionMismatch { expected: 4, got: 2 }
    ));
    // The good chunk must not have been indexed either
    assert_eq!(store.total_chunks(), 0);
}

#[test]
fn search_on_empty_store_fails() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VectorStore::new(&test_settings(&tmp));
    let err = store.search(&[1.0, 0.0, 0.0, 0.0], 5, None).unwrap_err();
    assert!(matches!(err, VectorStoreError::EmptyIndex));
}

#[test]
fn search_respects_k_and_min_score() {
    let tmp = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(&test_settings(&tmp));

    // Ten chunks across two sources with graded similarity to [1,0,0,0]
    let mut chunks = Vec::new();
    for i in 0..10 {
        let angle = i as f32 * 0.1;
        let source = if i % 2 == 0 { "a.txt" } else { "b.txt" };
        chunks.push(chunk(
            &format!("{source}_chunk_{i}"),
            source,
            &format!("passage {i}"),
            Some(vec![1.0 - angle, angle, 0.0, 0.0]),
        ));
    }
    store.add(chunks).expect("add");

    let results = store
        .search(&[1.0, 0.0, 0.0, 0.0], 5, Some(0.65))
        .expect("search");

    assert!(results.len() <= 5);
    for r in &results {
        assert!(r.score >= 0.65, "score {} below threshold", r.score);
    }
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score, "results must be sorted");
    }
}

#[test]
fn relevance_bands_follow_scores() {
    let tmp = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(&test_settings(&tmp));

    // Normalized rows with known cosines against [1,0,0,0]
    let high = vec![1.0, 0.0, 0.0, 0.0]; // cos = 1.0
    let medium = vec![0.7, (1.0f32 - 0.49).sqrt(), 0.0, 0.0]; // cos = 0.7
    let low = vec![0.5, (1.0f32 - 0.25).sqrt(), 0.0, 0.0]; // cos = 0.5
    store
        .add(vec![
            chunk("h", "a.txt", "high", Some(high)),
            chunk("m", "a.txt", "medium", Some(medium)),
            chunk("l", "a.txt", "low", Some(low)),
        ])
        .expect("add");

    let results = store
        .search(&[1.0, 0.0, 0.0, 0.0], 3, Some(0.0))
        .expect("search");
    assert_eq!(results.len(), 3);

    assert_eq!(results[0].chunk.id, "h");
    assert_eq!(results[0].relevance, Relevance::High);
    assert_eq!(results[1].chunk.id, "m");
    assert_eq!(results[1].relevance, Relevance::Medium);
    assert_eq!(results[2].chunk.id, "l");
    assert_eq!(results[2].relevance, Relevance::Low);
}

#[test]
fn save_then_load_round_trips() {
    let tmp = TempDir::new().expect("tempdir");
    let settings = test_settings(&tmp);
    let mut store = VectorStore::new(&settings);

    store
        .add(vec![
            chunk("a_chunk_0", "a.txt", "alpha", Some(vec![1.0, 0.0, 0.0, 0.0])),
            chunk("b_chunk_0", "b.txt", "beta", Some(vec![0.0, 1.0, 0.0, 0.0])),
            chunk("b_chunk_1", "b.txt", "gamma", Some(vec![0.5, 0.5, 0.5, 0.5])),
        ])
        .expect("add");
    store.save().expect("save");

    let query = [0.9, 0.1, 0.0, 0.0];
    let before = store.search(&query, 3, Some(0.0)).expect("search");

    let mut restored = VectorStore::new(&settings);
    restored.load().expect("load");

    assert_eq!(restored.total_chunks(), store.total_chunks());
    let after = restored.search(&query, 3, Some(0.0)).expect("search");
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.chunk.id, a.chunk.id);
        assert_eq!(b.score, a.score, "scores must round-trip exactly");
    }
}

#[test]
fn save_requires_an_index() {
    let tmp = TempDir::new().expect("tempdir");
    let store = VectorStore::new(&test_settings(&tmp));
    assert!(matches!(
        store.save().unwrap_err(),
        VectorStoreError::EmptyIndex
    ));
}

#[test]
fn load_fails_when_artifacts_missing() {
    let tmp = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(&test_settings(&tmp));
    let err = store.load().unwrap_err();
    assert!(matches!(err, VectorStoreError::MissingArtifact { .. }));
}

#[test]
fn load_fails_when_artifacts_disagree() {
    let tmp = TempDir::new().expect("tempdir");
    let settings = test_settings(&tmp);
    let mut store = VectorStore::new(&settings);

    store
        .add(vec![
            chunk("a_chunk_0", "a.txt", "alpha", Some(vec![1.0, 0.0, 0.0, 0.0])),
            chunk("b_chunk_0", "b.txt", "beta", Some(vec![0.0, 1.0, 0.0, 0.0])),
        ])
        .expect("add");
    store.save().expect("save");

    // Drop one chunk from the chunks artifact, leaving the matrix intact
    let chunks_path = settings.chunks_path();
    let raw = std::fs::read(&chunks_path).expect("read chunks artifact");
    let mut chunks: Vec<Chunk> = serde_json::from_slice(&raw).expect("decode");
    chunks.pop();
    std::fs::write(&chunks_path, serde_json::to_vec(&chunks).expect("encode"))
        .expect("write chunks artifact");

    let mut restored = VectorStore::new(&settings);
    let err = restored.load().unwrap_err();
    assert!(matches!(
        err,
        VectorStoreError::Misaligned { chunks: 1, rows: 2 }
    ));
}

#[test]
fn clear_resets_the_store() {
    let tmp = TempDir::new().expect("tempdir");
    let mut store = VectorStore::new(&test_settings(&tmp));
    store
        .add(vec![chunk(
            "a_chunk_0",
            "a.txt",
            "alpha",
            Some(vec![1.0, 0.0, 0.0, 0.0]),
        )])
        .expect("add");
    assert!(store.is_loaded());

    store.clear();
    assert!(!store.is_loaded());
    assert_eq!(store.total_chunks(), 0);
    assert!(store.search(&[1.0, 0.0, 0.0, 0.0], 1, None).is_err());
}
