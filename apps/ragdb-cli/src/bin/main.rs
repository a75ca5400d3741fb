use std::env;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use ragdb_core::chunker::Chunker;
use ragdb_core::config::Settings;
use ragdb_core::loader::DocumentLoader;
use ragdb_embed::default_embedder;
use ragdb_index::VectorStore;
use ragdb_pipeline::{EvalQuery, Evaluator, RagPipeline};

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() {
        eprintln!("Usage: {} <ingest|query|evaluate|stats> [args...]", prog);
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "ingest" => ingest(&settings, &args).await?,
        "query" => query(&settings, &args).await?,
        "evaluate" => evaluate(&settings, &args).await?,
        "stats" => stats(&settings, &args)?,
        _ => {
            eprintln!("Unknown command: {}", cmd);
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Batch ingestion: load documents, chunk, embed, index, save.
///
/// The index artifacts are only replaced after the whole batch succeeds, so
/// a serving process never observes a half-built index.
async fn ingest(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let data_dir = args
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(|| settings.data_path());
    println!("Ingesting from {}", data_dir.display());

    let loader = DocumentLoader::new();
    let documents = loader.load_directory(&data_dir)?;
    if documents.is_empty() {
        anyhow::bail!("no documents found in {}", data_dir.display());
    }

    let chunker = Chunker::new(settings);
    let mut all_chunks = Vec::new();
    for (path, content, file_type) in &documents {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        match chunker.chunk(content, &source, *file_type, None, None) {
            Ok(chunks) => all_chunks.extend(chunks),
            Err(e) => eprintln!("Skipping {}: {}", source, e),
        }
    }
    if all_chunks.is_empty() {
        anyhow::bail!("no chunks produced");
    }
    println!(
        "{} documents -> {} chunks",
        documents.len(),
        all_chunks.len()
    );

    let embedder = default_embedder(settings)?;
    let pb = ProgressBar::new(all_chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let batch_size = settings.embedding_batch_size.max(1);
    for batch in all_chunks.chunks_mut(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts)?;
        for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("embeddings generated");

    let mut store = VectorStore::new(settings);
    let added = store.add(all_chunks)?;
    store.save()?;

    println!("✅ Ingest complete ({} chunks indexed)", added);
    println!("Index: {}", settings.vectors_path().display());
    Ok(())
}

async fn query(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let Some(text) = args.first().cloned() else {
        eprintln!("Usage: ragdb query \"<query>\" [k]");
        std::process::exit(1);
    };
    let k: Option<usize> = args
        .get(1)
        .map(|s| s.parse())
        .transpose()
        .context("k must be a number")?;

    let embedder = default_embedder(settings)?;
    let mut store = VectorStore::new(settings);
    store.load()?;
    let store = Arc::new(RwLock::new(store));

    let pipeline = RagPipeline::new(embedder, store, settings);
    let k = k.unwrap_or_else(|| pipeline.default_top_k());

    let response = pipeline.process(&text, k, None).await?;
    println!(
        "Context ({} chars from {} chunks):\n",
        response.metadata.total_chars, response.chunk_count
    );
    println!("{}", response.context);
    println!("\nSources: {}", response.sources.join(", "));
    let scores: Vec<String> = response.scores.iter().map(|s| format!("{:.3}", s)).collect();
    println!("Scores: {}", scores.join(", "));
    Ok(())
}

async fn evaluate(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let Some(path) = args.first() else {
        eprintln!("Usage: ragdb evaluate <queries.json> [k]");
        std::process::exit(1);
    };
    let k: usize = match args.get(1) {
        Some(s) => s.parse().context("k must be a number")?,
        None => settings.default_top_k,
    };

    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    let queries: Vec<EvalQuery> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;

    let embedder = default_embedder(settings)?;
    let mut store = VectorStore::new(settings);
    store.load()?;
    let store = Arc::new(RwLock::new(store));

    let evaluator = Evaluator::new(embedder, store);
    let report = evaluator.evaluate(&queries, k).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn stats(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let Some(path) = args.first() else {
        eprintln!("Usage: ragdb stats <file>");
        std::process::exit(1);
    };

    let loader = DocumentLoader::new();
    let (content, _file_type) = loader.load_file(&PathBuf::from(path))?;
    let chunker = Chunker::new(settings);
    let stats = chunker.stats(&content);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
