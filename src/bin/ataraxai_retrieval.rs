//! CLI entry point for the retrieval core: index a set of directories,
//! watch them for changes, and query the resulting knowledge base.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use tracing_appender::non_blocking;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

use ataraxai_retrieval::chunking::ChunkerConfig;
use ataraxai_retrieval::chunking::TextChunker;
use ataraxai_retrieval::embeddings::OpenAiEmbedder;
use ataraxai_retrieval::storage::LanceDbStore;
use ataraxai_retrieval::traits::Embedder;
use ataraxai_retrieval::DirectoryWatcher;
use ataraxai_retrieval::EventQueue;
use ataraxai_retrieval::Manifest;
use ataraxai_retrieval::RetrievalConfig;
use ataraxai_retrieval::RetrievalEngine;
use ataraxai_retrieval::RetrievalQuery;
use ataraxai_retrieval::UpdateWorker;
use ataraxai_retrieval::WatchedDirectoriesManager;

#[derive(Parser)]
#[command(name = "ataraxai-retrieval")]
#[command(about = "Index a set of directories and query them with RAG")]
struct Cli {
    /// Working directory whose config is loaded (see RetrievalConfig::load)
    #[arg(default_value = ".")]
    workdir: PathBuf,

    /// Path to a specific config file, overriding the search order
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan watched directories once, index what's missing, then exit
    Index,

    /// Watch configured directories and index changes until Ctrl-C
    Watch,

    /// Run a query against the current index
    Query {
        text: String,
        /// Maximum results to return
        #[arg(short, long)]
        limit: Option<i32>,
    },

    /// Print manifest counts (indexed / error)
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(&cli.workdir)?;

    let config = match &cli.config {
        Some(path) => RetrievalConfig::from_file(path)?,
        None => RetrievalConfig::load(&cli.workdir)?,
    };
    config.chunking.validate()?;
    for warning in config.validate() {
        tracing::warn!(%warning, "config warning");
    }

    let manifest_path = config.data_dir.join("manifest.json");
    let manifest = Arc::new(Manifest::load(&manifest_path).await?);
    let store_dir = config.data_dir.join("vector_store");
    tokio::fs::create_dir_all(&store_dir).await?;
    let dimension = ataraxai_retrieval::config::default_embedding_dimension();
    let store: Arc<dyn ataraxai_retrieval::VectorStore> =
        Arc::new(LanceDbStore::open(&store_dir, dimension).await?);

    match cli.command {
        Command::Index => run_index(&config, manifest, store).await,
        Command::Watch => run_watch(&config, manifest, store).await,
        Command::Query { text, limit } => run_query(&config, store, text, limit).await,
        Command::Status => run_status(manifest).await,
    }
}

/// `WatchedDirectoriesManager` treats its constructor config as the prior
/// watched set; starting it empty ensures every directory named in the
/// loaded config is treated as newly added and gets enumerated.
fn empty_watch_set(config: &RetrievalConfig) -> RetrievalConfig {
    let mut empty = config.clone();
    empty.rag_watched_directories.clear();
    empty
}

fn embedder(config: &RetrievalConfig) -> anyhow::Result<Arc<dyn Embedder>> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY must be set to embed text"))?;
    Ok(Arc::new(
        OpenAiEmbedder::new(api_key).with_model(config.rag_embedder_model.clone()),
    ))
}

async fn run_index(
    config: &RetrievalConfig,
    manifest: Arc<Manifest>,
    store: Arc<dyn ataraxai_retrieval::VectorStore>,
) -> anyhow::Result<()> {
    let queue = Arc::new(EventQueue::new(1024));
    let manager = WatchedDirectoriesManager::new(
        empty_watch_set(config),
        None,
        manifest.clone(),
        queue.clone(),
    );
    manager
        .add_directories(config.rag_watched_directories.clone())
        .await?;
    queue.push(ataraxai_retrieval::WatchEvent::Stop).await;

    let chunker = TextChunker::new(ChunkerConfig::from(&config.chunking))?;
    let worker = UpdateWorker::new(queue, manifest.clone(), store, embedder(config)?, chunker, None);
    worker.run().await;

    println!("indexed {} files", manifest.len().await);
    Ok(())
}

async fn run_watch(
    config: &RetrievalConfig,
    manifest: Arc<Manifest>,
    store: Arc<dyn ataraxai_retrieval::VectorStore>,
) -> anyhow::Result<()> {
    let queue = Arc::new(EventQueue::new(1024));
    let manager = WatchedDirectoriesManager::new(
        empty_watch_set(config),
        None,
        manifest.clone(),
        queue.clone(),
    );
    manager
        .add_directories(config.rag_watched_directories.clone())
        .await?;

    let directories: Vec<PathBuf> = config.rag_watched_directories.iter().cloned().collect();
    let _watcher = DirectoryWatcher::start(&directories, queue.clone())?;

    let chunker = TextChunker::new(ChunkerConfig::from(&config.chunking))?;
    let worker = Arc::new(UpdateWorker::new(
        queue.clone(),
        manifest,
        store,
        embedder(config)?,
        chunker,
        None,
    ));

    let worker_task = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, draining in-flight events");
    queue.push(ataraxai_retrieval::WatchEvent::Stop).await;
    worker_task.await?;
    Ok(())
}

async fn run_query(
    config: &RetrievalConfig,
    store: Arc<dyn ataraxai_retrieval::VectorStore>,
    text: String,
    limit: Option<i32>,
) -> anyhow::Result<()> {
    let mut engine_config = config.retrieval.clone();
    if let Some(limit) = limit {
        engine_config.rag_n_result_final = limit;
    }
    let engine = RetrievalEngine::new(store, embedder(config)?, engine_config);

    let query = RetrievalQuery::new(text);
    let results = engine.retrieve(&query).await?;
    for (i, text) in results.iter().enumerate() {
        println!("{}. {}", i + 1, text);
    }
    Ok(())
}

async fn run_status(manifest: Arc<Manifest>) -> anyhow::Result<()> {
    let snapshot = manifest.snapshot().await;
    let (indexed, errored): (Vec<_>, Vec<_>) = snapshot
        .values()
        .partition(|entry| entry.status.is_indexed());
    println!("indexed: {}", indexed.len());
    println!("errors: {}", errored.len());
    for entry in &errored {
        if let ataraxai_retrieval::types::EntryStatus::Error(detail) = &entry.status {
            println!("  - {detail}");
        }
    }
    Ok(())
}

fn init_tracing(workdir: &std::path::Path) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = dirs::home_dir()
        .unwrap_or_else(|| workdir.to_path_buf())
        .join(".ataraxai")
        .join("log");
    std::fs::create_dir_all(&log_dir)?;

    let mut log_file_opts = OpenOptions::new();
    log_file_opts.create(true).append(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        log_file_opts.mode(0o600);
    }

    let log_file = log_file_opts.open(log_dir.join("retrieval.log"))?;
    let (non_blocking_writer, guard) = non_blocking(log_file);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ataraxai_retrieval=info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_writer)
        .with_target(true)
        .with_ansi(false)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(file_layer).init();
    Ok(guard)
}
