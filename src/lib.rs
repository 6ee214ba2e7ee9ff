//! Ataraxai Retrieval Core
//!
//! Local, privacy-preserving file indexing and retrieval-augmented
//! generation: watch a set of directories, parse and chunk what changes,
//! embed and store it in a local vector index, and answer queries against
//! it — optionally expanding the query via HyDE and reranking results with
//! a cross-encoder before handing context to a `PromptAssembler`.
//!
//! ## Quick Start
//!
//! ```toml
//! [retrieval]
//! rag_watched_directories = ["~/Documents"]
//! data_dir = "~/.ataraxai/rag"
//! ```
//!
//! The core never depends on a concrete LLM, embedder, or ASR backend —
//! callers inject implementations of the traits in [`traits`].

// Core modules
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Subsystems
pub mod benchmark;
pub mod chunking;
pub mod embeddings;
pub mod indexing;
pub mod manifest;
pub mod parsers;
pub mod prompt;
pub mod retrieval;
pub mod storage;

// Re-exports
pub use config::RetrievalConfig;
pub use error::Result;
pub use error::RetrievalErr;

pub use benchmark::BenchmarkJob;
pub use benchmark::BenchmarkQueue;
pub use benchmark::BenchmarkRunner;
pub use manifest::Manifest;
pub use prompt::PromptAssembler;
pub use prompt::PromptTemplate;
pub use retrieval::RetrievalEngine;
pub use storage::LanceDbStore;
pub use storage::VectorStore;
pub use traits::CompletionEngine;
pub use traits::CrossEncoder;
pub use traits::Embedder;
pub use traits::Task;
pub use traits::TaskRegistry;
pub use traits::Transcriber;
pub use types::Chunk;
pub use types::Metadata;
pub use types::MetadataFilter;
pub use types::RetrievalQuery;
pub use types::RetrievalResult;
pub use types::WatchEvent;

// Indexing exports
pub use indexing::DirectoryWatcher;
pub use indexing::EventQueue;
pub use indexing::UpdateWorker;
pub use indexing::WatchedDirectoriesManager;
