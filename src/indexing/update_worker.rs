//! Single-consumer worker applying `WatchEvent`s to the manifest and
//! vector store (§4.7, §4.8, §5).
//!
//! The manifest and vector store are written only here; every other
//! component reads a snapshot. `Moved` is processed as an atomic
//! `Deleted(src)` followed by `Created(dest)` — atomic because this is the
//! only writer and events are drained one at a time.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use crate::chunking::TextChunker;
use crate::error::Result;
use crate::indexing::event_queue::EventQueue;
use crate::manifest::Manifest;
use crate::parsers;
use crate::storage::VectorStore;
use crate::traits::Embedder;
use crate::traits::Transcriber;
use crate::types::chunk_id;
use crate::types::full_file_hash;
use crate::types::short_file_hash;
use crate::types::Chunk;
use crate::types::EntryStatus;
use crate::types::ManifestEntry;
use crate::types::MetaValue;
use crate::types::WatchEvent;

pub struct UpdateWorker {
    queue: Arc<EventQueue>,
    manifest: Arc<Manifest>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunker: TextChunker,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl UpdateWorker {
    pub fn new(
        queue: Arc<EventQueue>,
        manifest: Arc<Manifest>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunker: TextChunker,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        Self {
            queue,
            manifest,
            store,
            embedder,
            chunker,
            transcriber,
        }
    }

    /// Drain the queue until a `Stop` event arrives.
    pub async fn run(&self) {
        loop {
            let event = self.queue.pop().await;
            if matches!(event, WatchEvent::Stop) {
                return;
            }
            if let Err(e) = self.apply(event).await {
                tracing::warn!(error = %e, "update worker failed to apply event");
            }
        }
    }

    async fn apply(&self, event: WatchEvent) -> Result<()> {
        match event {
            WatchEvent::Created(path) => self.upsert(&path).await,
            WatchEvent::Modified(path) => self.handle_modified(&path).await,
            WatchEvent::Deleted(path) => self.remove(&path).await,
            WatchEvent::Moved { src, dest } => {
                self.remove(&src).await?;
                self.upsert(&dest).await
            }
            WatchEvent::Stop => Ok(()),
        }
    }

    /// `Modified` differs from `Created`: a path that no longer exists
    /// delegates to `Deleted`, and content whose hash is unchanged only
    /// refreshes the manifest timestamp — no re-parse, no store writes
    /// (§4.7; §8 "Modified(f) with unchanged content is a no-op on store
    /// contents").
    async fn handle_modified(&self, path: &Path) -> Result<()> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return self.remove(path).await;
        }

        let key = path.display().to_string();
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) => return self.record_read_error(&key, e).await,
        };

        if let Some(mut existing) = self.manifest.get(&key).await {
            if existing.hash == full_file_hash(&raw) {
                existing.timestamp = now_secs();
                self.manifest.add_file(&key, existing).await;
                self.manifest.save().await?;
                return Ok(());
            }
        }
        self.index_bytes(path, &key, raw).await
    }

    async fn upsert(&self, path: &Path) -> Result<()> {
        let key = path.display().to_string();
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(e) => return self.record_read_error(&key, e).await,
        };
        self.index_bytes(path, &key, raw).await
    }

    async fn record_read_error(&self, key: &str, e: std::io::Error) -> Result<()> {
        self.manifest
            .add_file(
                key,
                ManifestEntry {
                    timestamp: now_secs(),
                    hash: String::new(),
                    chunk_ids: Vec::new(),
                    status: EntryStatus::error(format!("read failed: {e}")),
                },
            )
            .await;
        self.manifest.save().await?;
        Ok(())
    }

    async fn index_bytes(&self, path: &Path, key: &str, raw: Vec<u8>) -> Result<()> {
        if let Some(old) = self.manifest.get(key).await {
            self.store.delete_by_ids(&old.chunk_ids).await?;
        }

        let hash8 = short_file_hash(&raw);
        let full_hash = full_file_hash(&raw);

        let document_chunks = parsers::parse_file(path, &raw, self.transcriber.clone()).await;

        // A parser that failed returns a `type=error` chunk rather than
        // propagating — distinct from a parser that legitimately produced no
        // content (§7 ParseError vs §8 empty-file indexing).
        if let Some(detail) = parse_error_detail(&document_chunks) {
            self.manifest
                .add_file(
                    key,
                    ManifestEntry {
                        timestamp: now_secs(),
                        hash: full_hash,
                        chunk_ids: Vec::new(),
                        status: EntryStatus::error(detail),
                    },
                )
                .await;
            self.manifest.save().await?;
            return Ok(());
        }

        let mut pieces: Vec<Chunk> = Vec::new();
        for doc_chunk in document_chunks {
            pieces.extend(self.chunker.chunk(&doc_chunk));
        }

        if pieces.is_empty() {
            self.manifest
                .add_file(
                    key,
                    ManifestEntry {
                        timestamp: now_secs(),
                        hash: full_hash,
                        chunk_ids: Vec::new(),
                        status: EntryStatus::Indexed,
                    },
                )
                .await;
            self.manifest.save().await?;
            return Ok(());
        }

        let texts: Vec<String> = pieces.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let ids: Vec<String> = (0..pieces.len())
            .map(|i| chunk_id(path, &hash8, i))
            .collect();
        let metadatas = pieces.into_iter().map(|c| c.metadata).collect();

        self.store
            .add_chunks(ids.clone(), texts, embeddings, metadatas)
            .await?;

        self.manifest
            .add_file(
                key,
                ManifestEntry {
                    timestamp: now_secs(),
                    hash: full_hash,
                    chunk_ids: ids,
                    status: EntryStatus::Indexed,
                },
            )
            .await;
        self.manifest.save().await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        let key = path.display().to_string();
        if let Some(entry) = self.manifest.remove_file(&key).await {
            self.store.delete_by_ids(&entry.chunk_ids).await?;
        }
        self.manifest.save().await?;
        Ok(())
    }
}

/// If any of a parsed document's chunks is a parser-failure chunk
/// (`metadata.type="error"`), return its `error_detail`. A genuinely empty
/// document has no such chunk.
fn parse_error_detail(chunks: &[Chunk]) -> Option<String> {
    chunks.iter().find_map(|c| {
        let is_error = matches!(c.metadata.get("type"), Some(MetaValue::Str(t)) if t == "error");
        if !is_error {
            return None;
        }
        match c.metadata.get("error_detail") {
            Some(MetaValue::Str(detail)) => Some(detail.clone()),
            _ => Some("parser reported an error".to_string()),
        }
    })
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
