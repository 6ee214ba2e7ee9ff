//! Durable record mapping each indexed source file to its hash, timestamp,
//! and owned chunk ids (§4.3).

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::error::RetrievalErr;
use crate::types::EntryStatus;
use crate::types::ManifestEntry;

/// JSON-shaped map `abs_path -> ManifestEntry`, persisted via write-to-temp
/// then rename so a crash never leaves a half-written file on disk.
pub struct Manifest {
    path: PathBuf,
    entries: RwLock<HashMap<String, ManifestEntry>>,
}

impl Manifest {
    /// Load a manifest from `path`. A missing file yields an empty
    /// manifest; a present-but-corrupt file is a fatal, recoverable error
    /// — the caller decides whether to discard and rebuild (§7 Fatal).
    pub async fn load(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            serde_json::from_str(&content).map_err(|e| RetrievalErr::ManifestCorrupt {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn add_file(&self, path: &str, entry: ManifestEntry) {
        self.entries.write().await.insert(path.to_string(), entry);
    }

    pub async fn remove_file(&self, path: &str) -> Option<ManifestEntry> {
        self.entries.write().await.remove(path)
    }

    pub async fn is_file_in_manifest(&self, path: &str) -> bool {
        self.entries.read().await.contains_key(path)
    }

    pub async fn get(&self, path: &str) -> Option<ManifestEntry> {
        self.entries.read().await.get(path).cloned()
    }

    /// A read-only snapshot copy, matching the "readers take a snapshot"
    /// shared-resource policy (§5).
    pub async fn snapshot(&self) -> HashMap<String, ManifestEntry> {
        self.entries.read().await.clone()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Atomically persist the manifest: write to a sibling temp file, then
    /// rename over the target path.
    pub async fn save(&self) -> Result<()> {
        let entries = self.entries.read().await;
        let serialized = serde_json::to_string_pretty(&*entries)?;
        drop(entries);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, serialized).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// For every entry with `status=indexed`, every chunk id must resolve
    /// in `store` (invariant 1, §8). `resolver` answers whether a given
    /// chunk id currently exists in the vector store.
    pub async fn is_valid<F>(&self, resolver: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        let entries = self.entries.read().await;
        entries.values().all(|entry| {
            if !entry.status.is_indexed() {
                return true;
            }
            entry.chunk_ids.iter().all(|id| resolver(id))
        })
    }
}

impl EntryStatus {
    pub fn error(detail: impl std::fmt::Display) -> Self {
        EntryStatus::Error(detail.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn indexed_entry(hash: &str, ids: Vec<String>) -> ManifestEntry {
        ManifestEntry {
            timestamp: 1000.0,
            hash: hash.to_string(),
            chunk_ids: ids,
            status: EntryStatus::Indexed,
        }
    }

    #[tokio::test]
    async fn load_missing_file_yields_empty_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        let manifest = Manifest::load(&path).await.unwrap();
        assert!(manifest.is_empty().await);
    }

    #[tokio::test]
    async fn load_corrupt_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        tokio::fs::write(&path, "{not valid json").await.unwrap();
        let result = Manifest::load(&path).await;
        assert!(matches!(result, Err(RetrievalErr::ManifestCorrupt { .. })));
    }

    #[tokio::test]
    async fn save_then_reopen_yields_prior_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/manifest.json");
        let manifest = Manifest::load(&path).await.unwrap();
        manifest
            .add_file("/a.pdf", indexed_entry("abc", vec!["id0".into(), "id1".into()]))
            .await;
        manifest.save().await.unwrap();

        let reopened = Manifest::load(&path).await.unwrap();
        let entry = reopened.get("/a.pdf").await.unwrap();
        assert_eq!(entry.hash, "abc");
        assert_eq!(entry.chunk_ids.len(), 2);
    }

    #[tokio::test]
    async fn is_valid_detects_dangling_chunk_ids() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::load(&dir.path().join("m.json")).await.unwrap();
        manifest
            .add_file("/a.pdf", indexed_entry("abc", vec!["id0".into()]))
            .await;

        assert!(manifest.is_valid(|_| true).await);
        assert!(!manifest.is_valid(|_| false).await);
    }

    #[tokio::test]
    async fn error_status_entries_are_always_valid() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::load(&dir.path().join("m.json")).await.unwrap();
        manifest
            .add_file(
                "/bad.pdf",
                ManifestEntry {
                    timestamp: 0.0,
                    hash: String::new(),
                    chunk_ids: vec!["orphan".into()],
                    status: EntryStatus::error("parse failed"),
                },
            )
            .await;
        assert!(manifest.is_valid(|_| false).await);
    }

    #[tokio::test]
    async fn remove_file_returns_removed_entry() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::load(&dir.path().join("m.json")).await.unwrap();
        manifest.add_file("/a.pdf", indexed_entry("abc", vec![])).await;
        let removed = manifest.remove_file("/a.pdf").await;
        assert!(removed.is_some());
        assert!(!manifest.is_file_in_manifest("/a.pdf").await);
    }
}
