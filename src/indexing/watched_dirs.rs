//! Adds and removes watched roots, synthesizing the `Created`/`Deleted`
//! events a fresh or retired root implies (§4.8).

use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::error::RetrievalErr;
use crate::indexing::event_queue::EventQueue;
use crate::manifest::Manifest;
use crate::types::WatchEvent;

/// Owns the set of watched roots and keeps the on-disk config and the
/// in-flight event queue consistent with it. Configuration changes are
/// persisted before enumeration begins, so a crash mid-enumeration leaves
/// the config (not the manifest) as the source of truth for a restart scan.
pub struct WatchedDirectoriesManager {
    config_path: Option<PathBuf>,
    config: RwLock<RetrievalConfig>,
    manifest: Arc<Manifest>,
    queue: Arc<EventQueue>,
}

impl WatchedDirectoriesManager {
    pub fn new(
        config: RetrievalConfig,
        config_path: Option<PathBuf>,
        manifest: Arc<Manifest>,
        queue: Arc<EventQueue>,
    ) -> Self {
        Self {
            config_path,
            config: RwLock::new(config),
            manifest,
            queue,
        }
    }

    pub async fn watched_directories(&self) -> HashSet<PathBuf> {
        self.config.read().await.rag_watched_directories.clone()
    }

    /// Add `directories` to the watched set. For each file under a newly
    /// added root that the manifest doesn't already know about, pushes a
    /// synthetic `Created` event. Returns `false` if every directory was
    /// already watched.
    pub async fn add_directories(&self, directories: HashSet<PathBuf>) -> Result<bool> {
        let new_roots: Vec<PathBuf> = {
            let config = self.config.read().await;
            directories
                .iter()
                .filter(|d| !config.rag_watched_directories.contains(*d))
                .cloned()
                .collect()
        };
        if new_roots.is_empty() {
            return Ok(false);
        }

        {
            let mut config = self.config.write().await;
            for root in &new_roots {
                config.rag_watched_directories.insert(root.clone());
            }
            self.persist(&config).await?;
        }

        for root in &new_roots {
            for path in enumerate_files(root).await? {
                let key = path.display().to_string();
                if !self.manifest.is_file_in_manifest(&key).await {
                    self.queue.push(WatchEvent::Created(path)).await;
                }
            }
        }

        Ok(true)
    }

    /// Remove `directories` from the watched set. For every manifest entry
    /// whose path falls under a removed root, pushes a synthetic `Deleted`
    /// event. Returns `false` if none of the directories were watched.
    pub async fn remove_directories(&self, directories: HashSet<PathBuf>) -> Result<bool> {
        let removed_roots: Vec<PathBuf> = {
            let config = self.config.read().await;
            directories
                .iter()
                .filter(|d| config.rag_watched_directories.contains(*d))
                .cloned()
                .collect()
        };
        if removed_roots.is_empty() {
            return Ok(false);
        }

        {
            let mut config = self.config.write().await;
            for root in &removed_roots {
                config.rag_watched_directories.remove(root);
            }
            self.persist(&config).await?;
        }

        let snapshot = self.manifest.snapshot().await;
        for key in snapshot.keys() {
            let path = PathBuf::from(key);
            if removed_roots.iter().any(|root| path.starts_with(root)) {
                self.queue.push(WatchEvent::Deleted(path)).await;
            }
        }

        Ok(true)
    }

    async fn persist(&self, config: &RetrievalConfig) -> Result<()> {
        let Some(path) = &self.config_path else {
            return Ok(());
        };
        let serialized = toml::to_string_pretty(config).map_err(|e| RetrievalErr::ConfigError {
            field: "rag_watched_directories".to_string(),
            cause: e.to_string(),
        })?;
        tokio::fs::write(path, serialized)
            .await
            .map_err(|e| RetrievalErr::invalid_path(path, e.to_string()))
    }
}

/// Recursively collect every file under `root` — files with no registered
/// parser are indexed as plain text rather than skipped (§4.1, §4.8). Runs
/// on a blocking thread since directory walks are synchronous.
async fn enumerate_files(root: &Path) -> Result<Vec<PathBuf>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || walk(&root))
        .await
        .map_err(|e| RetrievalErr::IndexError {
            path: root_display(&e),
            cause: e.to_string(),
        })?
}

fn root_display(_e: &tokio::task::JoinError) -> PathBuf {
    PathBuf::new()
}

fn walk(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => return Err(RetrievalErr::invalid_path(dir, e.to_string())),
    };
    for entry in entries {
        let entry = entry.map_err(|e| RetrievalErr::invalid_path(dir, e.to_string()))?;
        let path = entry.path();
        if path.is_dir() {
            found.extend(walk(&path)?);
        } else {
            found.push(path);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryStatus;
    use crate::types::ManifestEntry;
    use tempfile::TempDir;

    async fn manager(
        data_dir: &Path,
        manifest: Arc<Manifest>,
    ) -> (WatchedDirectoriesManager, Arc<EventQueue>) {
        let queue = Arc::new(EventQueue::new(64));
        let manager = WatchedDirectoriesManager::new(
            RetrievalConfig::default(),
            Some(data_dir.join("rag.toml")),
            manifest,
            queue.clone(),
        );
        (manager, queue)
    }

    #[tokio::test]
    async fn add_directories_enumerates_unindexed_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"hello").unwrap();
        std::fs::write(dir.path().join("notes.md"), b"plain text, no registered parser").unwrap();

        let manifest = Arc::new(Manifest::load(&dir.path().join("manifest.json")).await.unwrap());
        let (mgr, queue) = manager(dir.path(), manifest).await;

        let mut roots = HashSet::new();
        roots.insert(dir.path().to_path_buf());
        let changed = mgr.add_directories(roots).await.unwrap();
        assert!(changed);

        // Both the recognized pdf and the unrecognized extension are
        // enumerated — unmatched files are indexed as plain text, not
        // skipped (§4.1, §4.8).
        assert_eq!(queue.len().await, 2);
        let seen = vec![queue.pop().await, queue.pop().await];
        assert!(seen.contains(&WatchEvent::Created(dir.path().join("a.pdf"))));
        assert!(seen.contains(&WatchEvent::Created(dir.path().join("notes.md"))));
    }

    #[tokio::test]
    async fn add_directories_skips_files_already_in_manifest() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"hello").unwrap();

        let manifest = Arc::new(Manifest::load(&dir.path().join("manifest.json")).await.unwrap());
        manifest
            .add_file(
                &file.display().to_string(),
                ManifestEntry {
                    timestamp: 0.0,
                    hash: "h".to_string(),
                    chunk_ids: vec!["id".to_string()],
                    status: EntryStatus::Indexed,
                },
            )
            .await;
        let (mgr, queue) = manager(dir.path(), manifest).await;

        let mut roots = HashSet::new();
        roots.insert(dir.path().to_path_buf());
        mgr.add_directories(roots).await.unwrap();

        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn add_directories_returns_false_for_already_watched_root() {
        let dir = TempDir::new().unwrap();
        let manifest = Arc::new(Manifest::load(&dir.path().join("manifest.json")).await.unwrap());
        let (mgr, _queue) = manager(dir.path(), manifest).await;

        let mut roots = HashSet::new();
        roots.insert(dir.path().to_path_buf());
        assert!(mgr.add_directories(roots.clone()).await.unwrap());
        assert!(!mgr.add_directories(roots).await.unwrap());
    }

    #[tokio::test]
    async fn remove_directories_deletes_manifest_entries_under_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.pdf");
        std::fs::write(&file, b"hello").unwrap();

        let manifest = Arc::new(Manifest::load(&dir.path().join("manifest.json")).await.unwrap());
        manifest
            .add_file(
                &file.display().to_string(),
                ManifestEntry {
                    timestamp: 0.0,
                    hash: "h".to_string(),
                    chunk_ids: vec!["id".to_string()],
                    status: EntryStatus::Indexed,
                },
            )
            .await;
        let (mgr, queue) = manager(dir.path(), manifest).await;

        let mut roots = HashSet::new();
        roots.insert(dir.path().to_path_buf());
        mgr.add_directories(roots.clone()).await.unwrap();
        while !queue.is_empty().await {
            queue.pop().await;
        }

        let removed = mgr.remove_directories(roots).await.unwrap();
        assert!(removed);
        assert_eq!(queue.pop().await, WatchEvent::Deleted(file));
    }
}
