//! Translates filesystem notifications into `WatchEvent`s (§4.6).
//!
//! Wraps `notify`'s recommended (OS-native) watcher directly rather than a
//! debouncing layer: debouncing collapses every event down to an
//! undifferentiated "something changed" signal, which destroys the
//! Created/Modified/Deleted/Moved distinction the UpdateWorker needs.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use notify::Event;
use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify::Watcher;
use notify::event::ModifyKind;
use notify::event::RenameMode;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::error::RetrievalErr;
use crate::indexing::event_queue::EventQueue;
use crate::types::WatchEvent;

/// Watches a set of directories and forwards recognized filesystem changes
/// onto a shared `EventQueue`. Dropping the `DirectoryWatcher` stops
/// watching; the underlying `notify` watcher is torn down with it.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Start watching `directories`, pushing translated events onto
    /// `queue`. Every file under a watched root is surfaced — files with no
    /// registered parser are indexed as plain text (§4.1, §4.6), so
    /// filtering here is limited to directory entries themselves.
    pub fn start(directories: &[PathBuf], queue: Arc<EventQueue>) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| RetrievalErr::IndexError {
            path: PathBuf::new(),
            cause: format!("failed to start filesystem watcher: {e}"),
        })?;

        for dir in directories {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .map_err(|e| RetrievalErr::invalid_path(dir, e.to_string()))?;
        }

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for watch_event in translate(&event) {
                    queue.push(watch_event).await;
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

/// A path is skipped only when it's currently a directory. A path that no
/// longer exists (e.g. a delete/rename source) can't be stat'd, so it's
/// passed through — `UpdateWorker` handles a vanished file correctly either
/// way (§4.7).
fn is_watchable(p: &Path) -> bool {
    std::fs::metadata(p).map(|m| !m.is_dir()).unwrap_or(true)
}

/// Map one `notify::Event` to zero or more `WatchEvent`s, dropping
/// directory entries. Files with no registered parser are kept — they're
/// indexed as plain text (§4.1).
fn translate(event: &Event) -> Vec<WatchEvent> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter(|p| is_watchable(p))
            .map(|p| WatchEvent::Created(p.clone()))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter(|p| is_watchable(p))
            .map(|p| WatchEvent::Deleted(p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [src, dest] = event.paths.as_slice() {
                if is_watchable(src) || is_watchable(dest) {
                    return vec![WatchEvent::Moved {
                        src: src.clone(),
                        dest: dest.clone(),
                    }];
                }
            }
            Vec::new()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .filter(|p| is_watchable(p))
            .map(|p| WatchEvent::Deleted(p.clone()))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .filter(|p| is_watchable(p))
            .map(|p| WatchEvent::Created(p.clone()))
            .collect(),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|p| is_watchable(p))
            .map(|p| WatchEvent::Modified(p.clone()))
            .collect(),
        _ => Vec::new(),
    }
}
