//! Filesystem watching and the single-consumer indexing pipeline (§4.6-§4.8, §5).

pub mod event_queue;
pub mod update_worker;
pub mod watched_dirs;
pub mod watcher;

pub use event_queue::EventQueue;
pub use update_worker::UpdateWorker;
pub use watched_dirs::WatchedDirectoriesManager;
pub use watcher::DirectoryWatcher;
