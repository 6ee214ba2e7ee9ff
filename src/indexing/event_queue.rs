//! Bounded FIFO queue of `WatchEvent`s (§5).
//!
//! Single producer (the DirectoryWatcher), single consumer (the
//! UpdateWorker). When the queue is at capacity, the newest event is
//! dropped rather than blocking the watcher thread, and a reconciliation
//! flag is set so the caller can run a full directory scan to repair any
//! drift the drop introduced.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::Mutex;
use tokio::sync::Notify;

use crate::types::WatchEvent;

pub struct EventQueue {
    capacity: usize,
    pending: Mutex<VecDeque<WatchEvent>>,
    notify: Notify,
    dropped: AtomicU64,
    needs_reconciliation: AtomicBool,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            needs_reconciliation: AtomicBool::new(false),
        }
    }

    /// Push an event. Drops it and sets the reconciliation flag if the
    /// queue is already at capacity.
    pub async fn push(&self, event: WatchEvent) {
        let mut pending = self.pending.lock().await;
        if pending.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            self.needs_reconciliation.store(true, Ordering::Relaxed);
            tracing::warn!(
                capacity = self.capacity,
                "event queue at capacity, dropping event and flagging reconciliation"
            );
            return;
        }
        pending.push_back(event);
        drop(pending);
        self.notify.notify_one();
    }

    /// Pop the oldest event, waiting for one to arrive.
    pub async fn pop(&self) -> WatchEvent {
        loop {
            {
                let mut pending = self.pending.lock().await;
                if let Some(event) = pending.pop_front() {
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn needs_reconciliation(&self) -> bool {
        self.needs_reconciliation.load(Ordering::Relaxed)
    }

    pub fn clear_reconciliation_flag(&self) {
        self.needs_reconciliation.store(false, Ordering::Relaxed);
    }
}
