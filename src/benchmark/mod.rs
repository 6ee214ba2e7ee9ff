//! FIFO benchmark job queue with bounded concurrency, cooperative
//! cancellation, and atomic JSON persistence (§4.11).

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::Result;
use crate::error::RetrievalErr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One benchmark run: a model identity, its run parameters, and (once
/// finished) its metrics or error. The `model_name`/`params`/`metrics`
/// shape is carried over from the original tool's job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkJob {
    pub id: String,
    pub model_name: String,
    pub params: HashMap<String, String>,
    pub state: JobState,
    pub queued_at: f64,
    pub started_at: Option<f64>,
    pub finished_at: Option<f64>,
    pub metrics: Option<HashMap<String, f64>>,
    pub error: Option<String>,
}

/// Executes one benchmark job, observing `cancelled` at its own
/// checkpoints. Implementations own whatever model-loading or inference
/// work the benchmark measures.
#[async_trait]
pub trait BenchmarkRunner: Send + Sync {
    async fn run(
        &self,
        job: &BenchmarkJob,
        cancelled: Arc<AtomicBool>,
    ) -> std::result::Result<HashMap<String, f64>, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStatus {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct State {
    jobs: HashMap<String, BenchmarkJob>,
    queue_order: VecDeque<String>,
    cancel_flags: HashMap<String, Arc<AtomicBool>>,
}

pub struct BenchmarkQueue {
    path: PathBuf,
    max_concurrent: usize,
    state: RwLock<State>,
    notify: Notify,
}

impl BenchmarkQueue {
    /// Load a queue from `path`. Jobs left `Running` from a prior process
    /// (a crash mid-run) are requeued as `Queued` with their start time
    /// cleared.
    pub async fn load(path: &Path, max_concurrent: usize) -> Result<Arc<Self>> {
        let mut jobs: HashMap<String, BenchmarkJob> = if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            serde_json::from_str(&content).map_err(|e| RetrievalErr::ManifestCorrupt {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?
        } else {
            HashMap::new()
        };

        let mut queue_order = VecDeque::new();
        let mut by_queued_at: Vec<&BenchmarkJob> = Vec::new();
        for job in jobs.values_mut() {
            if job.state == JobState::Running {
                job.state = JobState::Queued;
                job.started_at = None;
            }
        }
        for job in jobs.values() {
            if job.state == JobState::Queued {
                by_queued_at.push(job);
            }
        }
        by_queued_at.sort_by(|a, b| a.queued_at.partial_cmp(&b.queued_at).unwrap());
        for job in by_queued_at {
            queue_order.push_back(job.id.clone());
        }

        let queue = Arc::new(Self {
            path: path.to_path_buf(),
            max_concurrent: max_concurrent.max(1),
            state: RwLock::new(State {
                jobs,
                queue_order,
                cancel_flags: HashMap::new(),
            }),
            notify: Notify::new(),
        });
        queue.persist().await?;
        Ok(queue)
    }

    /// Enqueue a new job and return its id.
    pub async fn enqueue(
        &self,
        model_name: impl Into<String>,
        params: HashMap<String, String>,
        queued_at: f64,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let job = BenchmarkJob {
            id: id.clone(),
            model_name: model_name.into(),
            params,
            state: JobState::Queued,
            queued_at,
            started_at: None,
            finished_at: None,
            metrics: None,
            error: None,
        };

        {
            let mut state = self.state.write().await;
            state.queue_order.push_back(id.clone());
            state.jobs.insert(id.clone(), job);
        }
        self.persist().await?;
        self.notify.notify_one();
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Option<BenchmarkJob> {
        self.state.read().await.jobs.get(id).cloned()
    }

    /// Cancel a job. Queued jobs transition synchronously; running jobs
    /// have their cooperative cancellation flag set and finish on their
    /// own. Returns `false` if `id` is unknown.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let cancelled_inline = {
            let mut state = self.state.write().await;
            match state.jobs.get(id).map(|j| j.state) {
                Some(JobState::Queued) => {
                    state.queue_order.retain(|qid| qid != id);
                    if let Some(job) = state.jobs.get_mut(id) {
                        job.state = JobState::Cancelled;
                        job.finished_at = Some(job.queued_at);
                    }
                    true
                }
                Some(JobState::Running) => {
                    if let Some(flag) = state.cancel_flags.get(id) {
                        flag.store(true, Ordering::Relaxed);
                    }
                    false
                }
                _ => return Ok(false),
            }
        };
        if cancelled_inline {
            self.persist().await?;
        }
        Ok(true)
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.state.read().await;
        let mut status = QueueStatus::default();
        for job in state.jobs.values() {
            match job.state {
                JobState::Queued => status.queued += 1,
                JobState::Running => status.running += 1,
                JobState::Completed => status.completed += 1,
                JobState::Failed => status.failed += 1,
                JobState::Cancelled => status.cancelled += 1,
            }
        }
        status
    }

    /// Remove every job in a terminal state and return how many were
    /// removed.
    pub async fn clear_completed(&self) -> Result<usize> {
        let removed = {
            let mut state = self.state.write().await;
            let terminal: Vec<String> = state
                .jobs
                .iter()
                .filter(|(_, job)| {
                    matches!(
                        job.state,
                        JobState::Completed | JobState::Failed | JobState::Cancelled
                    )
                })
                .map(|(id, _)| id.clone())
                .collect();
            for id in &terminal {
                state.jobs.remove(id);
                state.cancel_flags.remove(id);
            }
            terminal.len()
        };
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn pop_next_queued(&self) -> Option<(BenchmarkJob, Arc<AtomicBool>)> {
        let mut state = self.state.write().await;
        let id = state.queue_order.pop_front()?;
        let flag = Arc::new(AtomicBool::new(false));
        state.cancel_flags.insert(id.clone(), flag.clone());
        let job = state.jobs.get_mut(&id)?;
        job.state = JobState::Running;
        Some((job.clone(), flag))
    }

    async fn finish(
        &self,
        id: &str,
        result: std::result::Result<HashMap<String, f64>, String>,
        now: f64,
    ) {
        let mut state = self.state.write().await;
        state.cancel_flags.remove(id);
        if let Some(job) = state.jobs.get_mut(id) {
            job.finished_at = Some(now);
            match result {
                Ok(metrics) => {
                    job.metrics = Some(metrics);
                    job.state = JobState::Completed;
                }
                Err(message) => {
                    job.state = if message.to_lowercase().contains("cancelled") {
                        JobState::Cancelled
                    } else {
                        JobState::Failed
                    };
                    job.error = Some(message);
                }
            }
        }
    }

    async fn running_count(&self) -> usize {
        self.state
            .read()
            .await
            .jobs
            .values()
            .filter(|j| j.state == JobState::Running)
            .count()
    }

    async fn persist(&self) -> Result<()> {
        let serialized = {
            let state = self.state.read().await;
            serde_json::to_string_pretty(&state.jobs)?
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, serialized).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    /// Drive the queue: consume jobs while `running < max_concurrent`,
    /// waiting on enqueue/completion signals otherwise. Finishes the
    /// current loop iteration and returns once `shutdown` is set and no
    /// jobs remain in flight.
    pub async fn run(
        self: &Arc<Self>,
        runner: Arc<dyn BenchmarkRunner>,
        shutdown: Arc<AtomicBool>,
        now: impl Fn() -> f64 + Send + Sync + 'static,
    ) {
        let now = Arc::new(now);
        let mut in_flight: JoinSet<(String, std::result::Result<HashMap<String, f64>, String>)> =
            JoinSet::new();

        loop {
            while self.running_count().await < self.max_concurrent {
                let Some((job, flag)) = self.pop_next_queued().await else {
                    break;
                };
                if let Err(e) = self.persist().await {
                    tracing::warn!(error = %e, "failed to persist benchmark queue");
                }
                let runner = runner.clone();
                in_flight.spawn(async move {
                    let result = runner.run(&job, flag).await;
                    (job.id, result)
                });
            }

            if in_flight.is_empty() {
                if shutdown.load(Ordering::Relaxed) {
                    return;
                }
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
                continue;
            }

            if let Some(Ok((id, result))) = in_flight.join_next().await {
                self.finish(&id, result, now()).await;
                if let Err(e) = self.persist().await {
                    tracing::warn!(error = %e, "failed to persist benchmark queue");
                }
            }

            if shutdown.load(Ordering::Relaxed) && in_flight.is_empty() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct InstantRunner {
        fail: bool,
    }

    #[async_trait]
    impl BenchmarkRunner for InstantRunner {
        async fn run(
            &self,
            _job: &BenchmarkJob,
            _cancelled: Arc<AtomicBool>,
        ) -> std::result::Result<HashMap<String, f64>, String> {
            if self.fail {
                Err("boom".to_string())
            } else {
                let mut metrics = HashMap::new();
                metrics.insert("tokens_per_second".to_string(), 42.0);
                Ok(metrics)
            }
        }
    }

    #[tokio::test]
    async fn enqueue_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let queue = BenchmarkQueue::load(&dir.path().join("jobs.json"), 1).await.unwrap();
        let id = queue.enqueue("llama", HashMap::new(), 0.0).await.unwrap();
        let job = queue.get(&id).await.unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.model_name, "llama");
    }

    #[tokio::test]
    async fn cancel_queued_job_is_synchronous() {
        let dir = TempDir::new().unwrap();
        let queue = BenchmarkQueue::load(&dir.path().join("jobs.json"), 1).await.unwrap();
        let id = queue.enqueue("llama", HashMap::new(), 0.0).await.unwrap();

        assert!(queue.cancel(&id).await.unwrap());
        assert_eq!(queue.get(&id).await.unwrap().state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn cancel_unknown_job_returns_false() {
        let dir = TempDir::new().unwrap();
        let queue = BenchmarkQueue::load(&dir.path().join("jobs.json"), 1).await.unwrap();
        assert!(!queue.cancel("missing").await.unwrap());
    }

    #[tokio::test]
    async fn run_processes_queued_job_to_completion() {
        let dir = TempDir::new().unwrap();
        let queue = BenchmarkQueue::load(&dir.path().join("jobs.json"), 1).await.unwrap();
        let id = queue.enqueue("llama", HashMap::new(), 0.0).await.unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let runner = Arc::new(InstantRunner { fail: false });
        let shutdown_clone = shutdown.clone();
        let queue_clone = queue.clone();
        let handle = tokio::spawn(async move {
            queue_clone.run(runner, shutdown_clone, || 1.0).await;
        });

        for _ in 0..50 {
            if queue.get(&id).await.unwrap().state == JobState::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.store(true, Ordering::Relaxed);
        queue.notify.notify_one();
        handle.await.unwrap();

        let job = queue.get(&id).await.unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.metrics.unwrap().get("tokens_per_second"), Some(&42.0));
    }

    #[tokio::test]
    async fn failed_job_with_cancelled_message_is_reclassified() {
        let dir = TempDir::new().unwrap();
        let queue = BenchmarkQueue::load(&dir.path().join("jobs.json"), 1).await.unwrap();
        let id = queue.enqueue("llama", HashMap::new(), 0.0).await.unwrap();
        let (job, _flag) = queue.pop_next_queued().await.unwrap();
        assert_eq!(job.id, id);

        queue
            .finish(&id, Err("operation was Cancelled by user".to_string()), 2.0)
            .await;
        assert_eq!(queue.get(&id).await.unwrap().state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn requeues_running_jobs_as_queued_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        let mut jobs = HashMap::new();
        jobs.insert(
            "abc".to_string(),
            BenchmarkJob {
                id: "abc".to_string(),
                model_name: "llama".to_string(),
                params: HashMap::new(),
                state: JobState::Running,
                queued_at: 0.0,
                started_at: Some(5.0),
                finished_at: None,
                metrics: None,
                error: None,
            },
        );
        tokio::fs::write(&path, serde_json::to_string(&jobs).unwrap()).await.unwrap();

        let queue = BenchmarkQueue::load(&path, 1).await.unwrap();
        let job = queue.get("abc").await.unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert!(job.started_at.is_none());
    }

    #[tokio::test]
    async fn clear_completed_removes_terminal_jobs() {
        let dir = TempDir::new().unwrap();
        let queue = BenchmarkQueue::load(&dir.path().join("jobs.json"), 1).await.unwrap();
        let id = queue.enqueue("llama", HashMap::new(), 0.0).await.unwrap();
        queue.cancel(&id).await.unwrap();

        let removed = queue.clear_completed().await.unwrap();
        assert_eq!(removed, 1);
        assert!(queue.get(&id).await.is_none());
    }
}
