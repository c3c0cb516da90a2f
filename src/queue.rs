//! Intake queue and worker pool.
//!
//! The HTTP handler pushes [`QueueEntry`] values through a bounded tokio
//! channel without ever blocking; a fixed number of workers share the
//! receiving end and hand each entry to a [`TaskRunner`]. Every run happens
//! in its own spawned task, so an error or panic only costs that one entry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::EnqueueError;
use crate::models::TaskRequest;

/// A queued task request plus the bookkeeping used for log correlation.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub job_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub request: TaskRequest,
}

impl QueueEntry {
    pub fn new(request: TaskRequest) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            request,
        }
    }
}

/// Executes one dequeued entry.
///
/// Real implementation: `TaskPipeline`. Tests use lightweight fakes.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, entry: &QueueEntry) -> Result<()>;
}

/// Sending half of the bounded task mailbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IntakeQueue {
    tx: mpsc::Sender<QueueEntry>,
    capacity: usize,
}

impl IntakeQueue {
    /// Create a queue holding at most `capacity` waiting entries.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<QueueEntry>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    /// Enqueue without waiting. Returns the new entry's job id.
    pub fn enqueue(&self, request: TaskRequest) -> Result<Uuid, EnqueueError> {
        let entry = QueueEntry::new(request);
        let job_id = entry.job_id;
        match self.tx.try_send(entry) {
            Ok(()) => {
                tracing::debug!(%job_id, queued = self.pending(), "Task enqueued");
                Ok(job_id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(EnqueueError::Full {
                capacity: self.capacity,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries currently waiting.
    pub fn pending(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}

/// Outcome counters across all workers.
#[derive(Debug, Default)]
pub struct PoolStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl PoolStats {
    /// Entries whose run returned `Ok`.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Entries whose run returned an error or panicked.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Fixed set of workers draining one queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn spawn(workers: usize, rx: mpsc::Receiver<QueueEntry>, runner: Arc<dyn TaskRunner>) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(PoolStats::default());
        let handles = (1..=workers.max(1))
            .map(|worker_id| {
                let rx = rx.clone();
                let runner = runner.clone();
                let stats = stats.clone();
                tokio::spawn(async move { worker_loop(worker_id, rx, runner, stats).await })
            })
            .collect();
        tracing::info!(workers = workers.max(1), "Started background workers");
        Self { handles, stats }
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    /// Wait for every worker to exit. Workers stop once all senders are
    /// dropped and the queue is empty, so queued entries are drained first.
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
        tracing::info!(
            processed = self.stats.processed(),
            failed = self.stats.failed(),
            "All workers stopped"
        );
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<QueueEntry>>>,
    runner: Arc<dyn TaskRunner>,
    stats: Arc<PoolStats>,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(entry) = next else {
            tracing::debug!(worker_id, "Queue closed, worker exiting");
            return;
        };

        let job_id = entry.job_id;
        let task = entry.request.task.clone();
        let round = entry.request.round;
        let waited_ms = (Utc::now() - entry.enqueued_at).num_milliseconds();
        tracing::info!(worker_id, %job_id, %task, round, waited_ms, "Worker picked up task");

        let run = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run(&entry).await })
        };
        match run.await {
            Ok(Ok(())) => {
                stats.processed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(worker_id, %job_id, %task, round, "Task finished");
            }
            Ok(Err(e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker_id, %job_id, %task, round, error = %format!("{:#}", e), "Task failed");
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(worker_id, %job_id, %task, round, error = %e, "Task panicked");
            }
        }
    }
}
