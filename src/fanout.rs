//! Bounded background queue for post-commit work.
//!
//! Jobs are boxed futures pushed onto a bounded channel. A dispatcher task
//! pulls them off and runs each on a [`TaskTracker`], holding a semaphore
//! permit so at most `workers` jobs run at once. Every job runs under a time
//! limit.
//!
//! Submission never blocks: a full or closed queue rejects the job and the
//! caller moves on. On shutdown the queue stops accepting, already queued
//! jobs still run, and the caller waits up to `drain_timeout` for them.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::observability::metrics::{record_fanout_dropped, record_fanout_failure};

/// A queued job with the name used in logs and metrics.
struct QueuedJob {
    name: &'static str,
    job: BoxFuture<'static, ()>,
}

/// Fan-out queue settings.
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Maximum concurrently running jobs.
    pub workers: usize,
    /// Maximum queued jobs waiting for a worker.
    pub capacity: usize,
    /// Time limit for a single job.
    pub job_timeout: Duration,
    /// How long shutdown waits for queued and running jobs.
    pub drain_timeout: Duration,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            capacity: 1024,
            job_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Cloneable submit side of the queue.
#[derive(Clone)]
pub struct FanoutHandle {
    sender: mpsc::Sender<QueuedJob>,
}

impl FanoutHandle {
    /// Queue `job` without waiting. Returns `false` if the queue is full or
    /// shut down, in which case the job is dropped.
    pub fn submit<F>(&self, name: &'static str, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let queued = QueuedJob {
            name,
            job: job.boxed(),
        };
        match self.sender.try_send(queued) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(task = name, "Background queue full, job dropped");
                record_fanout_dropped(name);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(task = name, "Background queue closed, job dropped");
                record_fanout_dropped(name);
                false
            }
        }
    }
}

/// Owner of the dispatcher task.
pub struct Fanout {
    handle: FanoutHandle,
    dispatcher: JoinHandle<()>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    drain_timeout: Duration,
}

impl Fanout {
    /// Start the dispatcher. Must be called from within a Tokio runtime.
    pub fn spawn(config: FanoutConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let dispatcher = tokio::spawn(dispatch(
            receiver,
            tracker.clone(),
            cancel.clone(),
            Arc::new(Semaphore::new(config.workers.max(1))),
            config.job_timeout,
        ));

        Self {
            handle: FanoutHandle { sender },
            dispatcher,
            tracker,
            cancel,
            drain_timeout: config.drain_timeout,
        }
    }

    pub fn handle(&self) -> FanoutHandle {
        self.handle.clone()
    }

    /// Number of jobs currently running.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting jobs, run what is already queued and wait for it.
    ///
    /// Returns `true` if everything finished within the drain timeout.
    pub async fn shutdown(self) -> bool {
        self.cancel.cancel();
        let tracker = self.tracker.clone();
        let dispatcher = self.dispatcher;

        let drained = tokio::time::timeout(self.drain_timeout, async move {
            if let Err(e) = dispatcher.await {
                tracing::error!(error = %e, "Background dispatcher failed");
            }
            tracker.close();
            tracker.wait().await;
        })
        .await
        .is_ok();

        if drained {
            tracing::debug!("Background queue drained");
        } else {
            tracing::warn!(
                running = self.tracker.len(),
                timeout_ms = self.drain_timeout.as_millis() as u64,
                "Background queue did not drain in time"
            );
        }
        drained
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<QueuedJob>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    semaphore: Arc<Semaphore>,
    job_timeout: Duration,
) {
    loop {
        let queued = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            queued = receiver.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
        };
        if !run(queued, &tracker, &semaphore, job_timeout).await {
            return;
        }
    }

    // Reject new submissions, then run everything already queued.
    receiver.close();
    while let Some(queued) = receiver.recv().await {
        if !run(queued, &tracker, &semaphore, job_timeout).await {
            return;
        }
    }
}

/// Wait for a worker slot and start the job. `false` if the semaphore closed.
async fn run(
    queued: QueuedJob,
    tracker: &TaskTracker,
    semaphore: &Arc<Semaphore>,
    job_timeout: Duration,
) -> bool {
    let Ok(permit) = semaphore.clone().acquire_owned().await else {
        return false;
    };

    let QueuedJob { name, job } = queued;
    tracker.spawn(async move {
        let _permit = permit;
        if tokio::time::timeout(job_timeout, job).await.is_err() {
            tracing::warn!(
                task = name,
                timeout_ms = job_timeout.as_millis() as u64,
                "Background job timed out"
            );
            record_fanout_failure("timeout");
        }
    });
    true
}
