//! Hand-off of due entries to worker threads.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use txno_core::Entry;

/// Blocking work that executes one entry.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Accepts entries for execution away from the calling thread.
pub trait Submitter: Send + Sync {
    /// Queue `job`, which executes `entry`.
    ///
    /// Returns `false` when the job was not accepted. That is never fatal:
    /// the entry stays in the table and a later flush retries it.
    fn submit(&self, entry: &Entry, job: Job) -> bool;
}

/// Configuration for the executor submitter.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Jobs that may run at once.
    pub workers: usize,
    /// Jobs that may wait for a worker before submission starts failing.
    pub queue_capacity: usize,
    /// Upper bound on how long `shutdown` waits for queued and running jobs.
    pub shutdown_timeout: Duration,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Bounded worker pool on the tokio blocking thread pool.
///
/// Jobs go through a bounded channel. A full queue rejects the job rather
/// than blocking the submitter.
pub struct ExecutorSubmitter {
    config: SubmitterConfig,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutorSubmitter {
    /// Spawn the worker tasks. Must be called within a tokio runtime.
    pub fn start(config: SubmitterConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else {
                            break;
                        };
                        if let Err(e) = tokio::task::spawn_blocking(job).await {
                            error!(worker, error = %e, "Outbox job panicked");
                        }
                    }
                    debug!(worker, "Submitter worker stopped");
                })
            })
            .collect();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "Submitter started"
        );

        Self {
            config,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Stop accepting jobs and wait, bounded, for queued and running ones.
    ///
    /// Returns whether every worker finished within the timeout.
    pub async fn shutdown(&self) -> bool {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return true;
        }

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            for worker in workers {
                if let Err(e) = worker.await {
                    warn!(error = %e, "Submitter worker failed");
                }
            }
        })
        .await
        .is_ok();

        if drained {
            info!("Submitter shut down");
        } else {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Submitter shutdown timed out with work in flight"
            );
        }
        drained
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl Submitter for ExecutorSubmitter {
    fn submit(&self, entry: &Entry, job: Job) -> bool {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            debug!(entry = %entry.description(), "Submitter shut down; leaving entry for flush");
            return false;
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(entry = %entry.description(), "Queue full; leaving entry for flush");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(entry = %entry.description(), "Queue closed; leaving entry for flush");
                false
            }
        }
    }
}
