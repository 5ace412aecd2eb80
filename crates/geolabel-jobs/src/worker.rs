//! The long-lived task that executes one job kind's queue.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use geolabel_core::config::LayeredConfig;
use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{Job, JobId, JobKind, JobResult, JobStatus};
use geolabel_store::JobStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::executor::JobExecutor;
use crate::progress::ChannelProgress;
use crate::queue::QueueReceiver;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerSettings {
    /// Longest the worker blocks on an empty queue before re-checking for
    /// shutdown
    pub poll_interval: Duration,
    pub store_retry_attempts: u32,
    /// Back-off unit between store retries; attempt `n` waits
    /// `n * retry_backoff`
    pub retry_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            store_retry_attempts: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl WorkerSettings {
    pub fn from_config(config: &LayeredConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.value),
            store_retry_attempts: config.store_retry_attempts.value.max(1),
            ..Self::default()
        }
    }
}

pub struct Worker {
    kind: JobKind,
    queue: QueueReceiver,
    store: Arc<dyn JobStore>,
    executor: Arc<dyn JobExecutor>,
    settings: WorkerSettings,
}

/// Handle to a spawned worker
#[derive(Debug)]
pub struct WorkerHandle {
    kind: JobKind,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Ask the worker to stop and wait for it.
    ///
    /// A job that is already executing runs to completion first; jobs still
    /// queued stay pending in the store.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(kind = %self.kind, error = %e, "Worker task ended abnormally");
        }
    }
}

impl Worker {
    pub fn new(
        queue: QueueReceiver,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn JobExecutor>,
        settings: WorkerSettings,
    ) -> Self {
        Self { kind: queue.kind, queue, store, executor, settings }
    }

    pub fn spawn(self) -> WorkerHandle {
        let (shutdown, signal) = watch::channel(false);
        let kind = self.kind;
        let task = tokio::spawn(self.run(signal));
        WorkerHandle { kind, shutdown, task }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(kind = %self.kind, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // handle dropped without an explicit shutdown
                        break;
                    }
                }
                next = tokio::time::timeout(self.settings.poll_interval, self.queue.rx.recv()) => {
                    match next {
                        Ok(Some(id)) => self.process(id).await,
                        Ok(None) => {
                            tracing::info!(kind = %self.kind, "Queue closed");
                            break;
                        }
                        Err(_) => {} // idle
                    }
                }
            }
        }

        tracing::info!(kind = %self.kind, "Worker stopped");
    }

    async fn process(&self, id: JobId) {
        let job = match self.with_retry(id, "load job", || self.store.get_job(id)).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %id, "Dequeued unknown job");
                return;
            }
            Err(e) => {
                self.abandon(id, format!("Job store unavailable while loading job: {}", e)).await;
                return;
            }
        };

        if job.status != JobStatus::Pending {
            tracing::info!(job_id = %id, status = %job.status, "Skipping job that is no longer pending");
            return;
        }

        self.queue.set_current(Some(id));
        match self.with_retry(id, "start job", || self.store.mark_running(id)).await {
            Ok(_) => {}
            Err(e @ GeolabelError::InvalidTransition { .. }) => {
                // cancelled between the status check and here
                tracing::info!(job_id = %id, error = %e, "Job was not started");
                self.queue.set_current(None);
                return;
            }
            Err(e) => {
                self.queue.set_current(None);
                self.abandon(id, format!("Job store unavailable while starting job: {}", e)).await;
                return;
            }
        }

        tracing::info!(job_id = %id, kind = %self.kind, project = %job.project_id, "Job started");
        let outcome = self.execute(&job).await;

        match &outcome {
            Ok(result) => {
                tracing::info!(job_id = %id, output = %result.primary_path().display(), "Job completed")
            }
            Err(e) => tracing::warn!(job_id = %id, error = %e, "Job failed"),
        }

        self.write_terminal(id, outcome).await;
        self.queue.set_current(None);
    }

    /// Run the executor with a fresh progress channel and wait until every
    /// progress update has been persisted.
    async fn execute(&self, job: &Job) -> Result<JobResult> {
        let (progress, consumer) = ChannelProgress::spawn(job.id, self.store.clone());

        let outcome = AssertUnwindSafe(self.executor.execute(job.id, &job.payload, &progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(GeolabelError::Panicked(panic_message(&*panic))));

        drop(progress);
        if let Err(e) = consumer.await {
            tracing::warn!(job_id = %job.id, error = %e, "Progress consumer ended abnormally");
        }
        outcome
    }

    async fn write_terminal(&self, id: JobId, outcome: Result<JobResult>) {
        let written = match &outcome {
            Ok(result) => self
                .with_retry(id, "complete job", || self.store.complete(id, result.clone()))
                .await
                .map(drop),
            Err(e) => {
                let message = e.to_string();
                self.with_retry(id, "fail job", || self.store.fail(id, &message)).await.map(drop)
            }
        };

        if let Err(e) = written {
            tracing::error!(job_id = %id, error = %e, "Giving up on terminal job update");
        }
    }

    /// Fail a job the worker could not run because the store kept erroring.
    ///
    /// If even that write fails the job stays pending until the next
    /// [`JobService::recover`](crate::JobService::recover).
    async fn abandon(&self, id: JobId, message: String) {
        tracing::error!(job_id = %id, reason = %message, "Abandoning job");
        if let Err(e) = self.with_retry(id, "fail job", || self.store.fail(id, &message)).await {
            tracing::error!(job_id = %id, error = %e, "Could not record abandoned job, it stays pending");
        }
    }

    /// Run a store operation, retrying transient errors with linear
    /// back-off. Lifecycle errors are returned at once.
    async fn with_retry<T, F, Fut>(&self, id: JobId, action: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.settings.store_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts && is_transient(&e) => {
                    tracing::warn!(job_id = %id, action, attempt, error = %e, "Retrying job store operation");
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(error: &GeolabelError) -> bool {
    !matches!(error, GeolabelError::InvalidTransition { .. } | GeolabelError::JobNotFound { .. })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string())
}
