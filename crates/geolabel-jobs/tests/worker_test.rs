//! Integration tests for the job runtime: queues, workers and the service

use async_trait::async_trait;
use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{
    GeoBounds, Job, JobFilter, JobId, JobKind, JobPayload, JobResult, JobStatus, ProgressUpdate,
    ProjectId,
};
use geolabel_core::ports::ProgressSink;
use geolabel_jobs::{JobExecutor, JobRuntime, ServiceSettings, WorkerSettings};
use geolabel_store::{FileJobStore, JobStore, MemoryJobStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

const BLOCKING_PROJECT: u64 = 100;
const FAILING_PROJECT: u64 = 200;
const PANICKING_PROJECT: u64 = 300;

/// Executor that records every call and behaves according to the project id
#[derive(Default)]
struct StubExecutor {
    calls: Mutex<Vec<JobId>>,
    release: Notify,
    checkpoint: Option<PathBuf>,
}

impl StubExecutor {
    fn with_checkpoint(path: PathBuf) -> Self {
        Self { checkpoint: Some(path), ..Self::default() }
    }

    fn calls(&self) -> Vec<JobId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobExecutor for StubExecutor {
    async fn execute(
        &self,
        job_id: JobId,
        payload: &JobPayload,
        progress: &dyn ProgressSink,
    ) -> Result<JobResult> {
        self.calls.lock().unwrap().push(job_id);
        progress.report_lossy(ProgressUpdate::new(50.0, "halfway"));

        match payload.project_id().0 {
            BLOCKING_PROJECT => self.release.notified().await,
            FAILING_PROJECT => return Err(GeolabelError::Training("loss diverged".to_string())),
            PANICKING_PROJECT => panic!("stub executor exploded"),
            _ => {}
        }

        let path = self.checkpoint.clone().unwrap_or_else(|| format!("job-{}.ckpt", job_id).into());
        Ok(JobResult::Checkpoint { path })
    }
}

/// Store whose reads and starts fail a set number of times before
/// delegating to an in-memory store
#[derive(Default)]
struct FlakyStore {
    inner: MemoryJobStore,
    get_failures: AtomicU32,
    start_failures: AtomicU32,
}

impl FlakyStore {
    fn failing(get_failures: u32, start_failures: u32) -> Self {
        Self {
            get_failures: AtomicU32::new(get_failures),
            start_failures: AtomicU32::new(start_failures),
            ..Self::default()
        }
    }

    fn trip(counter: &AtomicU32) -> Result<()> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(GeolabelError::Store("disk unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn create_job(&self, payload: JobPayload) -> Result<Job> {
        self.inner.create_job(payload).await
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        Self::trip(&self.get_failures)?;
        self.inner.get_job(id).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.inner.list_jobs(filter).await
    }

    async fn find_active(&self, kind: JobKind, project_id: ProjectId) -> Result<Option<Job>> {
        self.inner.find_active(kind, project_id).await
    }

    async fn mark_running(&self, id: JobId) -> Result<Job> {
        Self::trip(&self.start_failures)?;
        self.inner.mark_running(id).await
    }

    async fn update_progress(&self, id: JobId, update: &ProgressUpdate) -> Result<bool> {
        self.inner.update_progress(id, update).await
    }

    async fn complete(&self, id: JobId, result: JobResult) -> Result<Job> {
        self.inner.complete(id, result).await
    }

    async fn fail(&self, id: JobId, message: &str) -> Result<Job> {
        self.inner.fail(id, message).await
    }

    async fn cancel_pending(&self, id: JobId) -> Result<Job> {
        self.inner.cancel_pending(id).await
    }
}

fn worker_settings() -> WorkerSettings {
    WorkerSettings {
        poll_interval: Duration::from_millis(20),
        store_retry_attempts: 3,
        retry_backoff: Duration::from_millis(1),
    }
}

fn start(store: Arc<dyn JobStore>, executor: Arc<StubExecutor>) -> JobRuntime {
    JobRuntime::start(store, executor, ServiceSettings::default(), worker_settings())
}

fn training(project: u64) -> JobPayload {
    JobPayload::Training { project_id: ProjectId(project) }
}

async fn wait_for(store: &dyn JobStore, id: JobId, done: impl Fn(&Job) -> bool) -> Job {
    for _ in 0..500 {
        if let Some(job) = store.get_job(id).await.unwrap() {
            if done(&job) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach the expected state", id);
}

async fn wait_terminal(store: &dyn JobStore, id: JobId) -> Job {
    wait_for(store, id, |job| job.is_terminal()).await
}

#[tokio::test]
async fn test_jobs_drain_in_fifo_order() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(StubExecutor::default());
    let runtime = start(store.clone(), executor.clone());

    let mut ids = Vec::new();
    for project in 1..=5 {
        ids.push(runtime.service().enqueue(training(project)).await.unwrap().id);
    }

    let mut previous = None;
    for &id in &ids {
        let job = wait_terminal(store.as_ref(), id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert!(job.completed_at >= previous);
        previous = job.completed_at;
    }
    assert_eq!(executor.calls(), ids);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_cancel_before_dispatch_skips_execution() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(StubExecutor::default());
    let runtime = start(store.clone(), executor.clone());
    let service = runtime.service();

    let blocking = service.enqueue(training(BLOCKING_PROJECT)).await.unwrap();
    let queued = service.enqueue(training(2)).await.unwrap();
    wait_for(store.as_ref(), blocking.id, |job| job.status == JobStatus::Running).await;

    // the worker is busy, so the second job has not been dispatched yet
    let cancelled = service.cancel(queued.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    assert!(matches!(
        service.cancel(blocking.id).await,
        Err(GeolabelError::CancellationUnavailable { .. })
    ));
    assert_eq!(service.current(blocking.kind), Some(blocking.id));

    executor.release.notify_one();
    let last = service.enqueue(training(3)).await.unwrap();
    wait_terminal(store.as_ref(), last.id).await;

    assert_eq!(executor.calls(), vec![blocking.id, last.id]);
    let cancelled = store.get_job(queued.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.started_at.is_none());
    assert!(matches!(
        service.cancel(blocking.id).await,
        Err(GeolabelError::InvalidTransition { .. })
    ));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_failing_job_does_not_block_the_next() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(StubExecutor::default());
    let runtime = start(store.clone(), executor.clone());

    let failing = runtime.service().enqueue(training(FAILING_PROJECT)).await.unwrap();
    let panicking = runtime.service().enqueue(training(PANICKING_PROJECT)).await.unwrap();
    let healthy = runtime.service().enqueue(training(1)).await.unwrap();

    let failed = wait_terminal(store.as_ref(), failing.id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error_message.unwrap().contains("loss diverged"));
    assert!(failed.completed_at.is_some());

    let panicked = wait_terminal(store.as_ref(), panicking.id).await;
    assert_eq!(panicked.status, JobStatus::Failed);
    assert!(panicked.error_message.unwrap().contains("stub executor exploded"));

    let done = wait_terminal(store.as_ref(), healthy.id).await;
    assert_eq!(done.status, JobStatus::Completed);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_enqueue_rejects_second_active_job() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(StubExecutor::default());
    let runtime = start(store.clone(), executor.clone());

    let first = runtime.service().enqueue(training(BLOCKING_PROJECT)).await.unwrap();
    let err = runtime.service().enqueue(training(BLOCKING_PROJECT)).await.unwrap_err();
    assert!(matches!(err, GeolabelError::JobAlreadyActive { id, .. } if id == first.id));

    executor.release.notify_one();
    wait_terminal(store.as_ref(), first.id).await;
    assert!(runtime.service().enqueue(training(BLOCKING_PROJECT)).await.is_ok());
    executor.release.notify_one();

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_inference_prerequisites() {
    let dir = TempDir::new().unwrap();
    let checkpoint = dir.path().join("best.ckpt");
    std::fs::write(&checkpoint, b"weights").unwrap();

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(StubExecutor::with_checkpoint(checkpoint.clone()));
    let settings = ServiceSettings { max_tiles: 100, ..ServiceSettings::default() };
    let runtime = JobRuntime::start(store.clone(), executor, settings, worker_settings());
    let service = runtime.service();

    let small = GeoBounds::new(0.0, 0.0, 0.1, 0.1).unwrap();
    let large = GeoBounds::new(0.0, 0.0, 1.0, 1.0).unwrap();

    assert!(matches!(
        service.enqueue_inference(ProjectId(1), small).await,
        Err(GeolabelError::NoTrainedModel { project: 1 })
    ));
    assert!(matches!(
        service
            .enqueue(JobPayload::Inference {
                project_id: ProjectId(1),
                bounds: small,
                checkpoint: dir.path().join("missing.ckpt"),
            })
            .await,
        Err(GeolabelError::CheckpointMissing { .. })
    ));

    let trained = service.enqueue_training(ProjectId(1)).await.unwrap();
    wait_terminal(store.as_ref(), trained.id).await;
    assert_eq!(service.latest_checkpoint(ProjectId(1)).await.unwrap(), Some(checkpoint.clone()));

    assert!(matches!(
        service.enqueue_inference(ProjectId(1), large).await,
        Err(GeolabelError::TooManyTiles { max: 100, .. })
    ));

    let job = service.enqueue_inference(ProjectId(1), small).await.unwrap();
    match &job.payload {
        JobPayload::Inference { checkpoint: used, .. } => assert_eq!(used, &checkpoint),
        other => panic!("unexpected payload {:?}", other),
    }
    wait_terminal(store.as_ref(), job.id).await;

    // rejected requests leave no records behind
    let all = service.list(&JobFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_recovery_after_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.json");

    // state left behind by a previous process
    let (interrupted, pending) = {
        let store = FileJobStore::open(&path).await.unwrap();
        let a = store.create_job(training(1)).await.unwrap();
        store.mark_running(a.id).await.unwrap();
        let b = store.create_job(training(2)).await.unwrap();
        let c = store.create_job(training(3)).await.unwrap();
        (a.id, vec![b.id, c.id])
    };

    let store: Arc<dyn JobStore> = Arc::new(FileJobStore::open(&path).await.unwrap());
    let executor = Arc::new(StubExecutor::default());
    let runtime = start(store.clone(), executor.clone());

    let report = runtime.service().recover().await.unwrap();
    assert_eq!(report.interrupted, vec![interrupted]);
    assert_eq!(report.requeued, pending);

    for &id in &pending {
        assert_eq!(wait_terminal(store.as_ref(), id).await.status, JobStatus::Completed);
    }
    let failed = store.get_job(interrupted).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("interrupted by restart"));
    assert_eq!(executor.calls(), pending);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_leaves_queued_jobs_pending() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let executor = Arc::new(StubExecutor::default());
    let runtime = start(store.clone(), executor.clone());

    let running = runtime.service().enqueue(training(BLOCKING_PROJECT)).await.unwrap();
    let queued = runtime.service().enqueue(training(2)).await.unwrap();
    wait_for(store.as_ref(), running.id, |job| job.status == JobStatus::Running).await;

    let shutdown = tokio::spawn(runtime.shutdown());
    tokio::time::sleep(Duration::from_millis(50)).await;
    executor.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), shutdown).await.unwrap().unwrap();

    assert_eq!(store.get_job(running.id).await.unwrap().unwrap().status, JobStatus::Completed);
    assert_eq!(store.get_job(queued.id).await.unwrap().unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn test_transient_store_errors_are_retried() {
    let store = Arc::new(FlakyStore::failing(1, 1));
    let executor = Arc::new(StubExecutor::default());
    let runtime = start(store.clone(), executor.clone());

    let job = runtime.service().enqueue(training(1)).await.unwrap();

    let done = wait_terminal(&store.inner, job.id).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(executor.calls(), vec![job.id]);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_persistent_store_errors_fail_the_job() {
    // more failures than the worker's retry budget
    let store = Arc::new(FlakyStore::failing(0, 10));
    let executor = Arc::new(StubExecutor::default());
    let runtime = start(store.clone(), executor.clone());
    let service = runtime.service();

    let job = service.enqueue(training(1)).await.unwrap();

    let abandoned = wait_terminal(&store.inner, job.id).await;
    assert_eq!(abandoned.status, JobStatus::Failed);
    assert!(abandoned.error_message.unwrap().contains("disk unavailable"));
    assert!(executor.calls().is_empty());
    assert_eq!(service.current(JobKind::Training), None);

    // the project is free again
    store.start_failures.store(0, Ordering::SeqCst);
    let retry = service.enqueue(training(1)).await.unwrap();
    assert_eq!(wait_terminal(&store.inner, retry.id).await.status, JobStatus::Completed);

    runtime.shutdown().await;
}
