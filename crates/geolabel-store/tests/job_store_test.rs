//! Behaviour shared by every JobStore adapter, plus file durability

use geolabel_core::models::{
    GeoBounds, JobFilter, JobId, JobKind, JobPayload, JobResult, JobStatus, ProgressUpdate,
    ProjectId,
};
use geolabel_core::GeolabelError;
use geolabel_store::{FileJobStore, JobStore, MemoryJobStore};
use tempfile::TempDir;

fn inference(project: u64) -> JobPayload {
    JobPayload::Inference {
        project_id: ProjectId(project),
        bounds: GeoBounds::new(0.0, 0.0, 0.1, 0.1).unwrap(),
        checkpoint: "best.ckpt".into(),
    }
}

async fn check_lifecycle(store: &dyn JobStore) {
    let job = store.create_job(inference(1)).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let active = store.find_active(JobKind::Inference, ProjectId(1)).await.unwrap();
    assert_eq!(active.map(|j| j.id), Some(job.id));
    assert!(store.find_active(JobKind::Training, ProjectId(1)).await.unwrap().is_none());

    // progress before start is dropped
    assert!(!store.update_progress(job.id, &ProgressUpdate::new(10.0, "early")).await.unwrap());

    store.mark_running(job.id).await.unwrap();
    assert!(store.update_progress(job.id, &ProgressUpdate::new(45.0, "Downloading tile 3/5")).await.unwrap());

    let done = store
        .complete(job.id, JobResult::Checkpoint { path: "out.ckpt".into() })
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.completed_at.is_some());

    // terminal jobs stay as they are
    assert!(!store.update_progress(job.id, &ProgressUpdate::new(50.0, "late")).await.unwrap());
    assert!(store.fail(job.id, "late failure").await.is_err());
    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 100.0);
    assert!(stored.error_message.is_none());
}

async fn check_cancellation(store: &dyn JobStore) {
    let pending = store.create_job(inference(2)).await.unwrap();
    let cancelled = store.cancel_pending(pending.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    let running = store.create_job(inference(2)).await.unwrap();
    store.mark_running(running.id).await.unwrap();
    assert!(matches!(
        store.cancel_pending(running.id).await,
        Err(GeolabelError::CancellationUnavailable { .. })
    ));
    assert!(matches!(
        store.create_job(inference(2)).await,
        Err(GeolabelError::JobAlreadyActive { .. })
    ));

    store.fail(running.id, "boom").await.unwrap();
    assert!(matches!(
        store.cancel_pending(running.id).await,
        Err(GeolabelError::InvalidTransition { .. })
    ));
    assert!(matches!(
        store.cancel_pending(JobId(999)).await,
        Err(GeolabelError::JobNotFound { .. })
    ));

    let failed = store.list_jobs(&JobFilter::default().status(JobStatus::Failed)).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn test_memory_store_lifecycle() {
    let store = MemoryJobStore::new();
    check_lifecycle(&store).await;
    check_cancellation(&store).await;
}

#[tokio::test]
async fn test_file_store_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = FileJobStore::open(dir.path().join("jobs.json")).await.unwrap();
    check_lifecycle(&store).await;
    check_cancellation(&store).await;
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("jobs.json");

    let first = {
        let store = FileJobStore::open(&path).await.unwrap();
        let a = store.create_job(inference(1)).await.unwrap();
        store.create_job(JobPayload::Training { project_id: ProjectId(1) }).await.unwrap();
        store.mark_running(a.id).await.unwrap();
        a
    };

    let reopened = FileJobStore::open(&path).await.unwrap();
    let jobs = reopened.list_jobs(&JobFilter::default()).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, first.id);
    assert_eq!(jobs[0].status, JobStatus::Running);
    assert_eq!(jobs[0].payload, inference(1));

    // ids continue after the persisted ones
    let next = reopened.create_job(inference(5)).await.unwrap();
    assert_eq!(next.id, JobId(3));
}

#[tokio::test]
async fn test_file_store_rejects_corrupt_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(FileJobStore::open(&path).await, Err(GeolabelError::Store(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handles_on_one_file_do_not_lose_updates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.json");
    // separate handles stand in for a worker process and a CLI process
    let service = FileJobStore::open(&path).await.unwrap();
    let cli = FileJobStore::open(&path).await.unwrap();

    for round in 0..20u64 {
        let running = service
            .create_job(JobPayload::Training { project_id: ProjectId(1000 + round) })
            .await
            .unwrap()
            .id;
        service.mark_running(running).await.unwrap();
        let queued = cli.create_job(inference(2000 + round)).await.unwrap();

        let writer = service.clone();
        let progress = tokio::spawn(async move {
            for step in 0..50 {
                let update = ProgressUpdate::new(step as f32, "Downloading tile");
                writer.update_progress(running, &update).await.unwrap();
            }
        });

        let cancelled = cli.cancel_pending(queued.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        progress.await.unwrap();

        let stored = service.get_job(queued.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled, "round {}", round);
        let stored = cli.get_job(running).await.unwrap().unwrap();
        assert_eq!(stored.progress, 49.0, "round {}", round);

        service.fail(running, "done").await.unwrap();
    }
}
