//! The enqueue boundary for background jobs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use geolabel_core::config::LayeredConfig;
use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{
    GeoBounds, Job, JobFilter, JobId, JobKind, JobPayload, JobResult, JobStatus, ProjectId,
};
use geolabel_geo::GridSpec;
use geolabel_store::JobStore;

use crate::queue::JobQueue;

/// Limits checked before a job is accepted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceSettings {
    pub grid: GridSpec,
    pub max_tiles: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { grid: GridSpec::default(), max_tiles: 2500 }
    }
}

impl ServiceSettings {
    pub fn from_config(config: &LayeredConfig) -> Self {
        Self {
            grid: GridSpec {
                tile_size_px: config.tile_size.value,
                resolution_m: config.resolution_m.value,
                overlap: config.overlap.value,
            },
            max_tiles: config.max_tiles.value,
        }
    }
}

/// Outcome of [`JobService::recover`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Jobs found running and marked failed
    pub interrupted: Vec<JobId>,
    /// Pending jobs pushed back onto their queues, oldest first
    pub requeued: Vec<JobId>,
}

/// Accepts, cancels and inspects jobs.
///
/// This is the only place that creates jobs, so the "one active job per
/// kind and project" rule is checked here before anything is queued.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    queues: HashMap<JobKind, JobQueue>,
    settings: ServiceSettings,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        queues: impl IntoIterator<Item = JobQueue>,
        settings: ServiceSettings,
    ) -> Self {
        let queues = queues.into_iter().map(|q| (q.kind(), q)).collect();
        Self { store, queues, settings }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    fn queue(&self, kind: JobKind) -> Result<&JobQueue> {
        self.queues.get(&kind).ok_or(GeolabelError::QueueClosed { kind })
    }

    /// Validate, persist and queue a job.
    pub async fn enqueue(&self, payload: JobPayload) -> Result<Job> {
        let kind = payload.kind();
        if let Some(active) = self.store.find_active(kind, payload.project_id()).await? {
            return Err(GeolabelError::JobAlreadyActive {
                id: active.id,
                kind,
                status: active.status,
            });
        }
        self.validate(&payload).await?;

        let job = self.store.create_job(payload).await?;
        if let Err(e) = self.queue(kind).and_then(|queue| queue.push(job.id)) {
            // no worker will ever pick it up
            self.store.fail(job.id, &e.to_string()).await?;
            return Err(e);
        }

        tracing::info!(job_id = %job.id, kind = %kind, project = %job.project_id, "Job queued");
        Ok(job)
    }

    pub async fn enqueue_training(&self, project_id: ProjectId) -> Result<Job> {
        self.enqueue(JobPayload::Training { project_id }).await
    }

    /// Queue inference over `bounds` with the project's latest checkpoint.
    pub async fn enqueue_inference(&self, project_id: ProjectId, bounds: GeoBounds) -> Result<Job> {
        let checkpoint = self
            .latest_checkpoint(project_id)
            .await?
            .ok_or(GeolabelError::NoTrainedModel { project: project_id.0 })?;
        self.enqueue(JobPayload::Inference { project_id, bounds, checkpoint }).await
    }

    async fn validate(&self, payload: &JobPayload) -> Result<()> {
        if let JobPayload::Inference { bounds, checkpoint, .. } = payload {
            let count = self.settings.grid.tile_count(bounds)?;
            if count > self.settings.max_tiles {
                return Err(GeolabelError::TooManyTiles { count, max: self.settings.max_tiles });
            }
            if !tokio::fs::try_exists(checkpoint).await.unwrap_or(false) {
                return Err(GeolabelError::CheckpointMissing { path: checkpoint.clone() });
            }
        }
        Ok(())
    }

    /// Cancel a job that has not started yet.
    pub async fn cancel(&self, id: JobId) -> Result<Job> {
        let job = self.store.cancel_pending(id).await?;
        tracing::info!(job_id = %id, "Job cancelled");
        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Job> {
        self.store.get_job(id).await?.ok_or(GeolabelError::JobNotFound { id })
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.store.list_jobs(filter).await
    }

    /// The job a kind's worker is executing right now
    pub fn current(&self, kind: JobKind) -> Option<JobId> {
        self.queues.get(&kind).and_then(JobQueue::current)
    }

    /// Checkpoint of the project's most recently completed training job
    pub async fn latest_checkpoint(&self, project_id: ProjectId) -> Result<Option<PathBuf>> {
        let filter = JobFilter::default()
            .kind(JobKind::Training)
            .project(project_id)
            .status(JobStatus::Completed);
        let jobs = self.store.list_jobs(&filter).await?;

        Ok(jobs
            .into_iter()
            .max_by_key(|job| (job.completed_at, job.id))
            .and_then(|job| match job.result {
                Some(JobResult::Checkpoint { path }) => Some(path),
                _ => None,
            }))
    }

    /// Reconcile the store with an empty process after a restart.
    ///
    /// Jobs left running by the previous process are failed; pending jobs
    /// are queued again in creation order. Call once, before new jobs are
    /// enqueued.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        let running = self.store.list_jobs(&JobFilter::default().status(JobStatus::Running)).await?;
        for job in running {
            self.store.fail(job.id, "interrupted by restart").await?;
            tracing::warn!(job_id = %job.id, kind = %job.kind, "Marked interrupted job as failed");
            report.interrupted.push(job.id);
        }

        let mut pending = self.store.list_jobs(&JobFilter::default().status(JobStatus::Pending)).await?;
        pending.sort_by_key(|job| (job.created_at, job.id));
        for job in pending {
            self.queue(job.kind)?.push(job.id)?;
            report.requeued.push(job.id);
        }

        if !report.interrupted.is_empty() || !report.requeued.is_empty() {
            tracing::info!(
                interrupted = report.interrupted.len(),
                requeued = report.requeued.len(),
                "Recovered jobs from previous run"
            );
        }
        Ok(report)
    }
}
