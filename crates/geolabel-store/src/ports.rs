use async_trait::async_trait;
use geolabel_core::error::Result;
use geolabel_core::models::{
    Job, JobFilter, JobId, JobKind, JobPayload, JobResult, ProgressUpdate, ProjectId,
};

/// Port for background job persistence
///
/// Every state change goes through one of the transition methods, which
/// enforce the job lifecycle. Terminal jobs are never modified.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a pending job for `payload`.
    ///
    /// Fails with `JobAlreadyActive` when a non-terminal job of the same
    /// kind and project exists.
    async fn create_job(&self, payload: JobPayload) -> Result<Job>;

    /// Retrieve a job by ID
    async fn get_job(&self, id: JobId) -> Result<Option<Job>>;

    /// List jobs matching `filter`, oldest first
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>>;

    /// The pending or running job of a kind for a project, if any
    async fn find_active(&self, kind: JobKind, project_id: ProjectId) -> Result<Option<Job>>;

    /// pending -> running
    async fn mark_running(&self, id: JobId) -> Result<Job>;

    /// Record progress on a running job.
    /// Returns `false` if the job is not running and the update was dropped.
    async fn update_progress(&self, id: JobId, update: &ProgressUpdate) -> Result<bool>;

    /// running -> completed
    async fn complete(&self, id: JobId, result: JobResult) -> Result<Job>;

    /// pending|running -> failed
    async fn fail(&self, id: JobId, message: &str) -> Result<Job>;

    /// pending -> cancelled
    async fn cancel_pending(&self, id: JobId) -> Result<Job>;
}
