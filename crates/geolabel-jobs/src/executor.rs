use async_trait::async_trait;
use geolabel_core::error::Result;
use geolabel_core::models::{JobId, JobPayload, JobResult};
use geolabel_core::ports::ProgressSink;

/// The work a worker performs for one job.
///
/// Implementations report progress through `progress` on a best-effort
/// basis and return the result reference to store on the job.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(
        &self,
        job_id: JobId,
        payload: &JobPayload,
        progress: &dyn ProgressSink,
    ) -> Result<JobResult>;
}
