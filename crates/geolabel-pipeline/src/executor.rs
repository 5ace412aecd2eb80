use async_trait::async_trait;
use geolabel_core::error::Result;
use geolabel_core::models::{JobId, JobPayload, JobResult};
use geolabel_core::ports::ProgressSink;
use geolabel_jobs::JobExecutor;

use crate::inference::{InferencePipeline, InferenceRequest};
use crate::training::TrainingPipeline;

/// Dispatches job payloads to the matching pipeline
pub struct PipelineExecutor {
    training: TrainingPipeline,
    inference: InferencePipeline,
}

impl PipelineExecutor {
    pub fn new(training: TrainingPipeline, inference: InferencePipeline) -> Self {
        Self { training, inference }
    }
}

#[async_trait]
impl JobExecutor for PipelineExecutor {
    async fn execute(
        &self,
        job_id: JobId,
        payload: &JobPayload,
        progress: &dyn ProgressSink,
    ) -> Result<JobResult> {
        match payload {
            JobPayload::Training { project_id } => {
                let path = self.training.run(job_id, *project_id, progress).await?;
                Ok(JobResult::Checkpoint { path })
            }
            JobPayload::Inference { project_id, bounds, checkpoint } => {
                let request = InferenceRequest {
                    job_id,
                    project_id: *project_id,
                    bounds: *bounds,
                    checkpoint: checkpoint.clone(),
                };
                let artifacts = self.inference.run(&request, progress).await?;
                Ok(JobResult::Inference(artifacts))
            }
        }
    }
}
