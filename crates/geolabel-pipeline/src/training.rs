use std::path::PathBuf;
use std::sync::Arc;

use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{JobId, ProgressUpdate, ProjectId};
use geolabel_core::ports::{ProgressSink, Trainer};

/// Runs a training job through the injected trainer
pub struct TrainingPipeline {
    trainer: Arc<dyn Trainer>,
}

impl TrainingPipeline {
    pub fn new(trainer: Arc<dyn Trainer>) -> Self {
        Self { trainer }
    }

    /// Train and return the checkpoint path, which must exist afterwards.
    pub async fn run(
        &self,
        job_id: JobId,
        project_id: ProjectId,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        progress.report_lossy(ProgressUpdate::new(0.0, "Starting training...").with_stage("training"));

        let checkpoint = self.trainer.train(project_id, job_id, progress).await?;
        if !tokio::fs::try_exists(&checkpoint).await.unwrap_or(false) {
            return Err(GeolabelError::Training(format!(
                "trainer reported checkpoint {} but it does not exist",
                checkpoint.display()
            )));
        }

        tracing::info!(job_id = %job_id, project = %project_id, checkpoint = %checkpoint.display(), "Training finished");
        progress.report_lossy(ProgressUpdate::new(100.0, "Training complete").with_stage("completed"));
        Ok(checkpoint)
    }
}
