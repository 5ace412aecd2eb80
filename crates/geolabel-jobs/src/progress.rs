//! Progress reporting from running jobs to the job store.
//!
//! Job logic reports through a [`ChannelProgress`] sink; a consumer task
//! owns the receiving end and persists each update in order.

use std::sync::Arc;

use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{JobId, ProgressUpdate};
use geolabel_core::ports::ProgressSink;
use geolabel_store::JobStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Sending half of a job's progress channel
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    job_id: JobId,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgress {
    /// Create a progress channel for `job_id` and spawn the task that
    /// persists its updates. The task ends once every sender is dropped.
    pub fn spawn(job_id: JobId, store: Arc<dyn JobStore>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(persist_progress(job_id, store, rx));
        (Self { job_id, tx }, consumer)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, update: ProgressUpdate) -> Result<()> {
        tracing::debug!(job_id = %self.job_id, percent = update.percent, message = %update.message, "Progress");
        self.tx
            .send(update)
            .map_err(|_| GeolabelError::Store(format!("progress channel for job {} closed", self.job_id)))
    }
}

async fn persist_progress(
    job_id: JobId,
    store: Arc<dyn JobStore>,
    mut rx: mpsc::UnboundedReceiver<ProgressUpdate>,
) {
    while let Some(update) = rx.recv().await {
        match store.update_progress(job_id, &update).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job_id = %job_id, "Dropped progress for job that is not running")
            }
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Failed to persist progress"),
        }
    }
}
