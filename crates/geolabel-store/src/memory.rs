//! In-memory job store for tests and single-process use.
//!
//! Uses `RwLock::unwrap()` intentionally. Lock poisoning only occurs when
//! another thread panicked while holding the lock, which is an
//! unrecoverable state.

use async_trait::async_trait;
use geolabel_core::error::Result;
use geolabel_core::models::{
    Job, JobFilter, JobId, JobKind, JobPayload, JobResult, ProgressUpdate, ProjectId,
};
use std::sync::{Arc, RwLock};

use crate::ports::JobStore;
use crate::table::JobTable;

/// In-memory implementation of JobStore
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    table: Arc<RwLock<JobTable>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, payload: JobPayload) -> Result<Job> {
        self.table.write().unwrap().create(payload)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.table.read().unwrap().get(id).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        Ok(self.table.read().unwrap().list(filter))
    }

    async fn find_active(&self, kind: JobKind, project_id: ProjectId) -> Result<Option<Job>> {
        Ok(self.table.read().unwrap().find_active(kind, project_id).cloned())
    }

    async fn mark_running(&self, id: JobId) -> Result<Job> {
        self.table.write().unwrap().mark_running(id)
    }

    async fn update_progress(&self, id: JobId, update: &ProgressUpdate) -> Result<bool> {
        self.table.write().unwrap().update_progress(id, update)
    }

    async fn complete(&self, id: JobId, result: JobResult) -> Result<Job> {
        self.table.write().unwrap().complete(id, result)
    }

    async fn fail(&self, id: JobId, message: &str) -> Result<Job> {
        self.table.write().unwrap().fail(id, message)
    }

    async fn cancel_pending(&self, id: JobId) -> Result<Job> {
        self.table.write().unwrap().cancel_pending(id)
    }
}
