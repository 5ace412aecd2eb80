//! Job records and the transition logic shared by the store adapters.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{
    Job, JobFilter, JobId, JobKind, JobPayload, JobResult, ProgressUpdate, ProjectId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JobTable {
    next_id: u64,
    jobs: BTreeMap<JobId, Job>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self { next_id: 1, jobs: BTreeMap::new() }
    }
}

impl JobTable {
    pub fn create(&mut self, payload: JobPayload) -> Result<Job> {
        if let Some(active) = self.find_active(payload.kind(), payload.project_id()) {
            return Err(GeolabelError::JobAlreadyActive {
                id: active.id,
                kind: active.kind,
                status: active.status,
            });
        }

        let id = JobId(self.next_id);
        self.next_id += 1;

        let job = Job::new(id, payload, Utc::now());
        self.jobs.insert(id, job.clone());
        Ok(job)
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn list(&self, filter: &JobFilter) -> Vec<Job> {
        // ids are assigned in creation order
        self.jobs.values().filter(|job| filter.matches(job)).cloned().collect()
    }

    pub fn find_active(&self, kind: JobKind, project_id: ProjectId) -> Option<&Job> {
        self.jobs
            .values()
            .find(|job| job.kind == kind && job.project_id == project_id && !job.is_terminal())
    }

    fn get_mut(&mut self, id: JobId) -> Result<&mut Job> {
        self.jobs.get_mut(&id).ok_or(GeolabelError::JobNotFound { id })
    }

    pub fn mark_running(&mut self, id: JobId) -> Result<Job> {
        let job = self.get_mut(id)?;
        job.start(Utc::now())?;
        Ok(job.clone())
    }

    pub fn update_progress(&mut self, id: JobId, update: &ProgressUpdate) -> Result<bool> {
        Ok(self.get_mut(id)?.record_progress(update))
    }

    pub fn complete(&mut self, id: JobId, result: JobResult) -> Result<Job> {
        let job = self.get_mut(id)?;
        job.complete(result, Utc::now())?;
        Ok(job.clone())
    }

    pub fn fail(&mut self, id: JobId, message: &str) -> Result<Job> {
        let job = self.get_mut(id)?;
        job.fail(message, Utc::now())?;
        Ok(job.clone())
    }

    pub fn cancel_pending(&mut self, id: JobId) -> Result<Job> {
        let job = self.get_mut(id)?;
        job.cancel(Utc::now())?;
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolabel_core::models::JobStatus;

    fn training(project: u64) -> JobPayload {
        JobPayload::Training { project_id: ProjectId(project) }
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut table = JobTable::default();
        let a = table.create(training(1)).unwrap();
        let b = table.create(training(2)).unwrap();
        assert_eq!(a.id, JobId(1));
        assert_eq!(b.id, JobId(2));
    }

    #[test]
    fn test_second_active_job_rejected() {
        let mut table = JobTable::default();
        let first = table.create(training(1)).unwrap();

        let err = table.create(training(1)).unwrap_err();
        assert!(matches!(err, GeolabelError::JobAlreadyActive { id, .. } if id == first.id));

        table.mark_running(first.id).unwrap();
        table.fail(first.id, "boom").unwrap();
        assert!(table.create(training(1)).is_ok());
    }

    #[test]
    fn test_unknown_job() {
        let mut table = JobTable::default();
        assert!(matches!(
            table.mark_running(JobId(42)),
            Err(GeolabelError::JobNotFound { id: JobId(42) })
        ));
    }

    #[test]
    fn test_list_is_filtered_and_ordered() {
        let mut table = JobTable::default();
        let a = table.create(training(1)).unwrap();
        table.create(training(2)).unwrap();
        let c = table.create(training(3)).unwrap();
        table.cancel_pending(c.id).unwrap();

        let pending = table.list(&JobFilter::default().status(JobStatus::Pending));
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, a.id);

        let project = table.list(&JobFilter::default().project(ProjectId(3)));
        assert_eq!(project.len(), 1);
        assert_eq!(project[0].status, JobStatus::Cancelled);
    }
}
