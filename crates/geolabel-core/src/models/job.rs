//! Background job records and their lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::bounds::GeoBounds;
use crate::error::{GeolabelError, Result};

/// Job identifier, assigned by the job store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(JobId)
    }
}

/// Project a job belongs to; the scope of the single-active-job rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub u64);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of background work. Each kind has its own queue and worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Training,
    Inference,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Training, JobKind::Inference];
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Training => write!(f, "training"),
            JobKind::Inference => write!(f, "inference"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Kind-specific job input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Training {
        project_id: ProjectId,
    },
    Inference {
        project_id: ProjectId,
        bounds: GeoBounds,
        checkpoint: PathBuf,
    },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Training { .. } => JobKind::Training,
            JobPayload::Inference { .. } => JobKind::Inference,
        }
    }

    pub fn project_id(&self) -> ProjectId {
        match self {
            JobPayload::Training { project_id } | JobPayload::Inference { project_id, .. } => {
                *project_id
            }
        }
    }
}

/// Artifacts of a completed inference job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceArtifacts {
    pub probability_raster: PathBuf,
    pub overlay: PathBuf,
    pub bounds: GeoBounds,
    pub tile_count: usize,
    pub tiles_failed: usize,
    pub width: usize,
    pub height: usize,
}

/// Result reference stored on a completed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    Checkpoint { path: PathBuf },
    Inference(InferenceArtifacts),
}

impl JobResult {
    /// The primary artifact path callers are pointed to.
    pub fn primary_path(&self) -> &std::path::Path {
        match self {
            JobResult::Checkpoint { path } => path,
            JobResult::Inference(artifacts) => &artifacts.overlay,
        }
    }
}

/// One progress report from a running job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub percent: f32,
    pub message: String,
    pub stage: Option<String>,
}

impl ProgressUpdate {
    pub fn new(percent: f32, message: impl Into<String>) -> Self {
        Self {
            percent: percent.clamp(0.0, 100.0),
            message: message.into(),
            stage: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}

/// Persisted job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub project_id: ProjectId,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub stage: Option<String>,
    pub progress: f32,
    pub progress_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result: Option<JobResult>,
}

impl Job {
    /// Create a new pending job
    pub fn new(id: JobId, payload: JobPayload, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: payload.kind(),
            project_id: payload.project_id(),
            payload,
            status: JobStatus::Pending,
            stage: None,
            progress: 0.0,
            progress_message: Some("Queued".to_string()),
            created_at,
            started_at: None,
            completed_at: None,
            error_message: None,
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn invalid(&self, to: JobStatus) -> GeolabelError {
        GeolabelError::InvalidTransition {
            id: self.id,
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// pending -> running
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status != JobStatus::Pending {
            return Err(self.invalid(JobStatus::Running));
        }
        self.status = JobStatus::Running;
        self.started_at = Some(at);
        self.progress = 0.0;
        self.progress_message = Some("Starting...".to_string());
        Ok(())
    }

    /// Record progress on a running job. Returns `false` when the update was
    /// ignored because the job is not running.
    ///
    /// The stored percentage never decreases.
    pub fn record_progress(&mut self, update: &ProgressUpdate) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.progress = self.progress.max(update.percent);
        self.progress_message = Some(update.message.clone());
        if update.stage.is_some() {
            self.stage = update.stage.clone();
        }
        true
    }

    /// running -> completed
    pub fn complete(&mut self, result: JobResult, at: DateTime<Utc>) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(self.invalid(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.progress_message = Some("Complete".to_string());
        self.completed_at = Some(at);
        self.result = Some(result);
        Ok(())
    }

    /// pending|running -> failed
    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        if self.is_terminal() {
            return Err(self.invalid(JobStatus::Failed));
        }
        self.status = JobStatus::Failed;
        self.completed_at = Some(at);
        self.error_message = Some(message.into());
        Ok(())
    }

    /// pending -> cancelled. A running job cannot be cancelled.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<()> {
        match self.status {
            JobStatus::Pending => {
                self.status = JobStatus::Cancelled;
                self.completed_at = Some(at);
                self.progress_message = Some("Cancelled".to_string());
                Ok(())
            }
            JobStatus::Running => Err(GeolabelError::CancellationUnavailable { id: self.id }),
            _ => Err(self.invalid(JobStatus::Cancelled)),
        }
    }
}

/// Filter for listing jobs
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub kind: Option<JobKind>,
    pub project_id: Option<ProjectId>,
    pub status: Option<JobStatus>,
}

impl JobFilter {
    pub fn kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.kind.map_or(true, |k| job.kind == k)
            && self.project_id.map_or(true, |p| job.project_id == p)
            && self.status.map_or(true, |s| job.status == s)
    }
}
