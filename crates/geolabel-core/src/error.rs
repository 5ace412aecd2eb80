//! Error types for GeoLabel

use std::path::PathBuf;
use thiserror::Error;

use crate::models::{JobId, JobKind, JobStatus};

#[derive(Debug, Error)]
pub enum GeolabelError {
    // Input errors
    #[error("Invalid bounds: {reason}")]
    InvalidBounds { reason: String },

    #[error("Invalid coordinate {name}={value}: must be finite")]
    InvalidCoordinate { name: &'static str, value: f64 },

    #[error("Invalid tile grid parameter {key}: {reason}")]
    InvalidGrid { key: &'static str, reason: String },

    #[error("Region needs {count} tiles, more than the configured maximum of {max}")]
    TooManyTiles { count: usize, max: usize },

    #[error("Model checkpoint not found at {path}. Train a model first")]
    CheckpointMissing { path: PathBuf },

    #[error("No completed training job for project {project}. Train a model first")]
    NoTrainedModel { project: u64 },

    // Per-tile errors, recovered by skipping the tile
    #[error("Imagery fetch failed for {tile}: {reason}")]
    ImageryFetch { tile: String, reason: String },

    #[error("Prediction failed for {tile}: {reason}")]
    Prediction { tile: String, reason: String },

    // Pipeline-fatal errors
    #[error("Failed to fetch imagery for any of {total} tiles")]
    NoTilesFetched { total: usize },

    #[error("No tile predictions to blend")]
    NoPredictions,

    #[error("Only {succeeded} of {total} tiles succeeded, below the required ratio {required}")]
    InsufficientCoverage {
        succeeded: usize,
        total: usize,
        required: f64,
    },

    #[error("Model could not be loaded from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Failed to write {artifact}: {reason}")]
    ArtifactWrite { artifact: String, reason: String },

    // Orchestration errors
    #[error("Job not found: {id}")]
    JobNotFound { id: JobId },

    #[error("A {kind} job is already {status} for this project (job {id})")]
    JobAlreadyActive {
        id: JobId,
        kind: JobKind,
        status: JobStatus,
    },

    #[error("Cannot cancel job {id}: it is already running. Wait for it to complete or fail")]
    CancellationUnavailable { id: JobId },

    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: String,
        to: String,
    },

    #[error("Job store error: {0}")]
    Store(String),

    #[error("Job queue for {kind} is closed")]
    QueueClosed { kind: JobKind },

    #[error("Job panicked: {0}")]
    Panicked(String),

    // Configuration errors
    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GeolabelError {
    /// Whether the error came from a single tile and can be recovered by dropping it.
    pub fn is_tile_local(&self) -> bool {
        matches!(self, GeolabelError::ImageryFetch { .. } | GeolabelError::Prediction { .. })
    }
}

impl From<serde_json::Error> for GeolabelError {
    fn from(err: serde_json::Error) -> Self {
        GeolabelError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeolabelError>;
