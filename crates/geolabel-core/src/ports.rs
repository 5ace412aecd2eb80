//! Port trait definitions
//!
//! These traits define the external collaborators the pipelines call into.
//! Implementations are constructed once at start-up and injected.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    JobId, OutputRaster, ProgressUpdate, ProjectId, TileId, TilePrediction, TileRaster,
};

/// Acquisition window for imagery composites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Everything an imagery provider needs to produce one tile raster
#[derive(Debug, Clone)]
pub struct ImageryRequest {
    pub tile_id: TileId,
    pub geometry: geo::Polygon<f64>,
    pub date_range: DateRange,
    pub bands: Vec<String>,
    pub cloud_cover_max: u8,
    pub scale_m: f64,
}

/// Port for satellite imagery retrieval
#[async_trait]
pub trait ImageryProvider: Send + Sync {
    /// Fetch a multi-band raster covering the request geometry
    async fn fetch(&self, request: &ImageryRequest) -> Result<TileRaster>;
}

/// A loaded segmentation model. Stateless per call.
#[async_trait]
pub trait SegmentationModel: Send + Sync {
    /// Produce a single-band probability array for one tile
    async fn predict(&self, raster: &TileRaster) -> Result<TilePrediction>;
}

/// Port for loading a trained model from a checkpoint
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, checkpoint: &Path) -> Result<Arc<dyn SegmentationModel>>;
}

/// Port for the model training loop
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Train a model for a project and return the checkpoint path
    async fn train(
        &self,
        project_id: ProjectId,
        job_id: JobId,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf>;
}

/// Port for persisting a blended raster
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Single-band float32 georeferenced raster of the probabilities
    async fn write_probability_raster(&self, raster: Arc<OutputRaster>, path: &Path) -> Result<()>;

    /// RGBA preview image with the same extent as the raster
    async fn write_overlay(&self, raster: Arc<OutputRaster>, path: &Path) -> Result<()>;
}

/// Destination for job progress reports
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate) -> Result<()>;

    /// Report without letting a sink failure interrupt the caller.
    fn report_lossy(&self, update: ProgressUpdate) {
        if let Err(e) = self.report(update) {
            tracing::warn!(error = %e, "Failed to report progress");
        }
    }
}

/// Sink that discards every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _update: ProgressUpdate) -> Result<()> {
        Ok(())
    }
}
