//! Region inference: tile the bounds, fetch and predict each tile, blend the
//! predictions and write the artifacts.
//!
//! Fetched tiles are written to `<output>/tiles/<id>.tif` and read back one
//! at a time for prediction, so only a single tile raster is held in memory.
//! A tile file left by an earlier attempt of the same job is reused instead
//! of downloaded again.
//!
//! Failures of individual tiles are logged and the tile is dropped. The run
//! fails only when no usable tiles remain, or when the grid, the model, the
//! blend or the artifact writes fail.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use geolabel_core::config::LayeredConfig;
use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{
    GeoBounds, InferenceArtifacts, JobId, ProgressUpdate, ProjectId, Tile, TileId,
    TilePrediction, TileRaster,
};
use geolabel_core::ports::{
    ArtifactWriter, DateRange, ImageryProvider, ImageryRequest, ModelLoader, ProgressSink,
    SegmentationModel,
};
use geolabel_geo::{blend_tiles, GridSpec, TileGrid};

use crate::artifacts::{blocking, read_tile_raster, write_tile_raster};
use crate::stage::{PipelineStage, StageTracker};

pub const PROBABILITY_FILE: &str = "probability.tif";
pub const OVERLAY_FILE: &str = "overlay.png";
pub const TILES_DIR: &str = "tiles";

// Progress bands: fetching fills 0-50%, prediction 50-90%
const FETCH_SPAN: f32 = 50.0;
const PREDICT_START: f32 = 50.0;
const PREDICT_SPAN: f32 = 40.0;
const BLEND_PERCENT: f32 = 90.0;
const WRITE_PERCENT: f32 = 95.0;

/// Inference settings derived from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub grid: GridSpec,
    pub date_range: DateRange,
    pub bands: Vec<String>,
    pub cloud_cover_max: u8,
    /// Fraction of tiles that must produce a prediction. 0 means any one
    /// successful tile is enough.
    pub min_success_ratio: f64,
    /// Artifacts go to `<output_root>/<project>/<job>/`
    pub output_root: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &LayeredConfig) -> Self {
        Self {
            grid: GridSpec {
                tile_size_px: config.tile_size.value,
                resolution_m: config.resolution_m.value,
                overlap: config.overlap.value,
            },
            date_range: config.date_range(),
            bands: config.bands.value.clone(),
            cloud_cover_max: config.cloud_cover_max.value,
            min_success_ratio: config.min_success_ratio.value,
            output_root: config.data_dir.value.join("inference"),
        }
    }

    pub fn output_dir(&self, project_id: ProjectId, job_id: JobId) -> PathBuf {
        self.output_root.join(project_id.to_string()).join(job_id.to_string())
    }

    /// Where the downloaded raster of `tile_id` is kept for a job
    pub fn tile_path(&self, project_id: ProjectId, job_id: JobId, tile_id: TileId) -> PathBuf {
        self.output_dir(project_id, job_id)
            .join(TILES_DIR)
            .join(format!("{}.tif", tile_id.0))
    }
}

/// One inference run
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub job_id: JobId,
    pub project_id: ProjectId,
    pub bounds: GeoBounds,
    pub checkpoint: PathBuf,
}

fn percent(base: f32, span: f32, done: usize, total: usize) -> f32 {
    base + done as f32 / total.max(1) as f32 * span
}

/// Orchestrates one inference job over injected collaborators
pub struct InferencePipeline {
    imagery: Arc<dyn ImageryProvider>,
    models: Arc<dyn ModelLoader>,
    writer: Arc<dyn ArtifactWriter>,
    settings: PipelineSettings,
}

impl InferencePipeline {
    pub fn new(
        imagery: Arc<dyn ImageryProvider>,
        models: Arc<dyn ModelLoader>,
        writer: Arc<dyn ArtifactWriter>,
        settings: PipelineSettings,
    ) -> Self {
        Self { imagery, models, writer, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run every stage for `request`, reporting progress to `progress`.
    pub async fn run(
        &self,
        request: &InferenceRequest,
        progress: &dyn ProgressSink,
    ) -> Result<InferenceArtifacts> {
        let mut stages = StageTracker::new(request.job_id);
        match self.run_stages(request, &mut stages, progress).await {
            Ok(artifacts) => Ok(artifacts),
            Err(e) => {
                tracing::warn!(job_id = %request.job_id, stage = %stages.stage(), error = %e, "Inference failed");
                if !stages.stage().is_terminal() {
                    let _ = stages.advance(PipelineStage::Failed);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &InferenceRequest,
        stages: &mut StageTracker,
        progress: &dyn ProgressSink,
    ) -> Result<InferenceArtifacts> {
        let report = |stage: PipelineStage, percent: f32, message: String| {
            progress.report_lossy(ProgressUpdate::new(percent, message).with_stage(stage.as_str()));
        };
        let job_id = request.job_id;

        let stage = stages.advance(PipelineStage::GeneratingGrid)?;
        let grid = TileGrid::generate(request.bounds, self.settings.grid)?;
        let total = grid.len();
        tracing::info!(job_id = %job_id, tiles = total, bounds = %request.bounds, "Generated tile grid");
        report(stage, 0.0, format!("Generated {} tiles", total));

        let stage = stages.advance(PipelineStage::Fetching)?;
        let mut fetched = Vec::with_capacity(total);
        for (i, tile) in grid.tiles().iter().enumerate() {
            report(stage, percent(0.0, FETCH_SPAN, i, total), format!("Downloading tile {}/{}", i + 1, total));
            let path = self.settings.tile_path(request.project_id, job_id, tile.id);
            match self.fetch_tile(tile, &path).await {
                Ok(()) => fetched.push((tile, path)),
                Err(e) => tracing::warn!(job_id = %job_id, tile = %tile.id, error = %e, "Skipping tile, imagery fetch failed"),
            }
        }
        if fetched.is_empty() {
            return Err(GeolabelError::NoTilesFetched { total });
        }

        let stage = stages.advance(PipelineStage::Predicting)?;
        report(stage, PREDICT_START, "Loading model...".to_string());
        let model = self.models.load(&request.checkpoint).await?;

        let count = fetched.len();
        let mut predictions: HashMap<TileId, TilePrediction> = HashMap::with_capacity(count);
        for (i, (tile, path)) in fetched.iter().enumerate() {
            report(
                stage,
                percent(PREDICT_START, PREDICT_SPAN, i, count),
                format!("Running inference on tile {}/{}", i + 1, count),
            );
            match self.predict(tile, path, model.as_ref()).await {
                Ok(prediction) => {
                    predictions.insert(tile.id, prediction);
                }
                Err(e) => tracing::warn!(job_id = %job_id, tile = %tile.id, error = %e, "Skipping tile, prediction failed"),
            }
        }
        drop(fetched);
        let succeeded = predictions.len();
        self.check_coverage(succeeded, total)?;

        let stage = stages.advance(PipelineStage::Blending)?;
        report(stage, BLEND_PERCENT, "Blending tiles...".to_string());
        let tiles = grid.into_tiles();
        let bounds = request.bounds;
        let resolution_m = self.settings.grid.resolution_m;
        let (raster, stats) =
            blocking(move || blend_tiles(&tiles, &predictions, bounds, resolution_m)).await?;
        tracing::info!(
            job_id = %job_id,
            width = raster.width(),
            height = raster.height(),
            tiles = stats.tiles_blended,
            uncovered = stats.uncovered_fraction,
            "Blended tile predictions"
        );

        let stage = stages.advance(PipelineStage::WritingOutputs)?;
        report(stage, WRITE_PERCENT, "Saving outputs...".to_string());
        let dir = self.settings.output_dir(request.project_id, job_id);
        tokio::fs::create_dir_all(&dir).await?;
        let probability_raster = dir.join(PROBABILITY_FILE);
        let overlay = dir.join(OVERLAY_FILE);
        let (width, height) = (raster.width(), raster.height());
        let raster = Arc::new(raster);
        self.writer.write_probability_raster(raster.clone(), &probability_raster).await?;
        self.writer.write_overlay(raster, &overlay).await?;

        let stage = stages.advance(PipelineStage::Completed)?;
        report(stage, 100.0, "Inference complete".to_string());

        Ok(InferenceArtifacts {
            probability_raster,
            overlay,
            bounds: request.bounds,
            tile_count: total,
            tiles_failed: total - succeeded,
            width,
            height,
        })
    }

    fn imagery_request(&self, tile: &Tile) -> ImageryRequest {
        ImageryRequest {
            tile_id: tile.id,
            geometry: tile.geometry.clone(),
            date_range: self.settings.date_range,
            bands: self.settings.bands.clone(),
            cloud_cover_max: self.settings.cloud_cover_max,
            scale_m: self.settings.grid.resolution_m,
        }
    }

    /// Make sure the raster of `tile` is on disk at `path`.
    async fn fetch_tile(&self, tile: &Tile, path: &Path) -> Result<()> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!(tile = %tile.id, path = %path.display(), "Reusing downloaded tile");
            return Ok(());
        }
        let raster = self.imagery.fetch(&self.imagery_request(tile)).await?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        // Write under a temporary name so an interrupted write is never reused
        let partial = path.with_extension("tif.partial");
        let target = path.to_path_buf();
        blocking(move || {
            write_tile_raster(&raster, &partial)?;
            std::fs::rename(&partial, &target)?;
            Ok(())
        })
        .await
    }

    async fn predict(
        &self,
        tile: &Tile,
        path: &Path,
        model: &dyn SegmentationModel,
    ) -> Result<TilePrediction> {
        let tile_id = tile.id;
        let source = path.to_path_buf();
        let raster: TileRaster = blocking(move || read_tile_raster(tile_id, &source)).await?;
        let mut prediction = model.predict(&raster).await?;
        if prediction.probabilities.is_empty() {
            return Err(GeolabelError::Prediction {
                tile: tile.id.to_string(),
                reason: "model returned an empty array".to_string(),
            });
        }
        prediction.tile_id = tile.id;
        Ok(prediction)
    }

    fn check_coverage(&self, succeeded: usize, total: usize) -> Result<()> {
        if succeeded == 0 {
            return Err(GeolabelError::NoPredictions);
        }
        let required = self.settings.min_success_ratio;
        if (succeeded as f64 / total as f64) < required {
            return Err(GeolabelError::InsufficientCoverage { succeeded, total, required });
        }
        Ok(())
    }
}
