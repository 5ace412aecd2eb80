//! GeoLabel Pipeline - Region inference and training jobs
//!
//! The [`InferencePipeline`] turns a bounding box and a trained checkpoint
//! into a probability raster and an overlay image. [`PipelineExecutor`]
//! plugs both pipelines into the job workers.

pub mod artifacts;
pub mod executor;
pub mod inference;
pub mod stage;
pub mod training;

pub use artifacts::{colormap, GeoTiffPngWriter};
pub use executor::PipelineExecutor;
pub use inference::{InferencePipeline, InferenceRequest, PipelineSettings};
pub use stage::{PipelineStage, StageTracker};
pub use training::TrainingPipeline;
