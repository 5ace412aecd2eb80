pub mod bounds;
pub mod job;
pub mod raster;
pub mod tile;

pub use bounds::GeoBounds;
pub use job::{
    InferenceArtifacts, Job, JobFilter, JobId, JobKind, JobPayload, JobResult, JobStatus,
    ProgressUpdate, ProjectId,
};
pub use raster::{Crs, GeoTransform, OutputRaster, TilePrediction, TileRaster};
pub use tile::{Tile, TileId};
