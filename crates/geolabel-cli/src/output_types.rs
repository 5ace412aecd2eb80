use chrono::{DateTime, Utc};
use geolabel_core::models::{GeoBounds, Job, JobKind, JobResult, JobStatus, Tile};
use serde::Serialize;
use tabled::Tabled;

fn display_opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Output for grid command
#[derive(Debug, Serialize)]
pub struct GridOutput {
    pub bounds: GeoBounds,
    pub tile_size_px: u32,
    pub resolution_m: f64,
    pub overlap: f64,
    pub columns: u32,
    pub rows: u32,
    pub tile_count: usize,
    pub output_width: usize,
    pub output_height: usize,
    pub max_tiles: usize,
    pub within_limit: bool,
}

/// One tile row in the grid table
#[derive(Debug, Serialize, Tabled)]
pub struct TileRow {
    #[tabled(rename = "ID")]
    pub id: u32,
    #[tabled(rename = "Col")]
    pub column: u32,
    #[tabled(rename = "Row")]
    pub row: u32,
    #[tabled(rename = "West")]
    pub west: String,
    #[tabled(rename = "South")]
    pub south: String,
    #[tabled(rename = "East")]
    pub east: String,
    #[tabled(rename = "North")]
    pub north: String,
}

impl From<&Tile> for TileRow {
    fn from(tile: &Tile) -> Self {
        Self {
            id: tile.id.0,
            column: tile.column,
            row: tile.row,
            west: format!("{:.6}", tile.bounds.west()),
            south: format!("{:.6}", tile.bounds.south()),
            east: format!("{:.6}", tile.bounds.east()),
            north: format!("{:.6}", tile.bounds.north()),
        }
    }
}

/// One job row in the jobs table
#[derive(Debug, Serialize, Tabled)]
pub struct JobRow {
    #[tabled(rename = "ID")]
    pub id: u64,
    #[tabled(rename = "Kind")]
    pub kind: JobKind,
    #[tabled(rename = "Project")]
    pub project_id: u64,
    #[tabled(rename = "Status")]
    pub status: JobStatus,
    #[tabled(rename = "Progress")]
    pub progress: String,
    #[tabled(rename = "Message")]
    pub message: String,
    #[tabled(rename = "Created")]
    pub created_at: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.0,
            kind: job.kind,
            project_id: job.project_id.0,
            status: job.status,
            progress: format!("{:.0}%", job.progress),
            message: job
                .error_message
                .clone()
                .or_else(|| job.progress_message.clone())
                .unwrap_or_default(),
            created_at: job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Output for jobs cancel
#[derive(Debug, Serialize)]
pub struct CancelOutput {
    pub id: u64,
    pub status: JobStatus,
}

/// Human-readable summary of a job's timestamps
pub fn format_time(at: &Option<DateTime<Utc>>) -> String {
    display_opt(&at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()))
}

/// Short description of a job's result
pub fn describe_result(result: &JobResult) -> String {
    match result {
        JobResult::Checkpoint { path } => format!("checkpoint {}", path.display()),
        JobResult::Inference(artifacts) => format!(
            "{}x{} raster from {} tiles ({} failed)",
            artifacts.width, artifacts.height, artifacts.tile_count, artifacts.tiles_failed
        ),
    }
}

/// One row in the config table
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Source")]
    pub source: String,
}
