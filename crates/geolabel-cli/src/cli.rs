use clap::{Args, Parser, Subcommand};
use geolabel_core::config::CliConfigOverrides;
use geolabel_core::models::{GeoBounds, JobKind, JobStatus};
use std::path::PathBuf;

/// GeoLabel - Region-scale segmentation jobs over satellite imagery
#[derive(Parser, Debug)]
#[command(name = "geolabel")]
#[command(about = "Region-scale segmentation jobs over satellite imagery", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file
    #[arg(long, global = true, default_value = "geolabel.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings that take precedence over file and environment
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Data directory holding the job store and outputs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Tile edge in pixels
    #[arg(long, global = true)]
    pub tile_size: Option<u32>,

    /// Ground resolution in meters per pixel
    #[arg(long, global = true)]
    pub resolution: Option<f64>,

    /// Fraction of a tile shared with its neighbour, in [0, 1)
    #[arg(long, global = true)]
    pub overlap: Option<f64>,
}

impl From<OverrideArgs> for CliConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        CliConfigOverrides {
            data_dir: args.data_dir,
            tile_size: args.tile_size,
            resolution_m: args.resolution,
            overlap: args.overlap,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Preview the tile grid for a bounding box
    Grid(GridArgs),

    /// Inspect and manage background jobs
    #[command(subcommand)]
    Jobs(JobsCommand),

    /// Show the effective configuration and where each value came from
    Config,
}

#[derive(Parser, Debug)]
pub struct GridArgs {
    /// Bounding box as west,south,east,north in decimal degrees
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bbox: GeoBounds,

    /// Print the tiles as a GeoJSON FeatureCollection
    #[arg(long)]
    pub geojson: bool,

    /// Only print the summary
    #[arg(long)]
    pub summary: bool,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// List jobs, oldest first
    List(ListArgs),

    /// Show one job
    Show {
        id: u64,
    },

    /// Cancel a job that has not started yet
    Cancel {
        id: u64,
    },

    /// Follow a job's progress until it finishes
    Watch(WatchArgs),
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    #[arg(long, value_parser = parse_kind)]
    pub kind: Option<JobKind>,

    #[arg(long)]
    pub project: Option<u64>,

    #[arg(long, value_parser = parse_status)]
    pub status: Option<JobStatus>,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    pub id: u64,

    /// Polling interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,
}

pub fn parse_bbox(value: &str) -> Result<GeoBounds, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{}': {}", p.trim(), e)))
        .collect::<Result<Vec<_>, _>>()?;

    match parts[..] {
        [west, south, east, north] => {
            GeoBounds::new(west, south, east, north).map_err(|e| e.to_string())
        }
        _ => Err(format!("expected 4 comma-separated values, got {}", parts.len())),
    }
}

fn parse_kind(value: &str) -> Result<JobKind, String> {
    JobKind::ALL
        .into_iter()
        .find(|k| k.to_string() == value)
        .ok_or_else(|| format!("unknown job kind '{}' (training, inference)", value))
}

fn parse_status(value: &str) -> Result<JobStatus, String> {
    use JobStatus::*;
    [Pending, Running, Completed, Failed, Cancelled]
        .into_iter()
        .find(|s| s.to_string() == value)
        .ok_or_else(|| format!("unknown job status '{}'", value))
}
