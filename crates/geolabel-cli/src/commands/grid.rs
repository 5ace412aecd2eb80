//! Grid command implementation

use crate::cli::GridArgs;
use crate::output::OutputWriter;
use crate::output_types::{GridOutput, TileRow};
use anyhow::{bail, Context, Result};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use geolabel_core::config::LayeredConfig;
use geolabel_geo::{output_dimensions, GridSpec, TileGrid};

pub fn execute(args: GridArgs, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let spec = GridSpec::new(
        config.tile_size.value,
        config.resolution_m.value,
        config.overlap.value,
    )?;
    let (columns, rows) = spec.layout(&args.bbox).context("Failed to lay out tile grid")?;
    let tile_count = (columns as usize).saturating_mul(rows as usize);
    let max_tiles = config.max_tiles.value;
    let within_limit = tile_count <= max_tiles;
    let (output_width, output_height) = output_dimensions(args.bbox, spec.resolution_m)?;

    // Tiles are only materialized for grids the service would accept.
    if args.geojson {
        if !within_limit {
            bail!(
                "{} tiles exceeds the limit of {}; use --summary to inspect the layout",
                tile_count,
                max_tiles
            );
        }
        let grid = TileGrid::generate(args.bbox, spec).context("Failed to generate tile grid")?;
        println!("{}", serde_json::to_string_pretty(&to_feature_collection(&grid))?);
        return Ok(());
    }

    let summary = GridOutput {
        bounds: args.bbox,
        tile_size_px: spec.tile_size_px,
        resolution_m: spec.resolution_m,
        overlap: spec.overlap,
        columns,
        rows,
        tile_count,
        output_width,
        output_height,
        max_tiles,
        within_limit,
    };

    if !output.is_json() {
        output.section("Tile Grid");
        output.kv("Bounds", summary.bounds);
        output.kv(
            "Tile",
            format!(
                "{} px at {} m ({} m)",
                spec.tile_size_px,
                spec.resolution_m,
                spec.tile_ground_size_m()
            ),
        );
        output.kv("Overlap", format!("{:.0}%", spec.overlap * 100.0));
        output.kv("Layout", format!("{} columns x {} rows", summary.columns, summary.rows));
        output.kv("Tiles", summary.tile_count);
        output.kv("Output", format!("{} x {} px", summary.output_width, summary.output_height));
    }
    if !within_limit {
        output.warning(format!(
            "{} tiles exceeds the limit of {}; inference would be rejected",
            tile_count, max_tiles
        ));
    }

    if args.summary {
        return if output.is_json() { output.result(summary) } else { Ok(()) };
    }
    if !within_limit {
        bail!("Refusing to list {} tiles; use --summary", tile_count);
    }

    output.section("Tiles");
    let grid = TileGrid::generate(args.bbox, spec).context("Failed to generate tile grid")?;
    let rows: Vec<TileRow> = grid.tiles().iter().map(TileRow::from).collect();
    output.table(rows)
}

fn to_feature_collection(grid: &TileGrid) -> FeatureCollection {
    let features = grid
        .tiles()
        .iter()
        .map(|tile| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), tile.id.0.into());
            properties.insert("column".to_string(), tile.column.into());
            properties.insert("row".to_string(), tile.row.into());
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&tile.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
