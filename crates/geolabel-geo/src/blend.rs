//! Weighted merging of per-tile predictions into one region raster.
//!
//! Every tile is resampled to its pixel footprint on the output grid and
//! added with its [weight field](crate::weights). The output value of a
//! pixel is the weighted mean of all contributions; pixels no tile reached
//! are 0.

use std::collections::HashMap;

use ndarray::{s, Array2, Zip};
use serde::{Deserialize, Serialize};

use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{
    Crs, GeoBounds, GeoTransform, OutputRaster, Tile, TileId, TilePrediction,
};

use crate::resample::resize_bilinear;
use crate::units::PixelGrid;
use crate::weights::BlendWeightCache;

/// Accumulated weight at or below which a pixel counts as uncovered.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Pixel footprint of a tile on the output grid.
///
/// The rectangle is not clipped: tiles on the region border start at
/// negative offsets or extend past the last row/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub col: i64,
    pub row: i64,
    pub cols: usize,
    pub rows: usize,
}

impl PixelRect {
    fn clip(&self, width: usize, height: usize) -> Option<ClippedRect> {
        let col_start = self.col.max(0);
        let row_start = self.row.max(0);
        let col_end = (self.col + self.cols as i64).min(width as i64);
        let row_end = (self.row + self.rows as i64).min(height as i64);
        if col_start >= col_end || row_start >= row_end {
            return None;
        }
        Some(ClippedRect {
            dst_cols: col_start as usize..col_end as usize,
            dst_rows: row_start as usize..row_end as usize,
            src_col: (col_start - self.col) as usize,
            src_row: (row_start - self.row) as usize,
        })
    }
}

struct ClippedRect {
    dst_cols: std::ops::Range<usize>,
    dst_rows: std::ops::Range<usize>,
    src_col: usize,
    src_row: usize,
}

/// Summary of a finished blend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendStats {
    pub tiles_blended: usize,
    pub uncovered_pixels: usize,
    pub uncovered_fraction: f64,
}

/// Streaming accumulator for tile predictions over a region.
///
/// Tiles can be added in any order; the result only depends on the set of
/// contributions.
#[derive(Debug)]
pub struct TileBlender {
    grid: PixelGrid,
    prob_sum: Array2<f64>,
    weight_sum: Array2<f64>,
    weights: BlendWeightCache,
    contributed: usize,
}

impl TileBlender {
    pub fn new(bounds: GeoBounds, resolution_m: f64) -> Result<Self> {
        let grid = PixelGrid::new(bounds, resolution_m)?;
        let shape = (grid.height, grid.width);
        tracing::debug!(width = grid.width, height = grid.height, "Allocating blend buffers");

        Ok(Self {
            grid,
            prob_sum: Array2::zeros(shape),
            weight_sum: Array2::zeros(shape),
            weights: BlendWeightCache::new(),
            contributed: 0,
        })
    }

    /// Output dimensions as `(width, height)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.grid.width, self.grid.height)
    }

    pub fn tiles_blended(&self) -> usize {
        self.contributed
    }

    /// Footprint of `tile` on the output grid.
    pub fn tile_rect(&self, tile: &Tile) -> PixelRect {
        let (left, top) = self.grid.degrees_to_pixels(tile.bounds.west(), tile.bounds.north());
        let (right, bottom) = self.grid.degrees_to_pixels(tile.bounds.east(), tile.bounds.south());

        let col = left.floor() as i64;
        let row = top.floor() as i64;
        let cols = (right.ceil() as i64 - col).max(1) as usize;
        let rows = (bottom.ceil() as i64 - row).max(1) as usize;
        PixelRect { col, row, cols, rows }
    }

    /// Add one tile's prediction.
    ///
    /// Returns `false` when the tile does not touch the output grid or the
    /// prediction is empty; nothing is accumulated in that case.
    pub fn add(&mut self, tile: &Tile, prediction: &TilePrediction) -> Result<bool> {
        if prediction.probabilities.is_empty() {
            tracing::warn!(tile = %tile.id, "Skipping empty prediction");
            return Ok(false);
        }

        let rect = self.tile_rect(tile);
        let Some(clip) = rect.clip(self.grid.width, self.grid.height) else {
            tracing::debug!(tile = %tile.id, "Tile lies outside output grid");
            return Ok(false);
        };

        let sanitized = prediction
            .probabilities
            .mapv(|p| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) });
        let resampled = resize_bilinear(sanitized.view(), rect.rows, rect.cols);
        let weights = self.weights.get(rect.rows, rect.cols);

        let (rows, cols) = (clip.dst_rows.len(), clip.dst_cols.len());
        let (src_rows, src_cols) = (clip.src_row..clip.src_row + rows, clip.src_col..clip.src_col + cols);
        let (dst_rows, dst_cols) = (clip.dst_rows, clip.dst_cols);

        Zip::from(self.prob_sum.slice_mut(s![dst_rows.clone(), dst_cols.clone()]))
            .and(self.weight_sum.slice_mut(s![dst_rows, dst_cols]))
            .and(resampled.slice(s![src_rows.clone(), src_cols.clone()]))
            .and(weights.slice(s![src_rows, src_cols]))
            .for_each(|prob_sum, weight_sum, &p, &w| {
                *prob_sum += f64::from(p) * f64::from(w);
                *weight_sum += f64::from(w);
            });

        self.contributed += 1;
        Ok(true)
    }

    /// Normalize the accumulated contributions into the output raster.
    pub fn finish(self) -> Result<(OutputRaster, BlendStats)> {
        if self.contributed == 0 {
            return Err(GeolabelError::NoPredictions);
        }

        let probabilities = Zip::from(&self.prob_sum)
            .and(&self.weight_sum)
            .map_collect(|&p, &w| {
                if w > WEIGHT_EPSILON {
                    ((p / w) as f32).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            });

        let uncovered_pixels = self.weight_sum.iter().filter(|&&w| w <= WEIGHT_EPSILON).count();
        let stats = BlendStats {
            tiles_blended: self.contributed,
            uncovered_pixels,
            uncovered_fraction: uncovered_pixels as f64 / self.grid.pixel_count() as f64,
        };

        if uncovered_pixels > 0 {
            tracing::warn!(
                uncovered_pixels,
                fraction = stats.uncovered_fraction,
                "Blended raster has pixels without any tile coverage"
            );
        }

        let bounds = self.grid.bounds;
        let raster = OutputRaster {
            transform: GeoTransform::from_bounds(&bounds, self.grid.width, self.grid.height),
            bounds,
            probabilities,
            crs: Crs::wgs84(),
        };
        Ok((raster, stats))
    }
}

/// Blend every tile that has a prediction into one raster over `bounds`.
///
/// Tiles without a prediction (failed fetch or inference) are skipped.
pub fn blend_tiles(
    tiles: &[Tile],
    predictions: &HashMap<TileId, TilePrediction>,
    bounds: GeoBounds,
    resolution_m: f64,
) -> Result<(OutputRaster, BlendStats)> {
    let mut blender = TileBlender::new(bounds, resolution_m)?;
    for tile in tiles {
        if let Some(prediction) = predictions.get(&tile.id) {
            blender.add(tile, prediction)?;
        }
    }
    blender.finish()
}
