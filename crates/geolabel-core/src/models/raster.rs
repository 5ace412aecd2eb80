//! In-memory raster types exchanged between the pipeline stages.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use super::bounds::GeoBounds;
use super::tile::TileId;

/// Coordinate Reference System identified by EPSG code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
    pub name: String,
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl Crs {
    pub fn new(epsg: u32, name: impl Into<String>) -> Self {
        Self { epsg, name: name.into() }
    }

    /// WGS 84 (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::new(4326, "WGS 84")
    }
}

/// Multi-band imagery for one tile, shaped `(bands, rows, cols)`.
#[derive(Debug, Clone)]
pub struct TileRaster {
    pub tile_id: TileId,
    pub bands: Vec<String>,
    pub data: Array3<f32>,
}

impl TileRaster {
    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }
}

/// Single-band probabilities in `[0, 1]` for one tile, shaped `(rows, cols)`.
#[derive(Debug, Clone)]
pub struct TilePrediction {
    pub tile_id: TileId,
    pub probabilities: Array2<f32>,
}

impl TilePrediction {
    pub fn new(tile_id: TileId, probabilities: Array2<f32>) -> Self {
        Self { tile_id, probabilities }
    }

    /// A prediction holding the same probability everywhere.
    pub fn uniform(tile_id: TileId, size: usize, value: f32) -> Self {
        Self::new(tile_id, Array2::from_elem((size, size), value))
    }
}

/// Affine mapping from pixel (col, row) to geographic (x, y).
///
/// `origin` is the north-west corner; `pixel_height` is negative because
/// raster rows run southwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Transform that stretches `width x height` pixels over `bounds`.
    pub fn from_bounds(bounds: &GeoBounds, width: usize, height: usize) -> Self {
        Self {
            origin_x: bounds.west(),
            origin_y: bounds.north(),
            pixel_width: bounds.width_deg() / width as f64,
            pixel_height: -bounds.height_deg() / height as f64,
        }
    }

    /// Geographic coordinate of the top-left corner of a pixel.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (self.origin_x + col * self.pixel_width, self.origin_y + row * self.pixel_height)
    }
}

/// The blended probability surface for a whole job region.
#[derive(Debug, Clone)]
pub struct OutputRaster {
    pub bounds: GeoBounds,
    pub probabilities: Array2<f32>,
    pub transform: GeoTransform,
    pub crs: Crs,
}

impl OutputRaster {
    pub fn width(&self) -> usize {
        self.probabilities.ncols()
    }

    pub fn height(&self) -> usize {
        self.probabilities.nrows()
    }
}
