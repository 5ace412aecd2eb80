//! Decomposition of a bounding box into a regular grid of overlapping tiles.

use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{GeoBounds, Tile, TileId};

use crate::units::{meters_to_degrees, warn_if_polar, AngularSize};

/// Tile grid parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub tile_size_px: u32,
    pub resolution_m: f64,
    pub overlap: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            tile_size_px: 256,
            resolution_m: 10.0,
            overlap: 0.5,
        }
    }
}

impl GridSpec {
    pub fn new(tile_size_px: u32, resolution_m: f64, overlap: f64) -> Result<Self> {
        let spec = Self { tile_size_px, resolution_m, overlap };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_size_px == 0 {
            return Err(GeolabelError::InvalidGrid {
                key: "tile_size_px",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.resolution_m.is_finite() && self.resolution_m > 0.0) {
            return Err(GeolabelError::InvalidGrid {
                key: "resolution_m",
                reason: format!("must be positive, got {}", self.resolution_m),
            });
        }
        if !(0.0..1.0).contains(&self.overlap) {
            return Err(GeolabelError::InvalidGrid {
                key: "overlap",
                reason: format!("must be in [0, 1), got {}", self.overlap),
            });
        }
        Ok(())
    }

    /// Ground footprint of one tile edge in meters
    pub fn tile_ground_size_m(&self) -> f64 {
        self.tile_size_px as f64 * self.resolution_m
    }

    /// Angular tile size at the bounds' mid-latitude
    pub fn tile_extent(&self, bounds: &GeoBounds) -> Result<AngularSize> {
        meters_to_degrees(self.tile_ground_size_m(), bounds.mid_latitude())
    }

    /// Angular step between neighbouring tile origins
    pub fn stride(&self, bounds: &GeoBounds) -> Result<AngularSize> {
        let tile = self.tile_extent(bounds)?;
        let keep = 1.0 - self.overlap;
        Ok(AngularSize {
            width_deg: tile.width_deg * keep,
            height_deg: tile.height_deg * keep,
        })
    }

    /// `(columns, rows)` of the grid over `bounds`, without materializing it.
    pub fn layout(&self, bounds: &GeoBounds) -> Result<(u32, u32)> {
        self.validate()?;
        let stride = self.stride(bounds)?;
        let columns = steps(bounds.west(), bounds.east(), stride.width_deg)?;
        let rows = steps(bounds.south(), bounds.north(), stride.height_deg)?;
        Ok((columns, rows))
    }

    /// Number of tiles the grid over `bounds` will contain, without
    /// materializing them.
    pub fn tile_count(&self, bounds: &GeoBounds) -> Result<usize> {
        let (columns, rows) = self.layout(bounds)?;
        cell_count(columns, rows)
    }
}

/// `columns * rows`, bounded by the range of [`TileId`].
fn cell_count(columns: u32, rows: u32) -> Result<usize> {
    let count = u64::from(columns) * u64::from(rows);
    if count > u64::from(u32::MAX) {
        return Err(GeolabelError::TooManyTiles {
            count: usize::try_from(count).unwrap_or(usize::MAX),
            max: u32::MAX as usize,
        });
    }
    Ok(count as usize)
}

/// Number of origins `start + k * stride` (k >= 0) strictly below `end`.
/// Always at least one.
fn steps(start: f64, end: f64, stride: f64) -> Result<u32> {
    let estimate = ((end - start) / stride).ceil().max(1.0);
    if !estimate.is_finite() || estimate >= u32::MAX as f64 {
        return Err(GeolabelError::InvalidGrid {
            key: "resolution_m",
            reason: format!(
                "stride of {stride:e} deg over a {:.6} deg span needs more than {} steps",
                end - start,
                u32::MAX
            ),
        });
    }

    let mut n = estimate as u32;
    while start + n as f64 * stride < end {
        n = n.checked_add(1).ok_or_else(|| GeolabelError::InvalidGrid {
            key: "resolution_m",
            reason: "tile steps overflow".to_string(),
        })?;
    }
    while n > 1 && start + (n - 1) as f64 * stride >= end {
        n -= 1;
    }
    Ok(n)
}

/// Ordered, row-major set of tiles covering a bounding box.
///
/// The walk starts at the south-west corner. The last row and column may
/// overflow the bounds by less than one tile so the region is always fully
/// covered.
#[derive(Debug, Clone)]
pub struct TileGrid {
    bounds: GeoBounds,
    spec: GridSpec,
    tile_size: AngularSize,
    stride: AngularSize,
    columns: u32,
    rows: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    pub fn generate(bounds: GeoBounds, spec: GridSpec) -> Result<Self> {
        spec.validate()?;
        warn_if_polar(&bounds);

        let tile_size = spec.tile_extent(&bounds)?;
        let stride = spec.stride(&bounds)?;
        let columns = steps(bounds.west(), bounds.east(), stride.width_deg)?;
        let rows = steps(bounds.south(), bounds.north(), stride.height_deg)?;

        let mut tiles = Vec::with_capacity(cell_count(columns, rows)?);
        for row in 0..rows {
            let south = bounds.south() + row as f64 * stride.height_deg;
            let north = (south + tile_size.height_deg).min(90.0);
            for column in 0..columns {
                let west = bounds.west() + column as f64 * stride.width_deg;
                let east = (west + tile_size.width_deg).min(180.0);

                let id = TileId(tiles.len() as u32);
                let tile_bounds = GeoBounds::new(west, south, east, north)?;
                tiles.push(Tile::new(id, tile_bounds, column, row));
            }
        }

        tracing::debug!(
            tiles = tiles.len(),
            columns,
            rows,
            tile_width_deg = tile_size.width_deg,
            tile_height_deg = tile_size.height_deg,
            "Generated tile grid"
        );

        Ok(Self {
            bounds,
            spec,
            tile_size,
            stride,
            columns,
            rows,
            tiles,
        })
    }

    pub fn bounds(&self) -> &GeoBounds {
        &self.bounds
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn tile_size(&self) -> AngularSize {
        self.tile_size
    }

    pub fn stride(&self) -> AngularSize {
        self.stride
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn into_tiles(self) -> Vec<Tile> {
        self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equator_bounds() -> GeoBounds {
        GeoBounds::new(0.0, 0.0, 0.1, 0.1).unwrap()
    }

    #[test]
    fn test_reference_region_grid() {
        let grid = TileGrid::generate(equator_bounds(), GridSpec::default()).unwrap();

        // 0.1 deg ≈ 11.1 km, tiles 2.56 km with 1.28 km stride
        assert_eq!(grid.columns(), 9);
        assert_eq!(grid.rows(), 9);
        assert_eq!(grid.len(), 81);
        assert_eq!(GridSpec::default().tile_count(&equator_bounds()).unwrap(), 81);
        assert_eq!(GridSpec::default().layout(&equator_bounds()).unwrap(), (9, 9));
    }

    #[test]
    fn test_row_major_order_and_ids() {
        let grid = TileGrid::generate(equator_bounds(), GridSpec::default()).unwrap();
        let columns = grid.columns();

        for (i, tile) in grid.tiles().iter().enumerate() {
            assert_eq!(tile.id, TileId(i as u32));
            assert_eq!(tile.row, i as u32 / columns);
            assert_eq!(tile.column, i as u32 % columns);
        }
        assert_eq!(grid.tiles()[0].bounds.west(), 0.0);
        assert_eq!(grid.tiles()[0].bounds.south(), 0.0);
        assert_eq!(grid.get(TileId(10)).map(|t| t.id), Some(TileId(10)));
    }

    #[test]
    fn test_region_smaller_than_stride_gets_one_tile() {
        let bounds = GeoBounds::new(20.0, 10.0, 20.001, 10.001).unwrap();
        let grid = TileGrid::generate(bounds, GridSpec::default()).unwrap();

        assert_eq!(grid.len(), 1);
        assert!(grid.tiles()[0].bounds.contains(&bounds));
    }

    #[test]
    fn test_zero_overlap_tiles_abut() {
        let spec = GridSpec::new(256, 10.0, 0.0).unwrap();
        let grid = TileGrid::generate(equator_bounds(), spec).unwrap();

        let first = &grid.tiles()[0].bounds;
        let second = &grid.tiles()[1].bounds;
        assert!((first.east() - second.west()).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_specs_rejected() {
        assert!(GridSpec::new(0, 10.0, 0.5).is_err());
        assert!(GridSpec::new(256, 0.0, 0.5).is_err());
        assert!(GridSpec::new(256, f64::NAN, 0.5).is_err());
        assert!(GridSpec::new(256, 10.0, 1.0).is_err());
        assert!(GridSpec::new(256, 10.0, -0.1).is_err());
    }

    #[test]
    fn test_microscopic_resolution_is_an_error() {
        let spec = GridSpec::new(1, 1e-6, 0.5).unwrap();
        let globe = GeoBounds::new(-180.0, -80.0, 180.0, 80.0).unwrap();

        assert!(matches!(
            spec.tile_count(&globe),
            Err(GeolabelError::InvalidGrid { key: "resolution_m", .. })
        ));
        assert!(TileGrid::generate(globe, spec).is_err());
    }

    #[test]
    fn test_tile_count_beyond_id_range_is_an_error() {
        // ~1e5 columns by ~1e5 rows
        let spec = GridSpec::new(1, 0.5, 0.0).unwrap();
        let region = GeoBounds::new(0.0, 0.0, 0.5, 0.5).unwrap();

        assert!(matches!(
            spec.tile_count(&region),
            Err(GeolabelError::TooManyTiles { .. })
        ));
        assert!(matches!(
            cell_count(u32::MAX, 2),
            Err(GeolabelError::TooManyTiles { max, .. }) if max == u32::MAX as usize
        ));
        assert_eq!(cell_count(3, 4).unwrap(), 12);
    }

    #[test]
    fn test_tile_geometry_matches_bounds() {
        let grid = TileGrid::generate(equator_bounds(), GridSpec::default()).unwrap();
        let tile = &grid.tiles()[5];
        let xs: Vec<f64> = tile.geometry.exterior().coords().map(|c| c.x).collect();
        let ys: Vec<f64> = tile.geometry.exterior().coords().map(|c| c.y).collect();

        let min = |v: &[f64]| v.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = |v: &[f64]| v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(min(&xs), tile.bounds.west());
        assert_eq!(max(&xs), tile.bounds.east());
        assert_eq!(min(&ys), tile.bounds.south());
        assert_eq!(max(&ys), tile.bounds.north());
    }
}
