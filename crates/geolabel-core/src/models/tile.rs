use serde::{Deserialize, Serialize};

use super::bounds::GeoBounds;

/// Ordinal identifier of a tile within one grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u32);

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tile_{}", self.0)
    }
}

/// One rectangular sub-region of a requested area.
///
/// Tiles are immutable once generated and live only for the duration of
/// the job that generated them.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub id: TileId,
    pub bounds: GeoBounds,
    pub geometry: geo::Polygon<f64>,
    pub column: u32,
    pub row: u32,
}

impl Tile {
    pub fn new(id: TileId, bounds: GeoBounds, column: u32, row: u32) -> Self {
        Self {
            id,
            geometry: bounds.to_polygon(),
            bounds,
            column,
            row,
        }
    }
}
