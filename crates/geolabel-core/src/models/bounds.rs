//! Geodetic bounding boxes.

use serde::{Deserialize, Serialize};

use crate::error::{GeolabelError, Result};

/// Axis-aligned bounding box in decimal degrees (EPSG:4326).
///
/// Construct through [`GeoBounds::new`], which enforces `west < east`,
/// `south < north` and finite coordinates inside the WGS 84 domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBounds", into = "RawBounds")]
pub struct GeoBounds {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

/// Unvalidated wire form of [`GeoBounds`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawBounds {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        for (name, value) in [("west", west), ("south", south), ("east", east), ("north", north)] {
            if !value.is_finite() {
                return Err(GeolabelError::InvalidCoordinate { name, value });
            }
        }

        if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
            return Err(GeolabelError::InvalidBounds {
                reason: format!("longitudes must lie in [-180, 180], got {} and {}", west, east),
            });
        }

        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return Err(GeolabelError::InvalidBounds {
                reason: format!("latitudes must lie in [-90, 90], got {} and {}", south, north),
            });
        }

        if west >= east {
            return Err(GeolabelError::InvalidBounds {
                reason: format!("west ({}) must be less than east ({})", west, east),
            });
        }

        if south >= north {
            return Err(GeolabelError::InvalidBounds {
                reason: format!("south ({}) must be less than north ({})", south, north),
            });
        }

        Ok(Self { west, south, east, north })
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    /// Angular width in degrees
    pub fn width_deg(&self) -> f64 {
        self.east - self.west
    }

    /// Angular height in degrees
    pub fn height_deg(&self) -> f64 {
        self.north - self.south
    }

    /// Latitude of the vertical midpoint, used as the reference latitude
    /// for longitude scaling.
    pub fn mid_latitude(&self) -> f64 {
        (self.south + self.north) / 2.0
    }

    /// Whether `other` lies entirely inside these bounds (inclusive).
    pub fn contains(&self, other: &GeoBounds) -> bool {
        other.west >= self.west
            && other.east <= self.east
            && other.south >= self.south
            && other.north <= self.north
    }

    /// Whether the two boxes share any area.
    pub fn intersects(&self, other: &GeoBounds) -> bool {
        self.west < other.east
            && other.west < self.east
            && self.south < other.north
            && other.south < self.north
    }

    /// Closed rectangular polygon matching these bounds.
    pub fn to_polygon(&self) -> geo::Polygon<f64> {
        geo::Rect::new(
            geo::coord! { x: self.west, y: self.south },
            geo::coord! { x: self.east, y: self.north },
        )
        .to_polygon()
    }
}

impl TryFrom<RawBounds> for GeoBounds {
    type Error = GeolabelError;

    fn try_from(raw: RawBounds) -> Result<Self> {
        GeoBounds::new(raw.west, raw.south, raw.east, raw.north)
    }
}

impl From<GeoBounds> for RawBounds {
    fn from(bounds: GeoBounds) -> Self {
        RawBounds {
            west: bounds.west,
            south: bounds.south,
            east: bounds.east,
            north: bounds.north,
        }
    }
}

impl std::fmt::Display for GeoBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.6}, {:.6}, {:.6}, {:.6}]", self.west, self.south, self.east, self.north)
    }
}
