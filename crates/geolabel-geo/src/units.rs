//! Degree/meter/pixel conversions on the WGS 84 sphere approximation.
//!
//! One degree of latitude is taken as 111 320 m everywhere and one degree
//! of longitude as `111 320 * cos(latitude)`. This is accurate enough at
//! the regional scales (tens of kilometres) the pipeline works at, but it
//! breaks down towards the poles: above roughly ±85° longitude spans
//! collapse and the tile grid stretches without bound. That is a known
//! limitation and is only reported with a warning.

use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::GeoBounds;

/// Meters spanned by one degree of latitude
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Latitude beyond which the longitude approximation is unreliable
pub const POLAR_LIMIT_DEG: f64 = 85.0;

fn finite(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GeolabelError::InvalidCoordinate { name, value })
    }
}

pub fn meters_per_degree_latitude() -> f64 {
    METERS_PER_DEGREE
}

pub fn meters_per_degree_longitude(latitude: f64) -> Result<f64> {
    let latitude = finite("latitude", latitude)?;
    Ok(METERS_PER_DEGREE * latitude.to_radians().cos())
}

/// Angular size of a ground distance at a reference latitude
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularSize {
    pub width_deg: f64,
    pub height_deg: f64,
}

/// Convert a square ground distance in meters to degrees at `latitude`.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> Result<AngularSize> {
    let meters = finite("meters", meters)?;
    let lng_scale = meters_per_degree_longitude(latitude)?;
    if lng_scale <= f64::EPSILON {
        return Err(GeolabelError::InvalidBounds {
            reason: format!("longitude scale vanishes at latitude {}", latitude),
        });
    }
    Ok(AngularSize {
        width_deg: meters / lng_scale,
        height_deg: meters / meters_per_degree_latitude(),
    })
}

/// Warn when the bounds sit where the longitude approximation degrades.
pub fn warn_if_polar(bounds: &GeoBounds) {
    let lat = bounds.mid_latitude();
    if lat.abs() > POLAR_LIMIT_DEG {
        tracing::warn!(
            latitude = lat,
            "Bounds are beyond ±{}°, degree/meter conversion is unreliable",
            POLAR_LIMIT_DEG
        );
    }
}

/// Output pixel grid of a bounding box at a ground resolution.
///
/// Dimensions are `ceil(extent_m / resolution)` along each axis with the
/// longitude extent measured at the box's mid-latitude. Row 0 is the
/// northern edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelGrid {
    pub bounds: GeoBounds,
    pub resolution_m: f64,
    pub width: usize,
    pub height: usize,
}

impl PixelGrid {
    pub fn new(bounds: GeoBounds, resolution_m: f64) -> Result<Self> {
        let resolution_m = finite("resolution_m", resolution_m)?;
        if resolution_m <= 0.0 {
            return Err(GeolabelError::InvalidGrid {
                key: "resolution_m",
                reason: format!("must be positive, got {}", resolution_m),
            });
        }

        let width_m = bounds.width_deg() * meters_per_degree_longitude(bounds.mid_latitude())?;
        let height_m = bounds.height_deg() * meters_per_degree_latitude();

        let width = ((width_m / resolution_m).ceil() as usize).max(1);
        let height = ((height_m / resolution_m).ceil() as usize).max(1);

        Ok(Self { bounds, resolution_m, width, height })
    }

    /// Fractional pixel position (col, row) of a geographic coordinate.
    ///
    /// Positions outside the bounds map outside `0..width` / `0..height`.
    pub fn degrees_to_pixels(&self, lon: f64, lat: f64) -> (f64, f64) {
        let col = (lon - self.bounds.west()) / self.bounds.width_deg() * self.width as f64;
        let row = (self.bounds.north() - lat) / self.bounds.height_deg() * self.height as f64;
        (col, row)
    }

    /// Geographic coordinate (lon, lat) of a fractional pixel position.
    pub fn pixels_to_degrees(&self, col: f64, row: f64) -> (f64, f64) {
        let lon = self.bounds.west() + col / self.width as f64 * self.bounds.width_deg();
        let lat = self.bounds.north() - row / self.height as f64 * self.bounds.height_deg();
        (lon, lat)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Output raster `(width, height)` for `bounds` at `resolution_m`.
pub fn output_dimensions(bounds: GeoBounds, resolution_m: f64) -> Result<(usize, usize)> {
    let grid = PixelGrid::new(bounds, resolution_m)?;
    Ok((grid.width, grid.height))
}
