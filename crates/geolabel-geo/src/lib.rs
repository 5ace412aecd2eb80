//! Tiling and blending geometry for region-wide inference.
//!
//! [`grid`] splits a bounding box into overlapping fixed-size tiles,
//! [`weights`] provides the per-pixel confidence field of a tile, and
//! [`blend`] merges per-tile predictions back into one raster.

pub mod blend;
pub mod grid;
pub mod resample;
pub mod units;
pub mod weights;

pub use blend::{blend_tiles, BlendStats, PixelRect, TileBlender, WEIGHT_EPSILON};
pub use grid::{GridSpec, TileGrid};
pub use resample::resize_bilinear;
pub use units::{meters_to_degrees, output_dimensions, AngularSize, PixelGrid};
pub use weights::{blend_weights, blend_weights_for, BlendWeightCache};
