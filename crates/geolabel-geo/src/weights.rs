//! Per-pixel confidence weights used when merging overlapping tiles.
//!
//! The field is the separable product of a raised-cosine (sine) window
//! along each axis, sampled at pixel centres. It peaks at the tile centre,
//! falls smoothly towards every edge and never reaches zero, so summed and
//! normalized contributions show no seams.

use ndarray::{Array1, Array2};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// 1-D window of `len` samples: `sin(pi * (i + 0.5) / len)`.
///
/// Each sample is computed from its distance to the nearer end so the
/// window is exactly symmetric.
pub fn window_1d(len: usize) -> Array1<f32> {
    Array1::from_shape_fn(len, |i| {
        let from_edge = i.min(len - 1 - i) as f64;
        (PI * (from_edge + 0.5) / len as f64).sin() as f32
    })
}

/// Weight field for a `rows x cols` tile.
pub fn blend_weights_for(rows: usize, cols: usize) -> Array2<f32> {
    let wr = window_1d(rows);
    let wc = window_1d(cols);
    Array2::from_shape_fn((rows, cols), |(r, c)| wr[r] * wc[c])
}

/// Weight field for a square tile of edge `size`.
pub fn blend_weights(size: usize) -> Array2<f32> {
    blend_weights_for(size, size)
}

/// Memoizes weight fields by shape.
#[derive(Debug, Default)]
pub struct BlendWeightCache {
    fields: HashMap<(usize, usize), Arc<Array2<f32>>>,
}

impl BlendWeightCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, rows: usize, cols: usize) -> Arc<Array2<f32>> {
        self.fields
            .entry((rows, cols))
            .or_insert_with(|| Arc::new(blend_weights_for(rows, cols)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
