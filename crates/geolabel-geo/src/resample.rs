//! Bilinear resampling of single-band rasters.

use ndarray::{Array2, ArrayView2};

/// Source sample pair and interpolation factor for one destination index,
/// aligning pixel centres of source and destination.
fn axis_sample(dst: usize, scale: f64, src_len: usize) -> (usize, usize, f32) {
    let max = (src_len - 1) as f64;
    let pos = ((dst as f64 + 0.5) * scale - 0.5).clamp(0.0, max);
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(src_len - 1);
    (lo, hi, (pos - lo as f64) as f32)
}

/// Resize `src` to `rows x cols` with bilinear interpolation.
///
/// Edge samples are clamped, so a constant input resamples to the same
/// constant. An empty source or target yields an array of zeros.
pub fn resize_bilinear(src: ArrayView2<'_, f32>, rows: usize, cols: usize) -> Array2<f32> {
    let (src_rows, src_cols) = src.dim();
    if src_rows == 0 || src_cols == 0 || rows == 0 || cols == 0 {
        return Array2::zeros((rows, cols));
    }
    if (src_rows, src_cols) == (rows, cols) {
        return src.to_owned();
    }

    let scale_y = src_rows as f64 / rows as f64;
    let scale_x = src_cols as f64 / cols as f64;
    let ys: Vec<_> = (0..rows).map(|r| axis_sample(r, scale_y, src_rows)).collect();
    let xs: Vec<_> = (0..cols).map(|c| axis_sample(c, scale_x, src_cols)).collect();

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let (y0, y1, fy) = ys[r];
        let (x0, x1, fx) = xs[c];
        let top = src[[y0, x0]] * (1.0 - fx) + src[[y0, x1]] * fx;
        let bottom = src[[y1, x0]] * (1.0 - fx) + src[[y1, x1]] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}
