//! GeoTIFF and PNG output for blended rasters, and the on-disk cache of
//! downloaded tile rasters.
//!
//! Encoding is CPU and disk bound, so every writer here runs on tokio's
//! blocking pool.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::{OutputRaster, TileId, TileRaster};
use geolabel_core::ports::ArtifactWriter;
use ndarray::Array3;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// Overlay transparency, 50%
pub const OVERLAY_ALPHA: u8 = 128;

// GeoTIFF tags
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;

// GeoKey ids and values
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Blue (0) to red (1) ramp with fixed alpha.
pub fn colormap(probability: f32) -> [u8; 4] {
    let p = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
    [(p * 255.0) as u8, 0, ((1.0 - p) * 255.0) as u8, OVERLAY_ALPHA]
}

/// Writes the probability raster as a float32 GeoTIFF and the overlay as PNG
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffPngWriter;

impl GeoTiffPngWriter {
    pub fn new() -> Self {
        Self
    }
}

fn artifact_error(path: &Path, reason: impl std::fmt::Display) -> GeolabelError {
    GeolabelError::ArtifactWrite {
        artifact: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn dimensions(raster: &OutputRaster, path: &Path) -> Result<(u32, u32)> {
    let width = u32::try_from(raster.width()).map_err(|e| artifact_error(path, e))?;
    let height = u32::try_from(raster.height()).map_err(|e| artifact_error(path, e))?;
    Ok((width, height))
}

fn write_geotiff(raster: &OutputRaster, path: &Path) -> Result<()> {
    let (width, height) = dimensions(raster, path)?;
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file).map_err(|e| artifact_error(path, e))?;
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(width, height)
        .map_err(|e| artifact_error(path, e))?;

    let t = &raster.transform;
    let pixel_scale = [t.pixel_width, -t.pixel_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    let epsg = u16::try_from(raster.crs.epsg).map_err(|e| artifact_error(path, e))?;
    let geo_keys = [
        1, 1, 0, 3, // version, revision, minor, key count
        GT_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        GEOGRAPHIC_TYPE, 0, 1, epsg,
    ];

    let dir = image.encoder();
    dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &pixel_scale[..])
        .map_err(|e| artifact_error(path, e))?;
    dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(|e| artifact_error(path, e))?;
    dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geo_keys[..])
        .map_err(|e| artifact_error(path, e))?;

    // rows are already north-up, row-major
    let data: Vec<f32> = raster.probabilities.iter().copied().collect();
    image.write_data(&data).map_err(|e| artifact_error(path, e))?;
    Ok(())
}

fn write_png(raster: &OutputRaster, path: &Path) -> Result<()> {
    let (width, height) = dimensions(raster, path)?;
    let pixels: Vec<u8> = raster.probabilities.iter().flat_map(|&p| colormap(p)).collect();
    let overlay = image::RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| artifact_error(path, "pixel buffer does not match dimensions"))?;
    overlay.save(path).map_err(|e| artifact_error(path, e))
}

#[async_trait]
impl ArtifactWriter for GeoTiffPngWriter {
    async fn write_probability_raster(&self, raster: Arc<OutputRaster>, path: &Path) -> Result<()> {
        let target = path.to_path_buf();
        blocking(move || write_geotiff(&raster, &target)).await?;
        tracing::debug!(path = %path.display(), "Wrote probability raster");
        Ok(())
    }

    async fn write_overlay(&self, raster: Arc<OutputRaster>, path: &Path) -> Result<()> {
        let target = path.to_path_buf();
        blocking(move || write_png(&raster, &target)).await?;
        tracing::debug!(path = %path.display(), "Wrote overlay");
        Ok(())
    }
}

/// Run CPU or disk bound work on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GeolabelError::Panicked(format!("blocking task failed: {}", e)))?
}

/// Persist a downloaded tile as a multi-page float32 TIFF, one page per
/// band with the band name in the page description.
pub fn write_tile_raster(raster: &TileRaster, path: &Path) -> Result<()> {
    let (count, height, width) = raster.data.dim();
    if count == 0 || count != raster.bands.len() {
        return Err(artifact_error(
            path,
            format!("{} bands named for {} data planes", raster.bands.len(), count),
        ));
    }
    let width = u32::try_from(width).map_err(|e| artifact_error(path, e))?;
    let height = u32::try_from(height).map_err(|e| artifact_error(path, e))?;

    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file).map_err(|e| artifact_error(path, e))?;
    for (plane, name) in raster.data.outer_iter().zip(&raster.bands) {
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(width, height)
            .map_err(|e| artifact_error(path, e))?;
        image
            .encoder()
            .write_tag(Tag::ImageDescription, name.as_str())
            .map_err(|e| artifact_error(path, e))?;
        let data: Vec<f32> = plane.iter().copied().collect();
        image.write_data(&data).map_err(|e| artifact_error(path, e))?;
    }
    Ok(())
}

/// Load a tile written by [`write_tile_raster`].
pub fn read_tile_raster(tile_id: TileId, path: &Path) -> Result<TileRaster> {
    let unreadable = |reason: String| GeolabelError::ImageryFetch {
        tile: tile_id.to_string(),
        reason: format!("cached raster {} is unreadable: {}", path.display(), reason),
    };

    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file).map_err(|e| unreadable(e.to_string()))?;
    let (width, height) = decoder.dimensions().map_err(|e| unreadable(e.to_string()))?;

    let mut bands = Vec::new();
    let mut samples = Vec::new();
    loop {
        if decoder.dimensions().map_err(|e| unreadable(e.to_string()))? != (width, height) {
            return Err(unreadable("bands differ in size".to_string()));
        }
        let name = decoder
            .get_tag_ascii_string(Tag::ImageDescription)
            .map_err(|e| unreadable(e.to_string()))?;
        match decoder.read_image().map_err(|e| unreadable(e.to_string()))? {
            DecodingResult::F32(values) => samples.extend(values),
            _ => return Err(unreadable(format!("band {} is not float32", name))),
        }
        bands.push(name);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| unreadable(e.to_string()))?;
    }

    let data = Array3::from_shape_vec((bands.len(), height as usize, width as usize), samples)
        .map_err(|e| unreadable(e.to_string()))?;
    Ok(TileRaster { tile_id, bands, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolabel_core::models::{Crs, GeoBounds, GeoTransform};
    use ndarray::Array2;
    use tempfile::TempDir;

    fn raster() -> OutputRaster {
        let bounds = GeoBounds::new(10.0, 40.0, 10.3, 40.2).unwrap();
        let probabilities = Array2::from_shape_fn((4, 6), |(r, c)| (r * 6 + c) as f32 / 23.0);
        OutputRaster {
            transform: GeoTransform::from_bounds(&bounds, 6, 4),
            bounds,
            probabilities,
            crs: Crs::wgs84(),
        }
    }

    #[test]
    fn test_colormap_endpoints() {
        assert_eq!(colormap(0.0), [0, 0, 255, 128]);
        assert_eq!(colormap(1.0), [255, 0, 0, 128]);
        assert_eq!(colormap(f32::NAN), [0, 0, 255, 128]);
        assert_eq!(colormap(3.0), [255, 0, 0, 128]);
        let mid = colormap(0.5);
        assert_eq!(mid[1], 0);
        assert!((mid[0] as i32 - mid[2] as i32).abs() <= 1);
    }

    #[tokio::test]
    async fn test_geotiff_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("probability.tif");
        let raster = raster();
        GeoTiffPngWriter
            .write_probability_raster(Arc::new(raster.clone()), &path)
            .await
            .unwrap();

        let mut decoder = tiff::decoder::Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (6, 4));

        let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE)).unwrap();
        assert!((scale[0] - 0.05).abs() < 1e-12);
        assert!((scale[1] - 0.05).abs() < 1e-12);
        let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).unwrap();
        assert_eq!(&tiepoint[3..5], &[10.0, 40.2]);

        match decoder.read_image().unwrap() {
            tiff::decoder::DecodingResult::F32(values) => {
                let expected: Vec<f32> = raster.probabilities.iter().copied().collect();
                assert_eq!(values, expected);
            }
            other => panic!("unexpected sample type {:?}", std::mem::discriminant(&other)),
        }
    }

    #[tokio::test]
    async fn test_png_overlay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("overlay.png");
        let raster = raster();
        GeoTiffPngWriter.write_overlay(Arc::new(raster), &path).await.unwrap();

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (6, 4));
        assert_eq!(image.get_pixel(0, 0).0, colormap(0.0));
        assert_eq!(image.get_pixel(5, 3).0, colormap(1.0));
    }

    #[tokio::test]
    async fn test_unwritable_path_reports_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("overlay.png");
        let err = GeoTiffPngWriter.write_overlay(Arc::new(raster()), &path).await.unwrap_err();
        assert!(matches!(err, GeolabelError::ArtifactWrite { .. }));
    }

    #[test]
    fn test_tile_raster_keeps_band_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("3.tif");
        let raster = TileRaster {
            tile_id: TileId(3),
            bands: vec!["B4".to_string(), "B8".to_string(), "B11".to_string()],
            data: Array3::from_shape_fn((3, 5, 7), |(b, r, c)| (b * 100 + r * 10 + c) as f32),
        };
        write_tile_raster(&raster, &path).unwrap();

        let loaded = read_tile_raster(TileId(3), &path).unwrap();
        assert_eq!(loaded.tile_id, TileId(3));
        assert_eq!(loaded.bands, raster.bands);
        assert_eq!((loaded.height(), loaded.width()), (5, 7));
        assert_eq!(loaded.data[[2, 4, 6]], 246.0);
        assert_eq!(loaded.data, raster.data);
    }

    #[test]
    fn test_tile_raster_band_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let raster = TileRaster {
            tile_id: TileId(0),
            bands: vec!["B4".to_string()],
            data: Array3::zeros((2, 4, 4)),
        };
        let err = write_tile_raster(&raster, &dir.path().join("0.tif")).unwrap_err();
        assert!(matches!(err, GeolabelError::ArtifactWrite { .. }));
    }

    #[test]
    fn test_truncated_tile_raster_is_a_tile_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.tif");
        std::fs::write(&path, b"II*\0").unwrap();
        let err = read_tile_raster(TileId(1), &path).unwrap_err();
        assert!(matches!(err, GeolabelError::ImageryFetch { .. }));
    }
}
