// src/io/writer.rs
use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::{Dataset, DriverManager, Metadata};
use tracing::debug;

use super::reader::GeoInfo;
use crate::error::ExportError;
use crate::utils::gdal_ext::{self, vsimem_path};

/// A named `f32` grid to be written as one GeoTIFF band.
#[derive(Clone, Copy, Debug)]
pub struct GeoGrid<'a> {
    pub name: &'a str,
    pub data: &'a [f32],
    pub geo: &'a GeoInfo,
}

/// Contents of a decoded GeoTIFF.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedRaster {
    pub geo: GeoInfo,
    pub bands: Vec<DecodedBand>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBand {
    pub description: String,
    pub data: Vec<f32>,
    pub nodata: Option<f64>,
}

fn check_shapes(grids: &[GeoGrid]) -> Result<(), ExportError> {
    let first = grids.first().ok_or(ExportError::NoBands)?;
    let (width, height) = first.geo.shape();
    for grid in grids {
        let (w, h) = grid.geo.shape();
        if (w, h) != (width, height) || grid.data.len() != width * height {
            return Err(ExportError::ShapeMismatch {
                band: grid.name.to_string(),
                expected_width: width,
                expected_height: height,
                found_width: w,
                found_height: if w == 0 { 0 } else { grid.data.len() / w },
            });
        }
    }
    Ok(())
}

/// Removes a `/vsimem/` file when dropped.
pub(crate) struct MemFileGuard(pub(crate) String);

impl Drop for MemFileGuard {
    fn drop(&mut self) {
        let _ = gdal::vsi::unlink_mem_file(&self.0);
    }
}

/// Encode one or more same-shaped grids as a DEFLATE-compressed float32
/// GeoTIFF. NaN is declared as nodata and each band carries its name as
/// description. CRS and transform come from the first grid.
pub fn encode_geotiff(grids: &[GeoGrid]) -> Result<Vec<u8>, ExportError> {
    check_shapes(grids)?;
    let geo = grids[0].geo;
    let (width, height) = geo.shape();

    let path = vsimem_path("geotiff", "tif");
    let guard = MemFileGuard(path.clone());
    let creation_options = RasterCreationOptions::from_iter(["COMPRESS=DEFLATE", "PREDICTOR=3", "TILED=YES"]);

    {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut out_ds = driver.create_with_band_type_with_options::<f32, _>(
            &path,
            width,
            height,
            grids.len(),
            &creation_options,
        )?;

        if !geo.projection.trim().is_empty() {
            out_ds.set_spatial_ref(&gdal_ext::spatial_ref(&geo.projection)?)?;
        }
        out_ds.set_geo_transform(&geo.geo_transform)?;

        for (i, grid) in grids.iter().enumerate() {
            let mut band = out_ds.rasterband(i + 1)?;
            band.set_no_data_value(Some(f64::NAN))?;
            band.set_description(grid.name)?;
            let mut buffer = Buffer::new((width, height), grid.data.to_vec());
            band.write((0, 0), (width, height), &mut buffer)?;
        }

        out_ds.flush_cache()?;
    }

    let bytes = gdal::vsi::get_vsi_mem_file_bytes_owned(&path)?;
    drop(guard);
    debug!("Encoded {} band(s) {}x{} into {} bytes", grids.len(), width, height, bytes.len());
    Ok(bytes)
}

/// Read GeoTIFF bytes back: values, transform, CRS, descriptions and nodata.
pub fn decode_geotiff(bytes: &[u8]) -> Result<DecodedRaster, ExportError> {
    let path = vsimem_path("decode", "tif");
    gdal::vsi::create_mem_file(&path, bytes.to_vec())?;
    let _guard = MemFileGuard(path.clone());

    let ds = Dataset::open(&path)?;
    let (width, height) = ds.raster_size();
    let geo = GeoInfo {
        projection: ds.projection(),
        geo_transform: ds.geo_transform()?,
        width,
        height,
    };

    let mut bands = Vec::with_capacity(ds.raster_count());
    for i in 1..=ds.raster_count() {
        let band = ds.rasterband(i)?;
        let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        bands.push(DecodedBand {
            description: band.description().unwrap_or_default(),
            data: buffer.data().to_vec(),
            nodata: band.no_data_value(),
        });
    }
    Ok(DecodedRaster { geo, bands })
}

/// Encode an RGBA pixel buffer (row-major, 4 bytes per pixel) as PNG.
pub fn encode_png(rgba: &[u8], width: usize, height: usize) -> Result<Vec<u8>, ExportError> {
    if rgba.len() != width * height * 4 {
        return Err(ExportError::ShapeMismatch {
            band: "RGBA".to_string(),
            expected_width: width,
            expected_height: height,
            found_width: width,
            found_height: if width == 0 { 0 } else { rgba.len() / (width * 4) },
        });
    }

    let mem_driver = DriverManager::get_driver_by_name("MEM")?;
    let mut mem_ds = mem_driver.create_with_band_type::<u8, _>("", width, height, 4)?;
    for channel in 0..4 {
        let plane: Vec<u8> = rgba.iter().skip(channel).step_by(4).copied().collect();
        let mut band = mem_ds.rasterband(channel + 1)?;
        let mut buffer = Buffer::new((width, height), plane);
        band.write((0, 0), (width, height), &mut buffer)?;
    }

    let path = vsimem_path("render", "png");
    let _guard = MemFileGuard(path.clone());
    {
        let png_driver = DriverManager::get_driver_by_name("PNG")?;
        let png_ds = mem_ds.create_copy(&png_driver, &path, &RasterCreationOptions::new())?;
        drop(png_ds);
    }
    Ok(gdal::vsi::get_vsi_mem_file_bytes_owned(&path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stack_is_rejected() {
        assert!(matches!(encode_geotiff(&[]), Err(ExportError::NoBands)));
    }

    #[test]
    fn mismatched_grid_names_the_band() {
        let geo = GeoInfo {
            projection: "EPSG:4326".to_string(),
            geo_transform: [0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
            width: 2,
            height: 2,
        };
        let small = GeoInfo { width: 1, height: 2, ..geo.clone() };
        let a = vec![0.0; 4];
        let b = vec![0.0; 2];
        let err = encode_geotiff(&[
            GeoGrid { name: "B04", data: &a, geo: &geo },
            GeoGrid { name: "B08", data: &b, geo: &small },
        ])
        .unwrap_err();
        match err {
            ExportError::ShapeMismatch { band, found_width, .. } => {
                assert_eq!(band, "B08");
                assert_eq!(found_width, 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn png_rejects_short_buffer() {
        assert!(encode_png(&[0u8; 7], 2, 1).is_err());
    }
}
