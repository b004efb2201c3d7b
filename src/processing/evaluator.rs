// src/processing/evaluator.rs
use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::debug;

use super::indices::{BandId, IndexDefinition, MAX_BANDS};
use crate::error::{Error, Result};
use crate::io::reader::{GeoInfo, RasterBand};

/// Per-pixel index values on the grid of the bands they came from.
/// Invalid pixels are NaN.
#[derive(Clone, Debug, PartialEq)]
pub struct ViRaster {
    pub index: &'static str,
    pub data: Vec<f32>,
    pub geo: GeoInfo,
}

impl ViRaster {
    pub fn shape(&self) -> (usize, usize) {
        self.geo.shape()
    }
}

/// Digital numbers to reflectance. Samples equal to the band's nodata value
/// become NaN.
pub fn to_reflectance(band: &RasterBand, scale: f32) -> Vec<f32> {
    let nodata = band.nodata;
    band.data
        .par_iter()
        .map(|&dn| match nodata {
            Some(nd) if f64::from(dn) == nd => f32::NAN,
            _ => f32::from(dn) / scale,
        })
        .collect()
}

/// Evaluate `def` over `bands`.
///
/// Every band the index lists must be present and all must share one grid;
/// bands are never resampled. Any NaN input sample gives a NaN output.
pub fn evaluate(
    def: &'static IndexDefinition,
    bands: &BTreeMap<BandId, RasterBand>,
    epsilon: f32,
    scale: f32,
) -> Result<ViRaster> {
    let mut inputs: Vec<&RasterBand> = Vec::with_capacity(def.bands.len());
    for &band in def.bands {
        let raster = bands
            .get(&band)
            .ok_or(Error::MissingBandData { index: def.id, band })?;
        inputs.push(raster);
    }

    let reference = inputs[0];
    let (width, height) = reference.shape();
    for raster in &inputs[1..] {
        let (w, h) = raster.shape();
        if (w, h) != (width, height) || raster.data.len() != width * height {
            return Err(Error::BandShapeMismatch {
                index: def.id,
                band: raster.band,
                expected_width: width,
                expected_height: height,
                found_width: w,
                found_height: h,
            });
        }
    }

    let reflectance: Vec<Vec<f32>> = inputs.iter().map(|b| to_reflectance(b, scale)).collect();
    debug!("Evaluating {} over {}x{} pixels", def.id, width, height);

    let n = def.bands.len();
    let formula = def.formula;
    let mut result_data = vec![f32::NAN; width * height];
    result_data.par_iter_mut().enumerate().for_each(|(i, result)| {
        let mut px = [0.0f32; MAX_BANDS];
        for (slot, band) in px.iter_mut().zip(&reflectance) {
            *slot = band[i];
        }
        let px = &px[..n];
        *result = if px.iter().any(|v| v.is_nan()) {
            f32::NAN
        } else {
            formula(px, epsilon)
        };
    });

    Ok(ViRaster { index: def.id, data: result_data, geo: reference.geo.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::indices::lookup;

    fn band(band: BandId, data: Vec<u16>, width: usize, height: usize) -> RasterBand {
        RasterBand {
            band,
            data,
            geo: GeoInfo {
                projection: "EPSG:32647".to_string(),
                geo_transform: [0.0, 10.0, 0.0, 0.0, 0.0, -10.0],
                width,
                height,
            },
            nodata: Some(0.0),
        }
    }

    #[test]
    fn nodata_becomes_nan() {
        let r = to_reflectance(&band(BandId::B04, vec![0, 5000], 2, 1), 10000.0);
        assert!(r[0].is_nan());
        assert_eq!(r[1], 0.5);
    }

    #[test]
    fn extra_bands_are_ignored() {
        let def = lookup("NDVI").unwrap();
        let mut bands = BTreeMap::new();
        bands.insert(BandId::B04, band(BandId::B04, vec![2000; 4], 2, 2));
        bands.insert(BandId::B08, band(BandId::B08, vec![5000; 4], 2, 2));
        bands.insert(BandId::Scl, band(BandId::Scl, vec![4; 1], 1, 1));
        let vi = evaluate(def, &bands, 1e-6, 10000.0).unwrap();
        assert_eq!(vi.data.len(), 4);
        assert!((vi.data[0] - 0.3 / 0.7).abs() < 1e-5);
    }

    #[test]
    fn mixed_resolution_is_rejected() {
        let def = lookup("RECI").unwrap();
        let mut bands = BTreeMap::new();
        bands.insert(BandId::B05, band(BandId::B05, vec![1500; 4], 2, 2));
        bands.insert(BandId::B07, band(BandId::B07, vec![4000; 16], 4, 4));
        match evaluate(def, &bands, 1e-6, 10000.0) {
            Err(Error::BandShapeMismatch { index, band, found_width, .. }) => {
                assert_eq!(index, "RECI");
                assert_eq!(band, BandId::B07);
                assert_eq!(found_width, 4);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
