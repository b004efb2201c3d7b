// src/processing/mask.rs
//! Polygon masking of rasters by pixel-centre point-in-polygon tests.
use geo::{Contains, Point};
use rayon::prelude::*;
use tracing::debug;

use super::evaluator::ViRaster;
use crate::error::Result;
use crate::geometry::GeometryPolygon;
use crate::io::reader::GeoInfo;
use crate::utils::gdal_ext::WGS84;

/// Row-major inside/outside flags for every pixel centre of `geo`.
///
/// `polygon` must already be in the grid's CRS. Centres inside a hole or
/// exactly on the boundary are outside.
pub fn polygon_mask(geo: &GeoInfo, polygon: &GeometryPolygon) -> Vec<bool> {
    let (width, height) = geo.shape();
    let mut mask = vec![false; width * height];
    if width == 0 {
        return mask;
    }
    let shape = polygon.to_geo();
    mask.par_chunks_mut(width).enumerate().for_each(|(row, flags)| {
        for (col, flag) in flags.iter_mut().enumerate() {
            let (x, y) = geo.pixel_center(col, row);
            *flag = shape.contains(&Point::new(x, y));
        }
    });
    mask
}

/// Set every sample outside `mask` to NaN.
pub fn apply_mask(data: &mut [f32], mask: &[bool]) {
    data.par_iter_mut().zip(mask.par_iter()).for_each(|(v, &inside)| {
        if !inside {
            *v = f32::NAN;
        }
    });
}

/// Reproject a WGS84 polygon into `geo`'s CRS and rasterize it.
pub fn mask_for_grid(geo: &GeoInfo, polygon: &GeometryPolygon) -> Result<Vec<bool>> {
    let native = if geo.projection.trim().is_empty() {
        polygon.clone()
    } else {
        polygon.reproject(WGS84, &geo.projection)?
    };
    Ok(polygon_mask(geo, &native))
}

/// Restrict `raster` to `polygon` (EPSG:4326). Without a polygon the raster
/// is returned unchanged.
pub fn mask_raster(mut raster: ViRaster, polygon: Option<&GeometryPolygon>) -> Result<ViRaster> {
    let Some(polygon) = polygon else {
        return Ok(raster);
    };
    let mask = mask_for_grid(&raster.geo, polygon)?;
    debug!(
        "{} of {} pixels inside the polygon",
        mask.iter().filter(|&&m| m).count(),
        mask.len()
    );
    apply_mask(&mut raster.data, &mask);
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GeoInfo {
        // 4x4 pixels of 0.25 degrees over [0, 1] x [0, 1]
        GeoInfo {
            projection: WGS84.to_string(),
            geo_transform: [0.0, 0.25, 0.0, 1.0, 0.0, -0.25],
            width: 4,
            height: 4,
        }
    }

    #[test]
    fn concave_ring_masks_the_notch() {
        // U shape opening to the north, in 0.25 degree cells
        let u = GeometryPolygon::new(vec![
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.75, 1.0),
            (0.75, 0.25),
            (0.25, 0.25),
            (0.25, 1.0),
            (0.0, 1.0),
        ]);
        let mask = polygon_mask(&grid(), &u);
        // left arm, notch, right arm of the top row
        assert_eq!(&mask[0..4], &[true, false, false, true]);
        // bottom row is solid
        assert!(mask[12..16].iter().all(|&m| m));
    }

    #[test]
    fn holes_exclude_pixels() {
        let p = GeometryPolygon::with_holes(
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)],
            vec![vec![(0.3, 0.3), (0.7, 0.3), (0.7, 0.7), (0.3, 0.7)]],
        );
        let mask = polygon_mask(&grid(), &p);
        // centres (0.375, 0.625) and (0.625, 0.375) fall in the hole
        assert!(!mask[5] && !mask[10]);
        assert!(mask[0] && mask[15]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 12);
    }

    #[test]
    fn polygon_equal_to_grid_keeps_every_pixel() {
        let full = GeometryPolygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert!(polygon_mask(&grid(), &full).iter().all(|&m| m));
    }

    #[test]
    fn utm_grid_masks_reprojected_polygon() {
        // 100 m pixels in UTM 47N around 99.96E 13.63N
        let geo = GeoInfo {
            projection: "EPSG:32647".to_string(),
            geo_transform: [602000.0, 100.0, 0.0, 1510000.0, 0.0, -100.0],
            width: 40,
            height: 40,
        };
        let (mut xs, mut ys) = (vec![602000.0, 606000.0, 602000.0], vec![1506000.0, 1506000.0, 1510000.0]);
        crate::utils::gdal_ext::transform_points("EPSG:32647", WGS84, &mut xs, &mut ys).unwrap();
        // lower-left half of the grid, expressed in lon/lat
        let triangle = GeometryPolygon::new(xs.into_iter().zip(ys).collect());

        let mask = mask_for_grid(&geo, &triangle).unwrap();
        assert!(mask[39 * 40]);
        assert!(!mask[39]);
        let inside = mask.iter().filter(|&&m| m).count();
        assert!((740..=860).contains(&inside), "{}", inside);
    }

    #[test]
    fn triangle_masks_upper_right_pixels() {
        let tri = GeometryPolygon::new(vec![(0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        let mask = polygon_mask(&grid(), &tri);
        // pixel (col 3, row 0) centre (0.875, 0.875) is inside
        assert!(mask[3]);
        // pixel (col 0, row 3) centre (0.125, 0.125) is outside
        assert!(!mask[12]);
    }

    #[test]
    fn no_polygon_is_identity() {
        let raster = ViRaster { index: "NDVI", data: vec![0.5; 16], geo: grid() };
        let out = mask_raster(raster.clone(), None).unwrap();
        assert_eq!(out, raster);
    }
}
