// src/utils/gdal_ext.rs
//! Small helpers over the GDAL bindings: spatial references with lon/lat axis
//! order, point and envelope reprojection, and `/vsimem/` scratch paths.
use std::sync::atomic::{AtomicUsize, Ordering};

use gdal::errors::Result;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};

/// Geographic frame every user-facing coordinate is expressed in.
pub const WGS84: &str = "EPSG:4326";

static VSIMEM_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Build a spatial reference from a WKT string or an `AUTH:CODE` definition.
///
/// Axis order is forced to (x=lon/easting, y=lat/northing) so coordinates can
/// be passed straight through from GeoJSON-style rings.
pub fn spatial_ref(definition: &str) -> Result<SpatialRef> {
    let mut srs = SpatialRef::from_definition(definition.trim())?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

fn same_definition(from: &str, to: &str) -> bool {
    from.trim().eq_ignore_ascii_case(to.trim())
}

/// Reproject coordinates in place.
pub fn transform_points(from: &str, to: &str, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
    if same_definition(from, to) || xs.is_empty() {
        return Ok(());
    }
    let source = spatial_ref(from)?;
    let target = spatial_ref(to)?;
    let transform = CoordTransform::new(&source, &target)?;
    let mut zs = vec![0.0; xs.len()];
    transform.transform_coords(xs, ys, &mut zs)
}

/// Reproject an envelope `[min_x, min_y, max_x, max_y]`.
///
/// Each edge is sampled at `densify` interior points so curved edges in the
/// target frame are still fully enclosed by the returned envelope.
pub fn transform_bounds(from: &str, to: &str, bounds: [f64; 4], densify: usize) -> Result<[f64; 4]> {
    if same_definition(from, to) {
        return Ok(bounds);
    }
    let [min_x, min_y, max_x, max_y] = bounds;
    let steps = densify + 1;
    let mut xs = Vec::with_capacity(steps * 4);
    let mut ys = Vec::with_capacity(steps * 4);
    for i in 0..steps {
        let t = i as f64 / steps as f64;
        let x = min_x + (max_x - min_x) * t;
        let y = min_y + (max_y - min_y) * t;
        // bottom, right, top, left edges walked counter-clockwise
        xs.extend_from_slice(&[x, max_x, max_x - (x - min_x), min_x]);
        ys.extend_from_slice(&[min_y, y, max_y, max_y - (y - min_y)]);
    }
    transform_points(from, to, &mut xs, &mut ys)?;

    let fold = |values: &[f64]| {
        values
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    };
    let (out_min_x, out_max_x) = fold(&xs);
    let (out_min_y, out_max_y) = fold(&ys);
    Ok([out_min_x, out_min_y, out_max_x, out_max_y])
}

/// Unique in-memory file path, e.g. `/vsimem/vi_calc_7_geotiff.tif`.
pub fn vsimem_path(stem: &str, extension: &str) -> String {
    let n = VSIMEM_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/vsimem/vi_calc_{}_{}_{}.{}", std::process::id(), n, stem, extension)
}

/// Unique in-memory directory, used for multi-file formats.
pub fn vsimem_dir(stem: &str) -> String {
    let n = VSIMEM_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("/vsimem/vi_calc_{}_{}_{}", std::process::id(), n, stem)
}

/// GDAL path for a raster asset locator; remote assets go through `/vsicurl/`.
pub fn gdal_path(locator: &str) -> String {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        format!("/vsicurl/{}", locator)
    } else {
        locator.to_string()
    }
}

/// `locator` without its query string, which for signed URLs holds the
/// access token. Safe to log or put in error messages.
pub fn redact_locator(locator: &str) -> &str {
    locator.split_once('?').map_or(locator, |(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn central_meridian_maps_to_false_easting() {
        let (mut xs, mut ys) = (vec![99.0], vec![0.0]);
        transform_points(WGS84, "EPSG:32647", &mut xs, &mut ys).unwrap();
        assert_abs_diff_eq!(xs[0], 500_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(ys[0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn utm_bounds_enclose_every_edge_sample() {
        let bbox = [99.95, 13.62, 99.98, 13.65];
        let [min_x, min_y, max_x, max_y] = transform_bounds(WGS84, "EPSG:32647", bbox, 20).unwrap();
        assert!(min_x > 600_000.0 && max_x < 610_000.0, "{} {}", min_x, max_x);
        assert!(min_y > 1_500_000.0 && max_y < 1_515_000.0, "{} {}", min_y, max_y);
        // about 3.2 km x 3.3 km
        assert!((3_000.0..3_500.0).contains(&(max_x - min_x)));
        assert!((3_100.0..3_500.0).contains(&(max_y - min_y)));

        let (mut xs, mut ys) = (vec![99.95, 99.98, 99.965], vec![13.62, 13.65, 13.62]);
        transform_points(WGS84, "EPSG:32647", &mut xs, &mut ys).unwrap();
        for (x, y) in xs.into_iter().zip(ys) {
            assert!(x >= min_x && x <= max_x && y >= min_y && y <= max_y);
        }
    }

    #[test]
    fn symmetric_box_stays_symmetric_about_central_meridian() {
        let [min_x, min_y, max_x, max_y] = transform_bounds(WGS84, "EPSG:32647", [98.9, -0.1, 99.1, 0.1], 10).unwrap();
        assert_abs_diff_eq!(min_x + max_x, 1_000_000.0, epsilon = 1e-3);
        assert_abs_diff_eq!(min_y + max_y, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn signed_locators_are_redacted() {
        assert_eq!(
            redact_locator("https://x.blob.core.windows.net/B04.tif?st=2024&sig=abc%3D"),
            "https://x.blob.core.windows.net/B04.tif"
        );
        assert_eq!(redact_locator("/data/B04.tif"), "/data/B04.tif");
    }

    #[test]
    fn identical_frames_are_not_transformed() {
        let b = transform_bounds(WGS84, "epsg:4326", [100.0, 13.0, 101.0, 14.0], 20).unwrap();
        assert_eq!(b, [100.0, 13.0, 101.0, 14.0]);
    }

    #[test]
    fn vsimem_paths_are_unique() {
        assert_ne!(vsimem_path("a", "tif"), vsimem_path("a", "tif"));
    }

    #[test]
    fn remote_locators_use_vsicurl() {
        assert_eq!(gdal_path("https://x/B04.tif"), "/vsicurl/https://x/B04.tif");
        assert_eq!(gdal_path("/data/B04.tif"), "/data/B04.tif");
    }
}
