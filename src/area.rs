// src/area.rs
//! Geodesic polygon area on the WGS84 ellipsoid.
//!
//! Ring edges are geodesics (Karney's algorithm through `geo`), so the
//! result does not depend on how densely the outline was sampled.
use geo::{GeodesicArea, LineString, Polygon};
use serde::Serialize;

use crate::geometry::GeometryPolygon;

const SQ_M_PER_SQ_WA: f64 = 4.0;
const SQ_M_PER_NGAN: f64 = 400.0;
const SQ_M_PER_RAI: f64 = 1600.0;
const SQ_M_PER_HECTARE: f64 = 10_000.0;
const SQ_M_PER_ACRE: f64 = 4046.86;

/// Polygon area in square metres and the derived land units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AreaReport {
    pub sq_m: f64,
    pub sq_wa: f64,
    pub ngan: f64,
    pub rai: f64,
    pub hectare: f64,
    pub acre: f64,
}

impl AreaReport {
    pub fn from_sq_m(sq_m: f64) -> Self {
        Self {
            sq_m,
            sq_wa: sq_m / SQ_M_PER_SQ_WA,
            ngan: sq_m / SQ_M_PER_NGAN,
            rai: sq_m / SQ_M_PER_RAI,
            hectare: sq_m / SQ_M_PER_HECTARE,
            acre: sq_m / SQ_M_PER_ACRE,
        }
    }

    /// (label, value) pairs in display order.
    pub fn units(&self) -> [(&'static str, f64); 6] {
        [
            ("m²", self.sq_m),
            ("sq. wa", self.sq_wa),
            ("ngan", self.ngan),
            ("rai", self.rai),
            ("hectare", self.hectare),
            ("acre", self.acre),
        ]
    }
}

/// Geodesic area enclosed by one (lon, lat) ring, in square metres.
fn ring_area(ring: &[(f64, f64)]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    Polygon::new(LineString::from(ring.to_vec()), vec![]).geodesic_area_unsigned()
}

/// Ellipsoidal area of `polygon`, holes subtracted.
pub fn geodesic_area(polygon: &GeometryPolygon) -> AreaReport {
    let outer = ring_area(&polygon.exterior);
    let holes: f64 = polygon.holes.iter().map(|h| ring_area(h)).sum();
    AreaReport::from_sq_m((outer - holes).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn box_polygon(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> GeometryPolygon {
        GeometryPolygon::new(vec![
            (min_lon, min_lat),
            (max_lon, min_lat),
            (max_lon, max_lat),
            (min_lon, max_lat),
        ])
    }

    #[test]
    fn one_degree_box_at_equator() {
        let report = geodesic_area(&box_polygon(0.0, 0.0, 1.0, 1.0));
        assert_relative_eq!(report.sq_m, 1.230_846e10, max_relative = 1e-4);
        assert_relative_eq!(report.hectare, report.sq_m / 10_000.0);
        assert_relative_eq!(report.rai, report.sq_m / 1600.0);
    }

    #[test]
    fn orientation_does_not_matter() {
        let ccw = box_polygon(100.0, 13.0, 100.5, 13.5);
        let mut cw = ccw.clone();
        cw.exterior.reverse();
        assert_relative_eq!(geodesic_area(&ccw).sq_m, geodesic_area(&cw).sq_m, max_relative = 1e-10);
    }

    #[test]
    fn mid_latitude_box() {
        let report = geodesic_area(&box_polygon(7.0, 45.0, 8.0, 46.0));
        assert_relative_eq!(report.sq_m, 8.686_495e9, max_relative = 1e-4);
    }

    #[test]
    fn large_box_uses_geodesic_edges() {
        // 20° x 10° at 55-65°N: the northern edge bows poleward, so the area
        // is about 1.3% below the box bounded by parallels (1.2417e12 m²)
        let report = geodesic_area(&box_polygon(0.0, 55.0, 20.0, 65.0));
        assert_relative_eq!(report.sq_m, 1.226_073e12, max_relative = 1e-5);
    }

    #[test]
    fn small_field_in_hectares() {
        // about 1 km x 1 km near Bangkok
        let report = geodesic_area(&box_polygon(100.5, 13.7, 100.509_26, 13.709_04));
        assert!(report.hectare > 99.0 && report.hectare < 101.0, "{}", report.hectare);
    }

    #[test]
    fn antimeridian_box_matches_regular_box() {
        let wrapped = geodesic_area(&box_polygon(179.5, -10.0, -179.5, -9.0));
        let regular = geodesic_area(&box_polygon(10.0, -10.0, 11.0, -9.0));
        assert_relative_eq!(wrapped.sq_m, regular.sq_m, max_relative = 1e-9);
    }

    #[test]
    fn holes_are_subtracted() {
        let outer = box_polygon(0.0, 0.0, 1.0, 1.0);
        let hole = box_polygon(0.25, 0.25, 0.75, 0.75);
        let with_hole = GeometryPolygon::with_holes(outer.exterior.clone(), vec![hole.exterior.clone()]);
        let expected = geodesic_area(&outer).sq_m - geodesic_area(&hole).sq_m;
        assert_relative_eq!(geodesic_area(&with_hole).sq_m, expected, max_relative = 1e-10);
    }
}
