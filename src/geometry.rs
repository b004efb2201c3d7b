// src/geometry.rs
//! Area-of-interest geometry: bounding boxes, single polygons with optional
//! holes, and the text parser chain (WKT, then GeoJSON, then KML).
use std::fmt;
use std::str::FromStr;

use gdal::vector::Geometry;
use geo::LineString;
use gdal_sys::OGRwkbGeometryType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::io::kml;
use crate::utils::gdal_ext;

/// Longitude/latitude envelope in EPSG:4326.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self> {
        let values = [min_lon, min_lat, max_lon, max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidGeometry(format!("non-finite bbox: {:?}", values)));
        }
        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(Error::InvalidGeometry(format!(
                "bbox minimum must be below maximum: {:?}",
                values
            )));
        }
        Ok(Self { min_lon, min_lat, max_lon, max_lat })
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`, the STAC `bbox` order.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    pub fn to_polygon(&self) -> GeometryPolygon {
        GeometryPolygon::new(vec![
            (self.min_lon, self.min_lat),
            (self.max_lon, self.min_lat),
            (self.max_lon, self.max_lat),
            (self.min_lon, self.max_lat),
        ])
    }
}

impl FromStr for BoundingBox {
    type Err = Error;

    /// Parses `min_lon,min_lat,max_lon,max_lat`.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::InvalidGeometry(format!("bbox '{}': {}", s, e)))?;
        match parts.as_slice() {
            [a, b, c, d] => BoundingBox::new(*a, *b, *c, *d),
            _ => Err(Error::InvalidGeometry(format!(
                "bbox '{}' must have four comma-separated numbers",
                s
            ))),
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.min_lon, self.min_lat, self.max_lon, self.max_lat)
    }
}

/// A single polygon with (x, y) vertices, normally (lon, lat).
///
/// Rings are stored closed: the last vertex repeats the first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryPolygon {
    pub exterior: Vec<(f64, f64)>,
    #[serde(default)]
    pub holes: Vec<Vec<(f64, f64)>>,
}

fn close_ring(mut ring: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

impl GeometryPolygon {
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self { exterior: close_ring(exterior), holes: Vec::new() }
    }

    pub fn with_holes(exterior: Vec<(f64, f64)>, holes: Vec<Vec<(f64, f64)>>) -> Self {
        Self {
            exterior: close_ring(exterior),
            holes: holes.into_iter().map(close_ring).collect(),
        }
    }

    pub fn has_holes(&self) -> bool {
        !self.holes.is_empty()
    }

    /// Number of distinct vertices on the exterior ring.
    pub fn distinct_vertex_count(&self) -> usize {
        let mut seen: Vec<(f64, f64)> = Vec::with_capacity(self.exterior.len());
        for v in &self.exterior {
            if !seen.contains(v) {
                seen.push(*v);
            }
        }
        seen.len()
    }

    pub fn bbox(&self) -> BoundingBox {
        let (min_x, min_y, max_x, max_y) = self.exterior.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), &(x, y)| (a.min(x), b.min(y), c.max(x), d.max(y)),
        );
        BoundingBox { min_lon: min_x, min_lat: min_y, max_lon: max_x, max_lat: max_y }
    }

    /// Copy of the polygon with every ring reprojected from `from` to `to`.
    pub fn reproject(&self, from: &str, to: &str) -> Result<GeometryPolygon> {
        let transform_ring = |ring: &[(f64, f64)]| -> Result<Vec<(f64, f64)>> {
            let mut xs: Vec<f64> = ring.iter().map(|p| p.0).collect();
            let mut ys: Vec<f64> = ring.iter().map(|p| p.1).collect();
            gdal_ext::transform_points(from, to, &mut xs, &mut ys)?;
            Ok(xs.into_iter().zip(ys).collect())
        };
        Ok(GeometryPolygon {
            exterior: transform_ring(&self.exterior)?,
            holes: self
                .holes
                .iter()
                .map(|h| transform_ring(h))
                .collect::<Result<_>>()?,
        })
    }

    /// The polygon as a `geo` shape, x = longitude (or easting).
    pub fn to_geo(&self) -> geo::Polygon<f64> {
        let line = |ring: &[(f64, f64)]| LineString::from(ring.to_vec());
        geo::Polygon::new(line(&self.exterior), self.holes.iter().map(|h| line(h)).collect())
    }

    pub fn to_wkt(&self) -> String {
        let ring = |r: &[(f64, f64)]| {
            let coords: Vec<String> = r.iter().map(|(x, y)| format!("{} {}", x, y)).collect();
            format!("({})", coords.join(", "))
        };
        let mut rings = vec![ring(&self.exterior)];
        rings.extend(self.holes.iter().map(|h| ring(h)));
        format!("POLYGON ({})", rings.join(", "))
    }
}

/// Outcome of one parser in the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryParse {
    Parsed(GeometryPolygon),
    /// Input is not in this parser's format; try the next one
    Unrecognized,
    /// Input looks like this format but is broken
    Invalid(String),
}

/// Run the WKT, GeoJSON and KML parsers in order.
///
/// The first parser that recognizes the text decides the outcome.
pub fn parse_geometry(text: &str) -> Result<GeometryPolygon> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidGeometry("empty geometry text".to_string()));
    }
    let parsers: [(&str, fn(&str) -> GeometryParse); 3] =
        [("WKT", parse_wkt), ("GeoJSON", parse_geojson), ("KML", kml::parse_kml)];

    for (format, parser) in parsers {
        match parser(text) {
            GeometryParse::Parsed(polygon) => {
                debug!("Parsed {} polygon with {} vertices", format, polygon.exterior.len());
                if polygon.distinct_vertex_count() < 3 {
                    return Err(Error::InvalidGeometry(format!(
                        "{} polygon has fewer than three distinct vertices",
                        format
                    )));
                }
                return Ok(polygon);
            }
            GeometryParse::Invalid(reason) => {
                return Err(Error::InvalidGeometry(format!("{}: {}", format, reason)))
            }
            GeometryParse::Unrecognized => {}
        }
    }
    Err(Error::InvalidGeometry("unrecognized geometry format".to_string()))
}

fn rings_from_gdal(polygon: &Geometry) -> Vec<Vec<(f64, f64)>> {
    (0..polygon.geometry_count())
        .map(|i| {
            polygon
                .get_geometry(i)
                .get_point_vec()
                .into_iter()
                .map(|(x, y, _)| (x, y))
                .collect()
        })
        .collect()
}

/// WKT `POLYGON` / `MULTIPOLYGON`, parsed by GDAL/OGR.
pub fn parse_wkt(text: &str) -> GeometryParse {
    let upper = text.trim_start().to_ascii_uppercase();
    if !(upper.starts_with("POLYGON") || upper.starts_with("MULTIPOLYGON")) {
        return GeometryParse::Unrecognized;
    }
    let geometry = match Geometry::from_wkt(text) {
        Ok(g) => g,
        Err(e) => return GeometryParse::Invalid(e.to_string()),
    };
    let rings = match geometry.geometry_type() {
        OGRwkbGeometryType::wkbPolygon | OGRwkbGeometryType::wkbPolygon25D => rings_from_gdal(&geometry),
        OGRwkbGeometryType::wkbMultiPolygon | OGRwkbGeometryType::wkbMultiPolygon25D => {
            let parts = geometry.geometry_count();
            if parts == 0 {
                return GeometryParse::Invalid("empty MULTIPOLYGON".to_string());
            }
            if parts > 1 {
                warn!("MULTIPOLYGON has {} parts; using the first", parts);
            }
            rings_from_gdal(&geometry.get_geometry(0))
        }
        other => return GeometryParse::Invalid(format!("unsupported geometry type {}", other)),
    };
    polygon_from_rings(rings)
}

fn polygon_from_rings(mut rings: Vec<Vec<(f64, f64)>>) -> GeometryParse {
    if rings.is_empty() || rings[0].is_empty() {
        return GeometryParse::Invalid("polygon has no exterior ring".to_string());
    }
    let exterior = rings.remove(0);
    GeometryParse::Parsed(GeometryPolygon::with_holes(exterior, rings))
}

fn json_ring(value: &Value) -> Option<Vec<(f64, f64)>> {
    value
        .as_array()?
        .iter()
        .map(|pos| {
            let pos = pos.as_array()?;
            Some((pos.first()?.as_f64()?, pos.get(1)?.as_f64()?))
        })
        .collect()
}

fn json_polygon(coordinates: &Value) -> GeometryParse {
    let rings: Option<Vec<_>> = coordinates
        .as_array()
        .map(|rings| rings.iter().map(json_ring).collect())
        .unwrap_or(None);
    match rings {
        Some(rings) => polygon_from_rings(rings),
        None => GeometryParse::Invalid("malformed polygon coordinates".to_string()),
    }
}

fn json_geometry(value: &Value) -> GeometryParse {
    match value.get("type").and_then(Value::as_str) {
        Some("Feature") => match value.get("geometry") {
            Some(g) if !g.is_null() => json_geometry(g),
            _ => GeometryParse::Invalid("feature has no geometry".to_string()),
        },
        Some("FeatureCollection") => {
            let features = value.get("features").and_then(Value::as_array);
            match features.map(|f| f.as_slice()) {
                Some([]) | None => GeometryParse::Invalid("empty feature collection".to_string()),
                Some(features) => {
                    if features.len() > 1 {
                        warn!("FeatureCollection has {} features; using the first", features.len());
                    }
                    json_geometry(&features[0])
                }
            }
        }
        Some("Polygon") => match value.get("coordinates") {
            Some(c) => json_polygon(c),
            None => GeometryParse::Invalid("polygon has no coordinates".to_string()),
        },
        Some("MultiPolygon") => {
            let parts = value.get("coordinates").and_then(Value::as_array);
            match parts.map(|p| p.as_slice()) {
                Some([]) | None => GeometryParse::Invalid("empty MultiPolygon".to_string()),
                Some(parts) => {
                    if parts.len() > 1 {
                        warn!("MultiPolygon has {} parts; using the first", parts.len());
                    }
                    json_polygon(&parts[0])
                }
            }
        }
        Some(other) => GeometryParse::Invalid(format!("unsupported GeoJSON type {}", other)),
        None => GeometryParse::Invalid("GeoJSON object has no type".to_string()),
    }
}

/// GeoJSON Feature, FeatureCollection, Polygon or MultiPolygon.
pub fn parse_geojson(text: &str) -> GeometryParse {
    if !text.trim_start().starts_with('{') {
        return GeometryParse::Unrecognized;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => json_geometry(&value),
        Err(e) => GeometryParse::Invalid(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_parses_and_validates() {
        let b: BoundingBox = "100.5, 13.7, 100.6, 13.8".parse().unwrap();
        assert_eq!(b.to_array(), [100.5, 13.7, 100.6, 13.8]);
        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("3,2,1,4".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn bbox_intersection() {
        let a = BoundingBox::new(100.0, 13.0, 101.0, 14.0).unwrap();
        let b = BoundingBox::new(100.5, 13.5, 102.0, 15.0).unwrap();
        let c = BoundingBox::new(101.5, 13.0, 102.0, 14.0).unwrap();
        assert!(a.intersects(&b) && b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn wkt_with_z_values_is_flattened() {
        match parse_wkt("POLYGON Z ((0 0 5, 1 0 5, 1 1 5, 0 0 5))") {
            GeometryParse::Parsed(p) => assert_eq!(p.exterior, vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            other => panic!("unexpected parse result {:?}", other),
        }
        match parse_wkt("MULTIPOLYGON Z (((0 0 1, 2 0 1, 2 2 1, 0 0 1)), ((5 5 1, 6 5 1, 6 6 1, 5 5 1)))") {
            GeometryParse::Parsed(p) => assert_eq!(p.bbox().to_array(), [0.0, 0.0, 2.0, 2.0]),
            other => panic!("unexpected parse result {:?}", other),
        }
    }

    #[test]
    fn geo_conversion_keeps_holes() {
        let p = GeometryPolygon::with_holes(
            vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)],
            vec![vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0)]],
        );
        let shape = p.to_geo();
        assert_eq!(shape.exterior().0.len(), 5);
        assert_eq!(shape.interiors().len(), 1);
    }

    #[test]
    fn rings_are_closed() {
        let p = GeometryPolygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]);
        assert_eq!(p.exterior.first(), p.exterior.last());
        assert_eq!(p.exterior.len(), 4);
        assert_eq!(p.distinct_vertex_count(), 3);
    }

    #[test]
    fn geojson_feature_collection_uses_first_polygon() {
        let text = r#"{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},
            "geometry":{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]],
            [[0.5,0.5],[1,0.5],[1,1],[0.5,0.5]]]}}]}"#;
        match parse_geojson(text) {
            GeometryParse::Parsed(p) => {
                assert_eq!(p.exterior.len(), 5);
                assert_eq!(p.holes.len(), 1);
                assert_eq!(p.bbox().to_array(), [0.0, 0.0, 2.0, 2.0]);
            }
            other => panic!("unexpected parse result {:?}", other),
        }
    }

    #[test]
    fn chain_skips_unrecognized_formats() {
        assert_eq!(parse_wkt("{\"type\":\"Polygon\"}"), GeometryParse::Unrecognized);
        assert_eq!(parse_geojson("POLYGON ((0 0, 1 0, 1 1, 0 0))"), GeometryParse::Unrecognized);
    }

    #[test]
    fn broken_geojson_is_invalid_not_unrecognized() {
        assert!(matches!(parse_geojson("{\"type\": \"Point\"}"), GeometryParse::Invalid(_)));
        assert!(parse_geometry("{not json").is_err());
    }

    #[test]
    fn degenerate_polygon_is_rejected() {
        let text = r#"{"type":"Polygon","coordinates":[[[0,0],[1,1],[0,0]]]}"#;
        assert!(parse_geometry(text).is_err());
    }

    #[test]
    fn wkt_round_trips_through_text() {
        let p = GeometryPolygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let again = parse_geometry(&p.to_wkt()).unwrap();
        assert_eq!(again, p);
    }
}
