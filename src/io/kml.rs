// src/io/kml.rs
//! KML export of the area of interest, and the KML reader used by the
//! geometry parser chain.
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use crate::error::ExportError;
use crate::geometry::{GeometryParse, GeometryPolygon};

/// Render the exterior ring of `polygon` as a single styled placemark.
///
/// Holes are not written.
pub fn encode_kml(polygon: &GeometryPolygon, name: &str, description: &str) -> Result<String, ExportError> {
    if polygon.distinct_vertex_count() < 3 {
        return Err(ExportError::EmptyGeometry);
    }
    if polygon.has_holes() {
        warn!("KML export drops {} hole(s)", polygon.holes.len());
    }

    let coordinates: Vec<String> = polygon
        .exterior
        .iter()
        .map(|(lon, lat)| format!("{},{},0", lon, lat))
        .collect();

    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <name>{name}</name>
    <Style id="aoiStyle">
      <LineStyle>
        <color>ff0000ff</color>
        <width>2</width>
      </LineStyle>
      <PolyStyle>
        <color>4d0000ff</color>
      </PolyStyle>
    </Style>
    <Placemark>
      <name>{name}</name>
      <description>{description}</description>
      <styleUrl>#aoiStyle</styleUrl>
      <Polygon>
        <outerBoundaryIs>
          <LinearRing>
            <coordinates>{coordinates}</coordinates>
          </LinearRing>
        </outerBoundaryIs>
      </Polygon>
    </Placemark>
  </Document>
</kml>
"#,
        name = escape(name),
        description = escape(description),
        coordinates = coordinates.join(" "),
    ))
}

fn parse_coordinates(text: &str) -> Option<Vec<(f64, f64)>> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let lon = parts.next()?.trim().parse::<f64>().ok()?;
            let lat = parts.next()?.trim().parse::<f64>().ok()?;
            Some((lon, lat))
        })
        .collect()
}

/// Read the first `Polygon` of a KML document.
///
/// `outerBoundaryIs` becomes the exterior ring and every `innerBoundaryIs`
/// a hole. Text that does not start with `<` is not KML.
pub fn parse_kml(text: &str) -> GeometryParse {
    if !text.trim_start().starts_with('<') {
        return GeometryParse::Unrecognized;
    }
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut in_outer = false;
    let mut in_inner = false;
    let mut in_coordinates = false;
    let mut polygons_seen = 0usize;
    let mut exterior: Option<Vec<(f64, f64)>> = None;
    let mut holes: Vec<Vec<(f64, f64)>> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"Polygon" => polygons_seen += 1,
                b"outerBoundaryIs" => in_outer = true,
                b"innerBoundaryIs" => in_inner = true,
                b"coordinates" => in_coordinates = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"outerBoundaryIs" => in_outer = false,
                b"innerBoundaryIs" => in_inner = false,
                b"coordinates" => in_coordinates = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_coordinates && polygons_seen == 1 => {
                let raw = match t.unescape() {
                    Ok(raw) => raw,
                    Err(e) => return GeometryParse::Invalid(e.to_string()),
                };
                let Some(ring) = parse_coordinates(&raw) else {
                    return GeometryParse::Invalid(format!("malformed coordinates: {}", raw));
                };
                if in_outer && exterior.is_none() {
                    exterior = Some(ring);
                } else if in_inner {
                    holes.push(ring);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return GeometryParse::Invalid(e.to_string()),
            _ => {}
        }
    }

    if polygons_seen > 1 {
        warn!("KML has {} polygons; using the first", polygons_seen);
    }
    match exterior {
        Some(ring) => GeometryParse::Parsed(GeometryPolygon::with_holes(ring, holes)),
        None => GeometryParse::Invalid("no Polygon outer boundary found".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> GeometryPolygon {
        GeometryPolygon::new(vec![(100.0, 13.0), (100.1, 13.0), (100.1, 13.1), (100.0, 13.1)])
    }

    #[test]
    fn placemark_carries_escaped_text() {
        let kml = encode_kml(&square(), "Plot <A> & B", "NDVI 2024-06-01").unwrap();
        assert!(kml.contains("<name>Plot &lt;A&gt; &amp; B</name>"));
        assert!(kml.contains("100,13,0 100.1,13,0 100.1,13.1,0 100,13.1,0 100,13,0"));
    }

    #[test]
    fn degenerate_polygon_is_not_exported() {
        let line = GeometryPolygon::new(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!(matches!(encode_kml(&line, "x", ""), Err(ExportError::EmptyGeometry)));
    }

    #[test]
    fn exported_kml_parses_back() {
        let kml = encode_kml(&square(), "aoi", "").unwrap();
        assert_eq!(parse_kml(&kml), GeometryParse::Parsed(square()));
    }

    #[test]
    fn inner_boundaries_become_holes() {
        let text = r#"<kml><Placemark><Polygon>
            <outerBoundaryIs><LinearRing><coordinates>0,0 4,0 4,4 0,4 0,0</coordinates></LinearRing></outerBoundaryIs>
            <innerBoundaryIs><LinearRing><coordinates>1,1 2,1 2,2 1,1</coordinates></LinearRing></innerBoundaryIs>
            </Polygon></Placemark></kml>"#;
        match parse_kml(text) {
            GeometryParse::Parsed(p) => {
                assert_eq!(p.exterior.len(), 5);
                assert_eq!(p.holes, vec![vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 1.0)]]);
            }
            other => panic!("unexpected parse result {:?}", other),
        }
    }

    #[test]
    fn non_xml_is_unrecognized() {
        assert_eq!(parse_kml("POLYGON ((0 0, 1 0, 1 1, 0 0))"), GeometryParse::Unrecognized);
    }
}
