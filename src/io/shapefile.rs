// src/io/shapefile.rs
use std::io::{Cursor, Write};

use gdal::vector::{FieldValue, Geometry, LayerAccess, LayerOptions};
use gdal::DriverManager;
use gdal_sys::{OGRFieldType, OGRwkbGeometryType};
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ExportError;
use crate::geometry::GeometryPolygon;
use crate::io::writer::MemFileGuard;
use crate::utils::gdal_ext::{self, vsimem_dir, WGS84};

const LAYER: &str = "aoi";
const SIDECARS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];
const REQUIRED: [&str; 3] = ["shp", "shx", "dbf"];

fn component_path(dir: &str, ext: &str) -> String {
    format!("{}/{}.{}", dir, LAYER, ext)
}

/// Write the exterior ring of `polygon` as a one-feature ESRI Shapefile in
/// EPSG:4326 and return the zipped component files.
pub fn encode_shapefile(polygon: &GeometryPolygon, name: &str) -> Result<Vec<u8>, ExportError> {
    encode_in(&vsimem_dir("shapefile"), polygon, name)
}

fn encode_in(dir: &str, polygon: &GeometryPolygon, name: &str) -> Result<Vec<u8>, ExportError> {
    if polygon.distinct_vertex_count() < 3 {
        return Err(ExportError::EmptyGeometry);
    }
    if polygon.has_holes() {
        warn!("Shapefile export drops {} hole(s)", polygon.holes.len());
    }

    // every component is unlinked on return, including early errors
    let _guards: Vec<MemFileGuard> = SIDECARS.iter().map(|ext| MemFileGuard(component_path(dir, ext))).collect();
    {
        let driver = DriverManager::get_driver_by_name("ESRI Shapefile")?;
        let mut ds = driver.create_vector_only(component_path(dir, "shp"))?;
        let srs = gdal_ext::spatial_ref(WGS84)?;
        let mut layer = ds.create_layer(LayerOptions {
            name: LAYER,
            srs: Some(&srs),
            ty: OGRwkbGeometryType::wkbPolygon,
            options: Some(&["ENCODING=UTF-8"]),
            ..Default::default()
        })?;
        layer.create_defn_fields(&[("name", OGRFieldType::OFTString)])?;

        let exterior_only = GeometryPolygon::new(polygon.exterior.clone());
        let geometry = Geometry::from_wkt(&exterior_only.to_wkt())?;
        layer.create_feature_fields(geometry, &["name"], &[FieldValue::StringValue(name.to_string())])?;
    }
    zip_components(dir)
}

/// Zip the components found under `dir`. `.shp`, `.shx` and `.dbf` must
/// exist; `.prj` and `.cpg` are taken when present.
fn zip_components(dir: &str) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for ext in SIDECARS {
        let bytes = match gdal::vsi::get_vsi_mem_file_bytes_owned(component_path(dir, ext)) {
            Ok(bytes) => bytes,
            Err(_) if REQUIRED.contains(&ext) => return Err(ExportError::MissingShapefilePart(ext)),
            Err(_) => {
                debug!("No .{} produced", ext);
                continue;
            }
        };
        zip.start_file(format!("{}.{}", LAYER, ext), options)?;
        zip.write_all(&bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_polygon_is_not_exported() {
        let p = GeometryPolygon::new(vec![(0.0, 0.0), (0.0, 0.0), (1.0, 1.0)]);
        assert!(matches!(encode_shapefile(&p, "x"), Err(ExportError::EmptyGeometry)));
    }

    fn is_gone(path: &str) -> bool {
        gdal::vsi::get_vsi_mem_file_bytes_owned(path).is_err()
    }

    #[test]
    fn scratch_files_are_removed() {
        let dir = vsimem_dir("shapefile_test");
        let square = GeometryPolygon::new(vec![(100.0, 13.0), (100.1, 13.0), (100.1, 13.1), (100.0, 13.1)]);
        let bytes = encode_in(&dir, &square, "plot").unwrap();
        assert!(!bytes.is_empty());
        for ext in SIDECARS {
            assert!(is_gone(&component_path(&dir, ext)), ".{} left behind", ext);
        }
    }

    #[test]
    fn missing_component_is_an_error() {
        let dir = vsimem_dir("shapefile_test");
        assert!(matches!(zip_components(&dir), Err(ExportError::MissingShapefilePart("shp"))));

        let shp = component_path(&dir, "shp");
        gdal::vsi::create_mem_file(&shp, vec![0u8; 100]).unwrap();
        let _guard = MemFileGuard(shp);
        assert!(matches!(zip_components(&dir), Err(ExportError::MissingShapefilePart("shx"))));
    }
}
