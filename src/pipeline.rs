// src/pipeline.rs
//! End-to-end analysis: scene selection, band retrieval, index evaluation,
//! polygon masking, area and statistics, bundled in one owned result.
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::area::{geodesic_area, AreaReport};
use crate::catalog::{select_scene, ImageryCatalog, SceneCandidate, SceneSelection, SelectionParams, StacCatalog};
use crate::config::AnalysisConfig;
use crate::error::{Error, ExportError, Result};
use crate::geometry::{parse_geometry, BoundingBox, GeometryPolygon};
use crate::io::reader::{retrieve_bands, FetchOptions, GdalAssetStore, RasterAssetStore, RasterBand};
use crate::io::writer::{encode_geotiff, encode_png, GeoGrid};
use crate::io::{kml, shapefile};
use crate::processing::evaluator::{evaluate, to_reflectance, ViRaster};
use crate::processing::indices::{lookup, BandId, IndexDefinition};
use crate::processing::mask::{apply_mask, mask_for_grid, mask_raster};
use crate::processing::render::{colorize, display_range};
use crate::processing::stats::ViStatistics;

/// Where to analyse: a plain box or an exact polygon (EPSG:4326).
#[derive(Clone, Debug, PartialEq)]
pub enum AreaOfInterest {
    BoundingBox(BoundingBox),
    Polygon(GeometryPolygon),
}

impl AreaOfInterest {
    /// Area from user input. A geometry that fails to parse falls back to
    /// `bbox` when one is given; otherwise the parse error is returned.
    pub fn from_inputs(geometry: Option<&str>, bbox: Option<&str>) -> Result<Self> {
        let parsed = geometry.map(parse_geometry);
        match (parsed, bbox) {
            (Some(Ok(polygon)), _) => Ok(AreaOfInterest::Polygon(polygon)),
            (Some(Err(e)), Some(b)) => {
                warn!("Ignoring unusable geometry ({}); using bbox {}", e, b);
                Ok(AreaOfInterest::BoundingBox(b.parse()?))
            }
            (Some(Err(e)), None) => Err(e),
            (None, Some(b)) => Ok(AreaOfInterest::BoundingBox(b.parse()?)),
            (None, None) => Err(Error::InvalidGeometry("no geometry or bbox given".to_string())),
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        match self {
            AreaOfInterest::BoundingBox(b) => *b,
            AreaOfInterest::Polygon(p) => p.bbox(),
        }
    }

    pub fn polygon(&self) -> Option<&GeometryPolygon> {
        match self {
            AreaOfInterest::BoundingBox(_) => None,
            AreaOfInterest::Polygon(p) => Some(p),
        }
    }

    /// The polygon, or the box as a polygon.
    pub fn outline(&self) -> GeometryPolygon {
        match self {
            AreaOfInterest::BoundingBox(b) => b.to_polygon(),
            AreaOfInterest::Polygon(p) => p.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisRequest {
    pub area: AreaOfInterest,
    pub target_date: NaiveDate,
    pub index: String,
}

/// Everything one successful run produced. Exports borrow it immutably, so a
/// failed export leaves the result intact.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    pub scene: SceneCandidate,
    pub index: &'static IndexDefinition,
    pub target_date: NaiveDate,
    pub area_of_interest: AreaOfInterest,
    pub vi: ViRaster,
    /// Fetched bands as clipped digital numbers, unmasked
    pub bands: BTreeMap<BandId, RasterBand>,
    pub area: AreaReport,
    pub statistics: ViStatistics,
    pub reflectance_scale: f32,
}

/// Result of [`Pipeline::run`]. The non-completed variants are expected
/// outcomes, not faults.
#[derive(Debug)]
pub enum AnalysisOutcome {
    Completed(Box<AnalysisResult>),
    NoSceneFound { target_date: NaiveDate, lookback_days: u32 },
    MissingBandData { index: &'static str, band: BandId },
}

#[derive(Clone, Debug, Serialize)]
pub struct SceneSummary {
    pub id: String,
    pub acquired: DateTime<Utc>,
    pub cloud_cover: f64,
}

/// JSON-friendly digest of an [`AnalysisResult`].
#[derive(Clone, Debug, Serialize)]
pub struct AnalysisSummary {
    pub index: &'static str,
    pub index_name: &'static str,
    pub formula: &'static str,
    pub target_date: NaiveDate,
    pub scene: SceneSummary,
    pub bbox: BoundingBox,
    pub width: usize,
    pub height: usize,
    pub crs: String,
    pub bands: Vec<BandId>,
    pub area: AreaReport,
    pub statistics: ViStatistics,
}

impl AnalysisResult {
    pub fn summary(&self) -> AnalysisSummary {
        let (width, height) = self.vi.shape();
        AnalysisSummary {
            index: self.index.id,
            index_name: self.index.name,
            formula: self.index.formula_text,
            target_date: self.target_date,
            scene: SceneSummary {
                id: self.scene.id.clone(),
                acquired: self.scene.acquired,
                cloud_cover: self.scene.cloud_cover,
            },
            bbox: self.area_of_interest.bbox(),
            width,
            height,
            crs: self.vi.geo.projection.clone(),
            bands: self.bands.keys().copied().collect(),
            area: self.area,
            statistics: self.statistics,
        }
    }

    /// Single-band float32 GeoTIFF of the index values.
    pub fn vi_geotiff(&self) -> std::result::Result<Vec<u8>, ExportError> {
        encode_geotiff(&[GeoGrid { name: self.index.id, data: &self.vi.data, geo: &self.vi.geo }])
    }

    /// Export values of one fetched band, masked to the polygon: reflectance
    /// for spectral bands, class codes for the scene classification layer.
    pub fn band_values(&self, band: BandId) -> Option<Result<Vec<f32>>> {
        let raster = self.bands.get(&band)?;
        let mut values = if band == BandId::Scl {
            raster
                .data
                .iter()
                .map(|&dn| match raster.nodata {
                    Some(nd) if f64::from(dn) == nd => f32::NAN,
                    _ => f32::from(dn),
                })
                .collect()
        } else {
            to_reflectance(raster, self.reflectance_scale)
        };
        if let Some(polygon) = self.area_of_interest.polygon() {
            match mask_for_grid(&raster.geo, polygon) {
                Ok(mask) => apply_mask(&mut values, &mask),
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(values))
    }

    /// Multi-band GeoTIFF of the index's input bands as masked reflectance.
    pub fn bands_geotiff(&self) -> Result<Vec<u8>> {
        self.geotiff_of(self.index.bands)
    }

    /// GeoTIFF of any set of fetched bands; they must share one grid.
    pub fn geotiff_of(&self, bands: &[BandId]) -> Result<Vec<u8>> {
        let mut layers = Vec::with_capacity(bands.len());
        for &band in bands {
            let Some(values) = self.band_values(band) else {
                return Err(Error::MissingBandData { index: self.index.id, band });
            };
            layers.push((band, values?));
        }
        let grids: Vec<GeoGrid> = layers
            .iter()
            .map(|(band, values)| GeoGrid {
                name: band.as_str(),
                data: values,
                geo: &self.bands[band].geo,
            })
            .collect();
        Ok(encode_geotiff(&grids)?)
    }

    /// RGBA rendering with the index's display range.
    pub fn colorized(&self) -> Option<Vec<u8>> {
        let range = display_range(self.index, &self.statistics)?;
        Some(colorize(&self.vi.data, range))
    }

    pub fn png(&self) -> std::result::Result<Vec<u8>, ExportError> {
        let rgba = self.colorized().ok_or(ExportError::NoValidPixels)?;
        let (width, height) = self.vi.shape();
        encode_png(&rgba, width, height)
    }

    pub fn kml(&self) -> std::result::Result<String, ExportError> {
        let description = format!(
            "{} on {} from scene {} ({:.1}% cloud)",
            self.index.id,
            self.scene.acquired.format("%Y-%m-%d"),
            self.scene.id,
            self.scene.cloud_cover
        );
        kml::encode_kml(&self.area_of_interest.outline(), "Area of Interest", &description)
    }

    pub fn shapefile_zip(&self) -> std::result::Result<Vec<u8>, ExportError> {
        shapefile::encode_shapefile(&self.area_of_interest.outline(), "Area of Interest")
    }
}

/// Runs analyses against a catalog and an asset store.
pub struct Pipeline {
    catalog: Box<dyn ImageryCatalog>,
    store: Box<dyn RasterAssetStore>,
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(catalog: Box<dyn ImageryCatalog>, store: Box<dyn RasterAssetStore>, config: AnalysisConfig) -> Self {
        Self { catalog, store, config }
    }

    /// STAC catalog and GDAL store as configured.
    pub fn from_config(config: AnalysisConfig) -> Result<Self> {
        let catalog = StacCatalog::new(config.catalog.clone())?;
        Ok(Self::new(Box::new(catalog), Box::new(GdalAssetStore::new()), config))
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome> {
        let def = lookup(&request.index)?;
        let bbox = request.area.bbox();
        info!("Running {} for {} over {}", def.id, request.target_date, bbox);

        let params = SelectionParams {
            target_date: request.target_date,
            max_cloud_cover: self.config.max_cloud_cover,
            lookback_days: self.config.lookback_days,
        };
        let scene = match select_scene(self.catalog.as_ref(), &bbox, &params)? {
            SceneSelection::Selected(scene) => scene,
            SceneSelection::NoneFound => {
                return Ok(AnalysisOutcome::NoSceneFound {
                    target_date: request.target_date,
                    lookback_days: self.config.lookback_days,
                })
            }
        };

        let mut wanted: Vec<BandId> = def.bands.to_vec();
        wanted.extend(self.config.auxiliary_bands.iter().copied());
        let options = FetchOptions { parallel: self.config.parallel_fetch, io_threads: self.config.io_threads };
        let bands = retrieve_bands(self.store.as_ref(), &scene, &wanted, &bbox, options)?;

        let epsilon = self.config.epsilon.unwrap_or(def.epsilon);
        let vi = match evaluate(def, &bands, epsilon, self.config.reflectance_scale) {
            Ok(vi) => vi,
            Err(Error::MissingBandData { index, band }) => {
                warn!("Scene {} lacks band {} required by {}", scene.id, band, index);
                return Ok(AnalysisOutcome::MissingBandData { index, band });
            }
            Err(e) => return Err(e),
        };

        let vi = mask_raster(vi, request.area.polygon())?;
        let area = geodesic_area(&request.area.outline());
        let statistics = ViStatistics::compute(&vi.data);
        if !statistics.has_valid_pixels() {
            warn!("{} has no valid pixels inside the area of interest", def.id);
        }
        info!(
            "{}: {} valid of {} pixels, mean {:?}",
            def.id, statistics.valid_pixels, statistics.total_pixels, statistics.mean
        );

        Ok(AnalysisOutcome::Completed(Box::new(AnalysisResult {
            scene,
            index: def,
            target_date: request.target_date,
            area_of_interest: request.area.clone(),
            vi,
            bands,
            area,
            statistics,
            reflectance_scale: self.config.reflectance_scale,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = "POLYGON ((100.5 13.7, 100.6 13.7, 100.6 13.8, 100.5 13.7))";

    #[test]
    fn geometry_wins_over_bbox() {
        let area = AreaOfInterest::from_inputs(Some(TRIANGLE), Some("100,13,101,14")).unwrap();
        assert!(matches!(area, AreaOfInterest::Polygon(_)));
        assert_eq!(area.bbox(), BoundingBox::new(100.5, 13.7, 100.6, 13.8).unwrap());
    }

    #[test]
    fn broken_geometry_falls_back_to_bbox() {
        let area = AreaOfInterest::from_inputs(Some("POLYGON ((100.5 13.7,"), Some("100,13,101,14")).unwrap();
        assert_eq!(area, AreaOfInterest::BoundingBox(BoundingBox::new(100.0, 13.0, 101.0, 14.0).unwrap()));
    }

    #[test]
    fn broken_geometry_alone_is_an_error() {
        let err = AreaOfInterest::from_inputs(Some("not a geometry"), None).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry(_)));
        assert!(AreaOfInterest::from_inputs(None, None).is_err());
        assert!(AreaOfInterest::from_inputs(None, Some("101,13,100,14")).is_err());
    }
}
