//! Crate-level error types.
//!
//! `Error` covers scene search, band retrieval and index evaluation. Export
//! encoders return the narrower `ExportError` so a failed download never
//! poisons an analysis that already completed.
use thiserror::Error;

use crate::processing::indices::BandId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Unknown vegetation index: {0}")]
    UnknownIndex(String),

    #[error("Missing band {band} required by {index}")]
    MissingBandData { index: &'static str, band: BandId },

    #[error(
        "Band {band} for {index} is {found_width}x{found_height}, expected {expected_width}x{expected_height} (bands are not resampled)"
    )]
    BandShapeMismatch {
        index: &'static str,
        band: BandId,
        expected_width: usize,
        expected_height: usize,
        found_width: usize,
        found_height: usize,
    },

    /// `locator` has its query string (access token) removed
    #[error("Area of interest does not intersect band {band} ({locator})")]
    WindowOutsideRaster { band: BandId, locator: String },

    #[error("Failed to read band {band} from {locator}: {reason}")]
    BandRead { band: BandId, locator: String, reason: String },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

/// Failures of a single export action.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Nothing to export: no bands supplied")]
    NoBands,

    #[error("Band {band} is {found_width}x{found_height}, expected {expected_width}x{expected_height}")]
    ShapeMismatch {
        band: String,
        expected_width: usize,
        expected_height: usize,
        found_width: usize,
        found_height: usize,
    },

    #[error("Polygon has fewer than three distinct vertices")]
    EmptyGeometry,

    #[error("Raster has no valid pixels to render")]
    NoValidPixels,

    #[error("Shapefile component .{0} was not produced")]
    MissingShapefilePart(&'static str),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
