// src/io/reader.rs
use std::collections::BTreeMap;

use gdal::Dataset;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::SceneCandidate;
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::processing::indices::BandId;
use crate::utils::cache::RasterCache;
use crate::utils::gdal_ext::{self, WGS84};

/// Grid georeferencing: CRS definition, GDAL affine transform and size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub projection: String,
    pub geo_transform: [f64; 6],
    pub width: usize,
    pub height: usize,
}

impl GeoInfo {
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Map coordinates of the centre of pixel (`col`, `row`).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let gt = &self.geo_transform;
        let (c, r) = (col as f64 + 0.5, row as f64 + 0.5);
        (gt[0] + c * gt[1] + r * gt[2], gt[3] + c * gt[4] + r * gt[5])
    }

    /// Fractional pixel coordinates of map point (`x`, `y`).
    pub fn to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let gt = &self.geo_transform;
        let det = gt[1] * gt[5] - gt[2] * gt[4];
        if det.abs() < f64::EPSILON {
            return None;
        }
        let (dx, dy) = (x - gt[0], y - gt[3]);
        Some(((dx * gt[5] - dy * gt[2]) / det, (dy * gt[1] - dx * gt[4]) / det))
    }

    /// `[min_x, min_y, max_x, max_y]` of the grid in map units.
    pub fn bounds(&self) -> [f64; 4] {
        let gt = &self.geo_transform;
        let corners = [(0.0, 0.0), (self.width as f64, 0.0), (0.0, self.height as f64), (self.width as f64, self.height as f64)];
        corners.iter().fold(
            [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
            |[a, b, c, d], &(col, row)| {
                let x = gt[0] + col * gt[1] + row * gt[2];
                let y = gt[3] + col * gt[4] + row * gt[5];
                [a.min(x), b.min(y), c.max(x), d.max(y)]
            },
        )
    }

    /// Georeferencing of a sub-window of this grid.
    pub fn window(&self, window: &PixelWindow) -> GeoInfo {
        let gt = &self.geo_transform;
        let (c, r) = (window.x as f64, window.y as f64);
        let mut geo_transform = *gt;
        geo_transform[0] = gt[0] + c * gt[1] + r * gt[2];
        geo_transform[3] = gt[3] + c * gt[4] + r * gt[5];
        GeoInfo {
            projection: self.projection.clone(),
            geo_transform,
            width: window.width,
            height: window.height,
        }
    }
}

/// Pixel offset and size of a read window.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelWindow {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// One band clipped to the area of interest, as raw digital numbers.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterBand {
    pub band: BandId,
    pub data: Vec<u16>,
    pub geo: GeoInfo,
    pub nodata: Option<f64>,
}

impl RasterBand {
    pub fn shape(&self) -> (usize, usize) {
        self.geo.shape()
    }
}

/// Header of a raster asset.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetInfo {
    pub geo: GeoInfo,
    pub nodata: Option<f64>,
}

/// Random access to single-band raster assets addressed by locator.
pub trait RasterAssetStore: Send + Sync {
    fn describe(&self, locator: &str) -> Result<AssetInfo>;
    fn read_window(&self, locator: &str, window: PixelWindow) -> Result<Vec<u16>>;
}

/// GDAL-backed store. Remote locators are read through `/vsicurl/`, so only
/// the tiles covering the window are fetched from cloud-optimized GeoTIFFs.
#[derive(Default)]
pub struct GdalAssetStore {
    cache: RasterCache,
}

impl GdalAssetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn describe_dataset(ds: &Dataset) -> Result<AssetInfo> {
    let (width, height) = ds.raster_size();
    let band = ds.rasterband(1)?;
    Ok(AssetInfo {
        geo: GeoInfo {
            projection: ds.projection(),
            geo_transform: ds.geo_transform()?,
            width,
            height,
        },
        nodata: band.no_data_value(),
    })
}

impl RasterAssetStore for GdalAssetStore {
    fn describe(&self, locator: &str) -> Result<AssetInfo> {
        let dataset = self.cache.get_dataset(locator)?;
        let ds = dataset.lock();
        describe_dataset(&ds)
    }

    fn read_window(&self, locator: &str, window: PixelWindow) -> Result<Vec<u16>> {
        let dataset = self.cache.get_dataset(locator)?;
        let ds = dataset.lock();
        let band = ds.rasterband(1)?;
        let size = (window.width, window.height);
        let buffer = band.read_as::<u16>((window.x as isize, window.y as isize), size, size, None)?;
        Ok(buffer.data().to_vec())
    }
}

/// Smallest pixel window covering `bounds` (map units), clamped to the grid.
///
/// Returns `None` when the bounds miss the grid entirely.
pub fn pixel_window(geo: &GeoInfo, bounds: [f64; 4]) -> Option<PixelWindow> {
    let [min_x, min_y, max_x, max_y] = bounds;
    let corners = [(min_x, min_y), (max_x, min_y), (min_x, max_y), (max_x, max_y)];
    let mut cols = (f64::INFINITY, f64::NEG_INFINITY);
    let mut rows = (f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let (c, r) = geo.to_pixel(x, y)?;
        cols = (cols.0.min(c), cols.1.max(c));
        rows = (rows.0.min(r), rows.1.max(r));
    }
    if !(cols.0.is_finite() && cols.1.is_finite() && rows.0.is_finite() && rows.1.is_finite()) {
        return None;
    }

    let clamp = |v: f64, limit: usize| v.max(0.0).min(limit as f64) as usize;
    let x0 = clamp(cols.0.floor(), geo.width);
    let x1 = clamp(cols.1.ceil(), geo.width);
    let y0 = clamp(rows.0.floor(), geo.height);
    let y1 = clamp(rows.1.ceil(), geo.height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(PixelWindow { x: x0, y: y0, width: x1 - x0, height: y1 - y0 })
}

/// Read `band` from `locator`, clipped to the WGS84 `bbox`.
///
/// Failures name the band and the locator, minus any access token.
pub fn clip_band(
    store: &dyn RasterAssetStore,
    band: BandId,
    locator: &str,
    bbox: &BoundingBox,
) -> Result<RasterBand> {
    let public = gdal_ext::redact_locator(locator);
    let read_error = |e: Error| Error::BandRead {
        band,
        locator: public.to_string(),
        reason: e.to_string().replace(locator, public),
    };

    let info = store.describe(locator).map_err(read_error)?;
    let crs = if info.geo.projection.trim().is_empty() {
        warn!("Asset for {} has no CRS; assuming {}", band, WGS84);
        WGS84.to_string()
    } else {
        info.geo.projection.clone()
    };

    // 21 samples per edge keeps UTM envelopes tight for small AOIs
    let native_bounds =
        gdal_ext::transform_bounds(WGS84, &crs, bbox.to_array(), 21).map_err(|e| read_error(e.into()))?;
    let window = pixel_window(&info.geo, native_bounds).ok_or_else(|| Error::WindowOutsideRaster {
        band,
        locator: public.to_string(),
    })?;
    debug!("{}: window {:?} of {}x{}", band, window, info.geo.width, info.geo.height);

    let data = store.read_window(locator, window).map_err(read_error)?;
    let mut geo = info.geo.window(&window);
    geo.projection = crs;
    Ok(RasterBand { band, data, geo, nodata: info.nodata })
}

/// How band reads are scheduled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    pub parallel: bool,
    pub io_threads: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { parallel: true, io_threads: num_cpus::get() }
    }
}

/// Fetch the requested bands of `scene`, clipped to `bbox`.
///
/// Bands the scene has no asset for are left out of the map; deciding whether
/// that is fatal belongs to the evaluator. Any read failure aborts the fetch.
pub fn retrieve_bands(
    store: &dyn RasterAssetStore,
    scene: &SceneCandidate,
    bands: &[BandId],
    bbox: &BoundingBox,
    options: FetchOptions,
) -> Result<BTreeMap<BandId, RasterBand>> {
    let mut requested: Vec<BandId> = bands.to_vec();
    requested.sort();
    requested.dedup();

    let available: Vec<(BandId, &str)> = requested
        .iter()
        .filter_map(|&band| match scene.asset(band) {
            Some(locator) => Some((band, locator)),
            None => {
                debug!("Scene {} has no asset for {}", scene.id, band);
                None
            }
        })
        .collect();

    info!("Fetching {} band(s) from scene {}", available.len(), scene.id);

    let fetch = |&(band, locator): &(BandId, &str)| clip_band(store, band, locator, bbox);
    let fetched: Vec<RasterBand> = if options.parallel && available.len() > 1 {
        let threads = options.io_threads.max(1).min(available.len());
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(|| available.par_iter().map(fetch).collect::<Result<_>>())?,
            Err(e) => {
                warn!("Falling back to sequential band reads: {}", e);
                available.iter().map(fetch).collect::<Result<_>>()?
            }
        }
    } else {
        available.iter().map(fetch).collect::<Result<_>>()?
    };

    Ok(fetched.into_iter().map(|b| (b.band, b)).collect())
}
