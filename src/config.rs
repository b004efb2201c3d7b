// src/config.rs
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::processing::indices::BandId;

/// Per-run analysis parameters.
///
/// Every field has a serde default, so `{}` is a complete configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Strict upper bound on scene cloud cover, percent
    #[serde(default = "default_max_cloud_cover")]
    pub max_cloud_cover: f64,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Overrides the index's own stabilization constant
    #[serde(default)]
    pub epsilon: Option<f32>,
    /// Divisor turning digital numbers into reflectance
    #[serde(default = "default_reflectance_scale")]
    pub reflectance_scale: f32,
    /// Extra bands fetched alongside the index's own (e.g. `SCL`)
    #[serde(default)]
    pub auxiliary_bands: Vec<BandId>,
    #[serde(default = "default_true")]
    pub parallel_fetch: bool,
    #[serde(default = "default_io_threads")]
    pub io_threads: usize,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Append a Planetary Computer SAS token to asset hrefs
    #[serde(default = "default_true")]
    pub sign_assets: bool,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_cloud_cover() -> f64 {
    15.0
}

fn default_lookback_days() -> u32 {
    150
}

fn default_reflectance_scale() -> f32 {
    10000.0
}

fn default_true() -> bool {
    true
}

fn default_io_threads() -> usize {
    num_cpus::get()
}

fn default_catalog_url() -> String {
    "https://planetarycomputer.microsoft.com/api/stac/v1".to_string()
}

fn default_collection() -> String {
    "sentinel-2-l2a".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_max_items() -> usize {
    500
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_cloud_cover: default_max_cloud_cover(),
            lookback_days: default_lookback_days(),
            epsilon: None,
            reflectance_scale: default_reflectance_scale(),
            auxiliary_bands: Vec::new(),
            parallel_fetch: true,
            io_threads: default_io_threads(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            collection: default_collection(),
            sign_assets: true,
            page_size: default_page_size(),
            max_items: default_max_items(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
