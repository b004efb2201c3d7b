// src/catalog/mod.rs
//! Imagery catalog access and scene selection.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::BoundingBox;
use crate::processing::indices::BandId;

pub mod selector;
pub mod stac;

pub use selector::{closest_candidate, select_scene, SceneSelection, SelectionParams};
pub use stac::StacCatalog;

/// One acquisition returned by a catalog search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneCandidate {
    pub id: String,
    pub acquired: DateTime<Utc>,
    /// Percent, 0-100
    pub cloud_cover: f64,
    /// Band → asset locator (URL or local path)
    pub assets: BTreeMap<BandId, String>,
    pub footprint: Option<BoundingBox>,
}

impl SceneCandidate {
    pub fn asset(&self, band: BandId) -> Option<&str> {
        self.assets.get(&band).map(String::as_str)
    }
}

/// Search window and filters handed to an [`ImageryCatalog`].
#[derive(Clone, Debug, PartialEq)]
pub struct SceneQuery {
    pub bbox: BoundingBox,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Strict upper bound on cloud cover, percent
    pub max_cloud_cover: f64,
}

impl SceneQuery {
    /// `start/end` interval in the STAC `datetime` syntax.
    pub fn datetime_interval(&self) -> String {
        format!(
            "{}/{}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// Source of scene candidates.
pub trait ImageryCatalog {
    fn search(&self, query: &SceneQuery) -> Result<Vec<SceneCandidate>>;
}
