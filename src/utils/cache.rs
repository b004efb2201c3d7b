// src/utils/cache.rs
use std::collections::HashMap;
use std::sync::Arc;

use gdal::Dataset;
use parking_lot::Mutex;

use super::gdal_ext::gdal_path;

/// Thread-safe cache of open GDAL datasets keyed by asset locator.
///
/// A handle stays open across the describe and read calls of one band.
#[derive(Default)]
pub struct RasterCache {
    datasets: Mutex<HashMap<String, Arc<Mutex<Dataset>>>>,
}

impl RasterCache {
    pub fn get_dataset(&self, locator: &str) -> gdal::errors::Result<Arc<Mutex<Dataset>>> {
        if let Some(dataset) = self.datasets.lock().get(locator) {
            return Ok(Arc::clone(dataset));
        }

        // Opened without holding the map lock; a racing open of the same
        // locator just loses the insert below.
        let dataset = Arc::new(Mutex::new(Dataset::open(gdal_path(locator))?));
        let mut cache = self.datasets.lock();
        let entry = cache
            .entry(locator.to_string())
            .or_insert_with(|| Arc::clone(&dataset));
        Ok(Arc::clone(entry))
    }
}
