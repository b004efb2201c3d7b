// src/output.rs
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::pipeline::AnalysisResult;

/// Which optional artifacts to write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputOptions {
    pub bands: bool,
    pub png: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self { bands: true, png: true }
    }
}

/// Files written, and exports that failed with their error message.
#[derive(Debug, Default)]
pub struct OutputReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(String, String)>,
}

impl OutputReport {
    fn record<E: std::fmt::Display>(&mut self, dir: &Path, file: String, bytes: std::result::Result<Vec<u8>, E>) -> Result<()> {
        match bytes {
            Ok(bytes) => {
                let path = dir.join(&file);
                fs::write(&path, bytes)?;
                info!("Wrote {}", path.display());
                self.written.push(path);
            }
            Err(e) => {
                warn!("Skipping {}: {}", file, e);
                self.failed.push((file, e.to_string()));
            }
        }
        Ok(())
    }
}

/// Write every artifact of `result` into `dir`.
///
/// A failing export is reported and skipped; only filesystem errors abort.
pub fn write_outputs(result: &AnalysisResult, dir: &Path, options: OutputOptions) -> Result<OutputReport> {
    fs::create_dir_all(dir)?;
    let index = result.index.id;
    let date = result.scene.acquired.format("%Y-%m-%d").to_string();
    let mut report = OutputReport::default();

    report.record(dir, format!("{}_{}.tif", index, date), result.vi_geotiff())?;
    if options.png {
        report.record(dir, format!("{}_{}.png", index, date), result.png())?;
    }
    if options.bands {
        report.record(dir, format!("{}_bands_{}.tif", index, date), result.bands_geotiff())?;
        for band in result.bands.keys().filter(|b| !result.index.requires(**b)) {
            report.record(dir, format!("{}_{}.tif", band, date), result.geotiff_of(&[*band]))?;
        }
    }
    report.record(dir, "aoi.kml".to_string(), result.kml().map(String::into_bytes))?;
    report.record(dir, "aoi_shp.zip".to_string(), result.shapefile_zip())?;

    let summary = serde_json::to_vec_pretty(&result.summary())?;
    let path = dir.join("summary.json");
    fs::write(&path, summary)?;
    report.written.push(path);
    Ok(report)
}
