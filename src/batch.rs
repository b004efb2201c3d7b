// src/batch.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::AnalysisConfig;
use crate::output::{write_outputs, OutputOptions};
use crate::pipeline::{AnalysisOutcome, AnalysisRequest, AreaOfInterest, Pipeline};

#[derive(Deserialize, Serialize, Debug)]
pub struct BatchConfig {
    #[serde(default)]
    pub global: GlobalParams,
    pub operations: Vec<Operation>,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct GlobalParams {
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_true")]
    pub bands: bool,
    #[serde(default = "default_true")]
    pub png: bool,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self { index: default_index(), bands: true, png: true, analysis: AnalysisConfig::default() }
    }
}

fn default_index() -> String {
    "NDVI".to_string()
}

fn default_true() -> bool {
    true
}

/// One analysis. Unset fields fall back to [`GlobalParams`].
#[derive(Deserialize, Serialize, Debug)]
pub struct Operation {
    pub date: NaiveDate,
    pub output: PathBuf,
    /// WKT, GeoJSON or KML text
    pub geometry: Option<String>,
    /// `min_lon,min_lat,max_lon,max_lat`
    pub bbox: Option<String>,
    pub index: Option<String>,
    pub max_cloud_cover: Option<f64>,
    pub lookback_days: Option<u32>,
    pub bands: Option<bool>,
    pub png: Option<bool>,
}

/// An operation with every override applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOperation {
    pub request: AnalysisRequest,
    pub config: AnalysisConfig,
    pub output: PathBuf,
    pub options: OutputOptions,
}

impl BatchConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn resolve(&self, op: &Operation) -> Result<ResolvedOperation> {
        let area = AreaOfInterest::from_inputs(op.geometry.as_deref(), op.bbox.as_deref())
            .with_context(|| format!("operation for {} has no usable geometry or bbox", op.date))?;

        let mut config = self.global.analysis.clone();
        if let Some(cloud) = op.max_cloud_cover {
            config.max_cloud_cover = cloud;
        }
        if let Some(days) = op.lookback_days {
            config.lookback_days = days;
        }

        Ok(ResolvedOperation {
            request: AnalysisRequest {
                area,
                target_date: op.date,
                index: op.index.clone().unwrap_or_else(|| self.global.index.clone()),
            },
            config,
            output: op.output.clone(),
            options: OutputOptions {
                bands: op.bands.unwrap_or(self.global.bands),
                png: op.png.unwrap_or(self.global.png),
            },
        })
    }
}

/// Run every operation of a batch file. A failing operation is logged and
/// the rest still run; the call fails if any did.
pub fn process_batch(config_path: &Path) -> Result<()> {
    let config = BatchConfig::from_file(config_path)?;
    let total = config.operations.len();
    info!("Starting batch processing with {} operations", total);

    let mut failures = 0usize;
    for (i, op) in config.operations.iter().enumerate() {
        info!("[{}/{}] {} -> {}", i + 1, total, op.date, op.output.display());
        if let Err(e) = run_operation(&config, op) {
            error!("[{}/{}] failed: {:#}", i + 1, total, e);
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} batch operations failed", failures, total);
    }
    info!("Batch processing complete");
    Ok(())
}

fn run_operation(config: &BatchConfig, op: &Operation) -> Result<()> {
    let resolved = config.resolve(op)?;
    let pipeline = Pipeline::from_config(resolved.config)?;
    match pipeline.run(&resolved.request)? {
        AnalysisOutcome::Completed(result) => {
            let report = write_outputs(&result, &resolved.output, resolved.options)?;
            for (file, reason) in &report.failed {
                warn!("{} not written: {}", file, reason);
            }
        }
        AnalysisOutcome::NoSceneFound { target_date, lookback_days } => {
            warn!("No scene within {} days before {}", lookback_days, target_date);
        }
        AnalysisOutcome::MissingBandData { index, band } => {
            anyhow::bail!("scene is missing band {} required by {}", band, index);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r#"{
        "global": {"index": "EVI", "png": false, "analysis": {"max_cloud_cover": 20}},
        "operations": [
            {"date": "2024-06-01", "output": "out/a", "bbox": "100.5,13.7,100.6,13.8"},
            {"date": "2024-07-01", "output": "out/b", "index": "ndwi", "png": true, "lookback_days": 30,
             "geometry": "POLYGON ((100.5 13.7, 100.6 13.7, 100.6 13.8, 100.5 13.7))"},
            {"date": "2024-08-01", "output": "out/c", "geometry": "not a geometry"},
            {"date": "2024-09-01", "output": "out/d", "geometry": "POLYGON ((100.5 13.7,", "bbox": "100.5,13.7,100.6,13.8"}
        ]
    }"#;

    #[test]
    fn operations_inherit_and_override_globals() {
        let config: BatchConfig = serde_json::from_str(BATCH).unwrap();
        let a = config.resolve(&config.operations[0]).unwrap();
        assert_eq!(a.request.index, "EVI");
        assert_eq!(a.config.max_cloud_cover, 20.0);
        assert_eq!(a.config.lookback_days, 150);
        assert!(!a.options.png && a.options.bands);
        assert!(matches!(a.request.area, AreaOfInterest::BoundingBox(_)));

        let b = config.resolve(&config.operations[1]).unwrap();
        assert_eq!(b.request.index, "ndwi");
        assert_eq!(b.config.lookback_days, 30);
        assert!(b.options.png);
        assert!(matches!(b.request.area, AreaOfInterest::Polygon(_)));
    }

    #[test]
    fn unusable_geometry_without_bbox_fails() {
        let config: BatchConfig = serde_json::from_str(BATCH).unwrap();
        assert!(config.resolve(&config.operations[2]).is_err());
    }

    #[test]
    fn broken_geometry_with_bbox_uses_the_bbox() {
        let config: BatchConfig = serde_json::from_str(BATCH).unwrap();
        let d = config.resolve(&config.operations[3]).unwrap();
        assert!(matches!(d.request.area, AreaOfInterest::BoundingBox(_)));
    }
}
