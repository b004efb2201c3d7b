// src/processing/stats.rs
use itertools::{Itertools, MinMaxResult};
use rayon::prelude::*;
use serde::Serialize;

/// Summary of the finite samples of a raster.
///
/// `mean`, `min` and `max` are `None` when no sample is valid.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ViStatistics {
    pub mean: Option<f64>,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub valid_pixels: usize,
    pub total_pixels: usize,
}

impl ViStatistics {
    pub fn compute(data: &[f32]) -> Self {
        let (sum, valid_pixels) = data
            .par_iter()
            .filter(|v| v.is_finite())
            .map(|&v| (f64::from(v), 1usize))
            .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

        let (min, max) = match data.iter().copied().filter(|v| v.is_finite()).minmax() {
            MinMaxResult::NoElements => (None, None),
            MinMaxResult::OneElement(v) => (Some(v), Some(v)),
            MinMaxResult::MinMax(lo, hi) => (Some(lo), Some(hi)),
        };

        Self {
            mean: (valid_pixels > 0).then(|| sum / valid_pixels as f64),
            min,
            max,
            valid_pixels,
            total_pixels: data.len(),
        }
    }

    pub fn has_valid_pixels(&self) -> bool {
        self.valid_pixels > 0
    }
}
