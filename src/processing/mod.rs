// src/processing/mod.rs
pub mod evaluator;
pub mod indices;
pub mod mask;
pub mod render;
pub mod stats;

// Re-export main components
pub use evaluator::{evaluate, to_reflectance, ViRaster};
pub use indices::{lookup, BandId, IndexDefinition, INDICES};
pub use mask::mask_raster;
pub use stats::ViStatistics;
