// src/lib.rs
pub mod area;
pub mod batch;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod output;
pub mod pipeline;
pub mod processing;
pub mod utils;

pub use area::{geodesic_area, AreaReport};
pub use config::AnalysisConfig;
pub use error::{Error, ExportError, Result};
pub use geometry::{parse_geometry, BoundingBox, GeometryPolygon};
pub use output::{write_outputs, OutputOptions};
pub use pipeline::{AnalysisOutcome, AnalysisRequest, AnalysisResult, AreaOfInterest, Pipeline};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
