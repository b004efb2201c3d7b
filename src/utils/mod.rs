// src/utils/mod.rs
pub mod cache;
pub mod gdal_ext;

pub use cache::RasterCache;
