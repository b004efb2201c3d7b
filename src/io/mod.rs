// src/io/mod.rs
pub mod kml;
pub mod reader;
pub mod shapefile;
pub mod writer;

pub use kml::{encode_kml, parse_kml};
pub use reader::{retrieve_bands, GdalAssetStore, GeoInfo, PixelWindow, RasterAssetStore, RasterBand};
pub use shapefile::encode_shapefile;
pub use writer::{decode_geotiff, encode_geotiff, encode_png, GeoGrid};
