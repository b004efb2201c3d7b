use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vi-calc")]
#[command(version, about = "Vegetation index calculator for Sentinel-2 scenes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON analysis configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Select a scene, compute an index and write the exports
    Analyze {
        /// Polygon as WKT, GeoJSON or KML; `@path` reads it from a file.
        /// With --bbox too, an unparseable polygon falls back to the box
        #[arg(short, long, required_unless_present = "bbox")]
        geometry: Option<String>,

        /// Bounding box: min_lon,min_lat,max_lon,max_lat
        #[arg(short, long, allow_hyphen_values = true)]
        bbox: Option<String>,

        /// Target date (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Index identifier, e.g. NDVI
        #[arg(short, long, default_value = "NDVI")]
        index: String,

        /// Output directory
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Skip the band GeoTIFFs
        #[arg(long)]
        no_bands: bool,

        /// Skip the colorized PNG
        #[arg(long)]
        no_png: bool,

        /// Maximum cloud cover, percent
        #[arg(long)]
        max_cloud_cover: Option<f64>,

        /// Days to search back from the target date
        #[arg(long)]
        lookback_days: Option<u32>,
    },

    /// Print the geodesic area of a polygon
    Area {
        /// Polygon as WKT, GeoJSON or KML; `@path` reads it from a file
        #[arg(short, long)]
        geometry: String,
    },

    /// List the available indices with their bands and keywords
    Indices {
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a JSON batch of analyses
    Batch {
        /// Batch file
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
}
