// src/main.rs
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vi_calc::batch::process_batch;
use vi_calc::cli::{Cli, Commands};
use vi_calc::geometry::parse_geometry;
use vi_calc::processing::indices::index_catalog;
use vi_calc::{
    geodesic_area, write_outputs, AnalysisConfig, AnalysisOutcome, AnalysisRequest, AreaOfInterest, OutputOptions,
    Pipeline,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    match cli.command {
        Commands::Analyze {
            geometry,
            bbox,
            date,
            index,
            output_dir,
            no_bands,
            no_png,
            max_cloud_cover,
            lookback_days,
        } => {
            if let Some(cloud) = max_cloud_cover {
                config.max_cloud_cover = cloud;
            }
            if let Some(days) = lookback_days {
                config.lookback_days = days;
            }
            let geometry = geometry.as_deref().map(read_geometry_arg).transpose()?;
            let area = AreaOfInterest::from_inputs(geometry.as_deref(), bbox.as_deref())?;
            let request = AnalysisRequest { area, target_date: date, index };
            let options = OutputOptions { bands: !no_bands, png: !no_png };
            analyze(config, &request, output_dir, options)?;
        }
        Commands::Area { geometry } => {
            let polygon = parse_geometry(&read_geometry_arg(&geometry)?)?;
            let report = geodesic_area(&polygon);
            for (unit, value) in report.units() {
                println!("{:>12.2} {}", value, unit);
            }
        }
        Commands::Indices { json } => {
            let catalog = index_catalog();
            if json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                for info in &catalog {
                    println!("{}\n", info);
                }
            }
        }
        Commands::Batch { file } => process_batch(&file)?,
    }

    Ok(())
}

fn analyze(config: AnalysisConfig, request: &AnalysisRequest, output_dir: PathBuf, options: OutputOptions) -> Result<()> {
    let lookback = config.lookback_days;
    let pipeline = Pipeline::from_config(config)?;
    match pipeline.run(request)? {
        AnalysisOutcome::Completed(result) => {
            let report = write_outputs(&result, &output_dir, options)?;
            let summary = result.summary();
            println!(
                "{} from {} ({}, {:.1}% cloud)",
                summary.index,
                summary.scene.id,
                summary.scene.acquired.format("%Y-%m-%d"),
                summary.scene.cloud_cover
            );
            match summary.statistics.mean {
                Some(mean) => println!(
                    "mean {:.4}, {} valid of {} pixels",
                    mean, summary.statistics.valid_pixels, summary.statistics.total_pixels
                ),
                None => println!("no valid pixels inside the area of interest"),
            }
            println!("area {:.2} ha ({:.2} rai)", summary.area.hectare, summary.area.rai);
            for (file, reason) in &report.failed {
                println!("not written: {} ({})", file, reason);
            }
            println!("Processing complete: {}", output_dir.display());
        }
        AnalysisOutcome::NoSceneFound { target_date, .. } => {
            println!("No scene found within {} days before {}", lookback, target_date);
        }
        AnalysisOutcome::MissingBandData { index, band } => {
            println!("Scene lacks band {} required by {}", band, index);
        }
    }
    Ok(())
}

/// `@path` reads the geometry from a file, anything else is the geometry.
fn read_geometry_arg(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading geometry from {}", path)),
        None => Ok(arg.to_string()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
