//! basinscope CLI - region-scoped remote-sensing index analysis

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use basinscope_cloud::{FeatureSource, GeoJsonFeatureService, StacArchive, StacCatalog, StacClientOptions};
use basinscope_core::io::read_geotiff;
use basinscope_core::Raster;
use basinscope_pipeline::{
    publish, region_for, AnalysisReport, DirectorySink, Pipeline, PipelineConfig, PRESETS,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "basinscope")]
#[command(author, version, about = "Region-scoped remote-sensing index analysis", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline and write layers, charts and exports to a directory
    Run {
        #[command(flatten)]
        source: ConfigSource,
        #[command(flatten)]
        remote: RemoteArgs,
        /// Output directory
        #[arg(short, long, default_value = "basinscope-out")]
        out: PathBuf,
    },
    /// Build the analysis region only and report its size
    Region {
        #[command(flatten)]
        source: ConfigSource,
        /// Watershed GeoJSON file or URL
        #[arg(long)]
        watersheds: String,
    },
    /// Print a built-in configuration as JSON, or list them
    Preset {
        /// Preset name; lists the presets when absent
        name: Option<String>,
    },
    /// Show information about a GeoTIFF layer
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

/// Where the pipeline configuration comes from
#[derive(Args)]
#[group(required = true, multiple = false)]
struct ConfigSource {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Built-in preset: burn, ndsi, ndvi-change
    #[arg(short, long)]
    preset: Option<String>,
}

/// Remote archive and boundary service
#[derive(Args)]
struct RemoteArgs {
    /// STAC catalog: pc, es, or an API root URL
    #[arg(long, default_value = "pc")]
    catalog: String,
    /// Watershed GeoJSON file or URL
    #[arg(long)]
    watersheds: String,
    /// Maximum STAC items per window
    #[arg(long, default_value_t = 100)]
    max_items: usize,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid spinner template")?,
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn load_config(source: &ConfigSource) -> Result<PipelineConfig> {
    match (&source.config, &source.preset) {
        (Some(path), _) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        (None, Some(name)) => PipelineConfig::preset(name).context("Unknown preset"),
        (None, None) => anyhow::bail!("Either --config or --preset is required"),
    }
}

fn feature_service(config: &PipelineConfig, watersheds: &str) -> Result<GeoJsonFeatureService> {
    let service = GeoJsonFeatureService::new().context("Failed to start feature service")?;
    Ok(service.with_source(
        config.region.watershed.collection.clone(),
        FeatureSource::parse(watersheds),
    ))
}

fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "no data".to_string(), |v| format!("{:.4}", v))
}

fn print_report(report: &AnalysisReport) {
    let (rows, cols) = report.grid.shape();
    println!("Pipeline: {}", report.name);
    println!(
        "Region: {:.2} km² in EPSG:{} ({} x {} grid)",
        report.region.area_km2(),
        report.region.epsg(),
        cols,
        rows
    );
    for w in &report.windows {
        println!(
            "  {} [{}]: {} scenes, {} valid pixels",
            w.label,
            w.dates,
            w.composite.scene_count,
            w.composite.valid_count()
        );
        if let Some(s) = &w.summary {
            println!("    mean {}: {}", s.band, fmt_value(s.mean));
            if let Some(t) = s.threshold {
                println!("    % of region > {}: {}", t, fmt_value(s.percent_above_threshold));
            }
        }
        if let Some(ts) = &w.time_series {
            println!("    time series: {} scenes, {} observed", ts.len(), ts.observed().count());
        }
    }
    for c in &report.changes {
        println!("  {}: mean {}", c.label, fmt_value(c.summary.mean));
    }
}

fn print_info(input: &Path, raster: &Raster<f64>) {
    let (rows, cols) = raster.shape();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Cell size: {}", raster.cell_size());
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(epsg) = raster.epsg() {
        println!("CRS: EPSG:{}", epsg);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!("  Valid cells: {}", stats.valid_count);
    println!("  No-data cells: {}", stats.nodata_count);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run { source, remote, out } => {
            let config = load_config(&source)?;
            let pipeline = Pipeline::new(config).context("Invalid configuration")?;

            let options = StacClientOptions {
                request_timeout: Duration::from_secs(remote.timeout),
                max_items: remote.max_items,
                ..StacClientOptions::default()
            };
            let archive = StacArchive::new(StacCatalog::from_str_or_url(&remote.catalog), options)
                .context("Failed to start STAC client")?;
            let features = feature_service(pipeline.config(), &remote.watersheds)?;

            let start = Instant::now();
            let pb = spinner(&format!("Running {}...", pipeline.config().name))?;
            let report = pipeline.run(&archive, &features);
            pb.finish_and_clear();
            let report = report.context("Pipeline failed")?;
            info!("Pipeline finished in {:.2?}", start.elapsed());

            let mut sink = DirectorySink::new(&out).context("Failed to create output directory")?;
            publish(&report, pipeline.config(), &mut sink).context("Failed to write report")?;
            let summary = sink.write_summary(&report.digest())?;

            print_report(&report);
            println!("Output: {}", out.display());
            println!("Summary: {}", summary.display());
        }

        Commands::Region { source, watersheds } => {
            let config = load_config(&source)?;
            let features = feature_service(&config, &watersheds)?;
            let rc = &config.region;
            let region = region_for(&features, &rc.watershed, (rc.center[0], rc.center[1]), rc.radius_m, rc.epsg)
                .context("Failed to build region")?;
            let grid = region.grid(config.summary.scale)?;
            let (rows, cols) = grid.shape();
            let bounds = region.bounds();

            println!(
                "Watershed: {} {} = {}",
                rc.watershed.collection, rc.watershed.field, rc.watershed.id
            );
            println!("CRS: EPSG:{}", region.epsg());
            println!("Area: {:.2} km²", region.area_km2());
            println!(
                "Bounds: ({:.1}, {:.1}) - ({:.1}, {:.1})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            println!("Grid at {} m: {} x {}", config.summary.scale, cols, rows);
        }

        Commands::Preset { name } => match name {
            Some(name) => {
                let config = PipelineConfig::preset(&name).context("Unknown preset")?;
                println!("{}", config.to_json()?);
            }
            None => {
                for name in PRESETS {
                    println!("{}", name);
                }
            }
        },

        Commands::Info { input } => {
            let pb = spinner("Reading raster...")?;
            let raster = read_geotiff::<f64, _>(&input);
            pb.finish_and_clear();
            let raster = raster.context("Failed to read raster")?;
            print_info(&input, &raster);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_preset_run() {
        let cli = Cli::try_parse_from([
            "basinscope",
            "run",
            "--preset",
            "burn",
            "--watersheds",
            "huc8.geojson",
            "--out",
            "out",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { source, remote, out } => {
                assert_eq!(source.preset.as_deref(), Some("burn"));
                assert_eq!(remote.catalog, "pc");
                assert_eq!(remote.max_items, 100);
                assert_eq!(out, PathBuf::from("out"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_config_and_preset_conflict() {
        let parsed = Cli::try_parse_from([
            "basinscope",
            "region",
            "--preset",
            "burn",
            "--config",
            "c.json",
            "--watersheds",
            "w.geojson",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndsi.json");
        let preset = PipelineConfig::preset("ndsi").unwrap();
        std::fs::write(&path, preset.to_json().unwrap()).unwrap();

        let source = ConfigSource {
            config: Some(path),
            preset: None,
        };
        assert_eq!(load_config(&source).unwrap(), preset);
    }
}
