// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Panoscope: Street-level panorama discovery and 360° retrieval

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use panoscope::config::AppConfig;
use panoscope::db::{DiscoveredPanorama, ScanStore};
use panoscope::geo::BoundingBox;
use panoscope::regions::RegionIndex;
use panoscope::{Panoscope, PanoscopeError, Result};

/// Panoscope CLI - panorama discovery and retrieval
#[derive(Parser, Debug)]
#[command(name = "panoscope")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Discover street-level panoramas and download them as 360° images", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json", "jsonl"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// A named region or four explicit edges
#[derive(Args, Debug, Clone)]
struct BboxArgs {
    /// Named region from the region index
    #[arg(short, long, conflicts_with_all = ["north", "south", "east", "west"])]
    region: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    north: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    south: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    east: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    west: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a bounding box for panoramas (resumes an interrupted scan)
    Scan {
        #[command(flatten)]
        bbox: BboxArgs,

        /// Concurrent metadata probes (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Scan database (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List discovered panoramas inside a bounding box
    Query {
        #[command(flatten)]
        bbox: BboxArgs,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Download every discovered panorama inside a bounding box
    Download {
        #[command(flatten)]
        bbox: BboxArgs,

        /// Output directory (overrides config)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Stop after this many saved panoramas
        #[arg(long)]
        max_images: Option<usize>,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Download a single panorama by id
    Fetch {
        pano_id: String,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show scan store statistics
    Stats {
        #[arg(long)]
        db: Option<PathBuf>,

        /// Reclaim space after reporting
        #[arg(long)]
        vacuum: bool,
    },

    /// Named region operations
    Regions {
        #[command(subcommand)]
        action: RegionCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Initialize a new Panoscope project
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RegionCommands {
    /// List known regions
    List,

    /// Add or replace a region
    Add {
        name: String,

        #[arg(long, allow_hyphen_values = true)]
        north: f64,

        #[arg(long, allow_hyphen_values = true)]
        south: f64,

        #[arg(long, allow_hyphen_values = true)]
        east: f64,

        #[arg(long, allow_hyphen_values = true)]
        west: f64,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Scan { bbox, workers, db } => {
            if let Some(workers) = workers {
                config.scan.max_workers = workers;
            }
            override_db(&mut config, db);
            run_scan(config, bbox, &cli.format).await
        }
        Commands::Query { bbox, db } => {
            override_db(&mut config, db);
            run_query(config, bbox, &cli.format)
        }
        Commands::Download { bbox, out, max_images, db } => {
            if let Some(out) = out {
                config.download.output_dir = out.to_string_lossy().to_string();
            }
            if max_images.is_some() {
                config.download.max_images = max_images;
            }
            override_db(&mut config, db);
            run_download(config, bbox, &cli.format).await
        }
        Commands::Fetch { pano_id, lat, lon, out } => {
            if let Some(out) = out {
                config.download.output_dir = out.to_string_lossy().to_string();
            }
            run_fetch(config, DiscoveredPanorama { lat, lon, pano_id }).await
        }
        Commands::Stats { db, vacuum } => {
            override_db(&mut config, db);
            run_stats(config, vacuum, &cli.format)
        }
        Commands::Regions { action } => run_regions_command(config, action),
        Commands::Config { action } => run_config_command(config, action, &cli.config),
        Commands::Init { dir, force } => run_init(dir, force),
    }
}

fn override_db(config: &mut AppConfig, db: Option<PathBuf>) {
    if let Some(db) = db {
        config.database.path = db.to_string_lossy().to_string();
    }
}

/// Resolve a named region or explicit edges into a validated box
fn resolve_bbox(config: &AppConfig, args: &BboxArgs) -> Result<BoundingBox> {
    if let Some(name) = &args.region {
        let index = RegionIndex::load(PathBuf::from(&config.regions.path))?;
        return index.get(name).ok_or_else(|| {
            PanoscopeError::Config(format!(
                "Unknown region '{}'. Known regions: {}",
                name,
                index.names().join(", ")
            ))
        });
    }

    match (args.north, args.south, args.east, args.west) {
        (Some(north), Some(south), Some(east), Some(west)) => BoundingBox::new(north, south, east, west),
        _ => Err(PanoscopeError::Config(
            "Give --region NAME or all of --north, --south, --east, --west".to_string(),
        )),
    }
}

/// Flip a watch flag on Ctrl+C or SIGTERM
fn shutdown_signal() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, finishing current batch..."),
            _ = terminate => info!("Received SIGTERM, finishing current batch..."),
        }

        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

fn print_json<T: Serialize>(value: &T, format: &str) -> Result<()> {
    match format {
        "jsonl" => println!("{}", serde_json::to_string(value)?),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// Run the adaptive scan until the store is drained or a signal arrives
async fn run_scan(config: AppConfig, bbox_args: BboxArgs, format: &str) -> Result<()> {
    let bbox = resolve_bbox(&config, &bbox_args)?;
    let core = Panoscope::from_config(config)?;

    info!("Scanning {}. Press Ctrl+C to stop after the current batch.", bbox);
    let report = core.start_scan(&bbox, Some(shutdown_signal())).await?;

    if format != "text" {
        return print_json(&report, format);
    }

    let stats = core.stats()?;
    println!("Scan of {}", report.bbox);
    println!("  Seeded:    {}", report.seeded);
    println!("  Probed:    {} in {} batches", report.probed, report.batches);
    println!("  Hits:      {}", report.hits);
    println!("  Failures:  {}", report.failures);
    println!("  Store:     {}/{} scanned", stats.scanned, stats.total);
    println!(
        "  Elapsed:   {}s",
        (report.finished_at - report.started_at).num_seconds()
    );
    if report.cancelled {
        println!("\nStopped early; run the same command again to resume.");
    }

    Ok(())
}

/// List discovered panoramas
fn run_query(config: AppConfig, bbox_args: BboxArgs, format: &str) -> Result<()> {
    let bbox = resolve_bbox(&config, &bbox_args)?;
    let store = ScanStore::open(&config.database.path)?;
    let found = store.coordinates_in_bbox(&bbox)?;

    match format {
        "json" => print_json(&found, format)?,
        "jsonl" => {
            for panorama in &found {
                print_json(panorama, format)?;
            }
        }
        _ => {
            for p in &found {
                println!("{}\t{}\t{}", p.lat, p.lon, p.pano_id);
            }
            println!("\n{} panoramas in {}", found.len(), bbox);
        }
    }

    Ok(())
}

/// Query a box and run the retrieval pipeline over the result
async fn run_download(config: AppConfig, bbox_args: BboxArgs, format: &str) -> Result<()> {
    let bbox = resolve_bbox(&config, &bbox_args)?;
    let out_dir = PathBuf::from(&config.download.output_dir);
    let core = Panoscope::from_config(config)?;

    let report = core.download(&bbox, &out_dir).await?;

    if format != "text" {
        return print_json(&report, format);
    }

    println!("Saved {} panoramas to {}", report.saved, out_dir.display());
    if report.skipped > 0 {
        println!("Skipped {} (max_images reached)", report.skipped);
    }
    if !report.failures.is_empty() {
        println!("\nFailed ({}):", report.failures.len());
        for failure in &report.failures {
            println!(
                "  {} at ({}, {}): {}",
                failure.panorama.pano_id, failure.panorama.lat, failure.panorama.lon, failure.error
            );
        }
    }

    Ok(())
}

async fn run_fetch(config: AppConfig, panorama: DiscoveredPanorama) -> Result<()> {
    let out_dir = PathBuf::from(&config.download.output_dir);
    std::fs::create_dir_all(&out_dir)?;
    let core = Panoscope::from_config(config)?;

    let path = core.pipeline().retrieve_one(&panorama, &out_dir).await?;
    println!("Saved {}", path.display());
    Ok(())
}

fn run_stats(config: AppConfig, vacuum: bool, format: &str) -> Result<()> {
    let store = ScanStore::open(&config.database.path)?;
    let stats = store.stats()?;

    if format == "text" {
        println!("Scan store ({}):", config.database.path);
        println!("  Coordinates: {} ({} coarse, {} fine)", stats.total, stats.coarse, stats.fine);
        println!("  Scanned:     {}", stats.scanned);
        println!("  Pending:     {}", stats.pending());
        println!("  Panoramas:   {}", stats.hits);
    } else {
        print_json(&stats, format)?;
    }

    if vacuum {
        store.vacuum()?;
        info!("Store vacuumed");
    }

    Ok(())
}

fn run_regions_command(config: AppConfig, action: RegionCommands) -> Result<()> {
    let mut index = RegionIndex::load(PathBuf::from(&config.regions.path))?;

    match action {
        RegionCommands::List => {
            for (name, bbox) in index.entries() {
                println!("  {:<16} {}", name, bbox);
            }
        }
        RegionCommands::Add { name, north, south, east, west } => {
            index.insert(&name, BoundingBox::new(north, south, east, west)?)?;
            index.save()?;
            println!("Saved region '{}' to {:?}", name, index.path());
        }
    }

    Ok(())
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let mut shown = config;
            if !shown.api.key.is_empty() {
                shown.api.key = "********".to_string();
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Database: {}", config.database.path);
            println!(
                "  Spacing: {} coarse / {} fine",
                config.scan.coarse_spacing, config.scan.fine_spacing
            );
            if config.api.resolved_key().is_none() {
                warn!("No API key configured; scan, download and fetch will fail");
            }
        }
    }

    Ok(())
}

/// Initialize a new Panoscope project
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(PanoscopeError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let config = AppConfig::default();
    std::fs::create_dir_all(target.join(&config.download.output_dir))?;
    config.save(&config_path)?;

    let index = RegionIndex::load(target.join(&config.regions.path))?;
    if !index.path().exists() {
        index.save()?;
    }

    println!("Panoscope initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - {}", config.regions.path);
    println!("  - {}/", config.download.output_dir);
    println!("\nNext steps:");
    println!("  1. Set api.key in config.json or export PANOSCOPE_API_KEY");
    println!("  2. Scan a region: panoscope scan --region aizawl");

    Ok(())
}
