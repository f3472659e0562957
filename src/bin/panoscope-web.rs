// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Panoscope query server
//!
//! Serves discovered panoramas, store statistics and named regions as JSON.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use panoscope::config::AppConfig;
use panoscope::db::ScanStore;

#[derive(Parser, Debug)]
#[command(name = "panoscope-web")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Panoscope JSON query server")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Scan database (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Panoscope query server v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    if let Some(host) = args.host {
        config.web.host = host;
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if let Some(db) = args.db {
        config.database.path = db.to_string_lossy().to_string();
    }

    let store = ScanStore::open(&config.database.path)
        .with_context(|| format!("opening scan store {}", config.database.path))?;
    info!("Scan store: {}", config.database.path);

    panoscope::web::start_server(config, store)
        .await
        .context("query server stopped")?;
    Ok(())
}
