//! Probe tool for the DataCrypt offline cache controller.
//!
//! Provides commands for:
//! - Showing which caching strategy a URL is routed to
//! - Warming the caches against a running site
//! - Printing the effective controller configuration
//!
//! ## Usage
//!
//! ```bash
//! # Route a few paths
//! sw-probe classify /api/stats /assets/css/main.css /about
//!
//! # Install against a local server and list the cached generations
//! sw-probe warm --config sw.json --origin http://localhost:8080/
//!
//! # Dump the configuration with defaults filled in
//! sw-probe config --config sw.json
//! ```

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use datacrypt_common::{init_logging, LogConfig};
use datacrypt_net::{FetcherConfig, HttpFetcher, Request};
use datacrypt_sw::{Classifier, ControllerConfig, Route, ServiceWorkerContainer};
use tracing::info;

#[derive(Parser)]
#[command(name = "sw-probe")]
#[command(about = "Inspect routing and warm caches for the DataCrypt offline cache controller")]
struct Cli {
    /// Controller configuration (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured origin
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the route taken by each path or URL
    Classify {
        /// Paths (resolved against the origin) or absolute URLs
        #[arg(required = true)]
        targets: Vec<String>,
        /// Treat targets as POSTs
        #[arg(long)]
        post: bool,
    },

    /// Precache the core assets from the origin
    Warm,

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::debug()
    } else {
        LogConfig::from_env()?
    };
    init_logging(log_config)?;

    let config = load_config(cli.config.as_deref(), cli.origin)?;

    match cli.command {
        Commands::Classify { targets, post } => classify(&config, &targets, post)?,
        Commands::Warm => warm(config).await?,
        Commands::Config => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}

fn load_config(path: Option<&Path>, origin: Option<String>) -> Result<ControllerConfig, Box<dyn Error>> {
    let mut config = match path {
        Some(path) => ControllerConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => ControllerConfig::default(),
    };
    if let Some(origin) = origin {
        config = config.with_origin(origin);
    }
    config.validate()?;
    Ok(config)
}

fn classify(config: &ControllerConfig, targets: &[String], post: bool) -> Result<(), Box<dyn Error>> {
    let classifier = Classifier::from_config(config)?;

    for target in targets {
        let url = config.resolve(target)?;
        let request = if post {
            Request::post(url, Default::default())
        } else {
            Request::get(url)
        };

        let route = match classifier.route(&request) {
            Route::Passthrough => "passthrough",
            Route::ShareTarget => "share-target",
            Route::Cached(strategy) => strategy.as_str(),
        };
        println!("{:<48} {}", request.url.as_str(), route);
    }

    Ok(())
}

async fn warm(config: ControllerConfig) -> Result<(), Box<dyn Error>> {
    let fetcher = Arc::new(HttpFetcher::new(FetcherConfig::default())?);
    let (container, _events) = ServiceWorkerContainer::new();

    info!(origin = %config.origin, version = %config.version, "Warming caches");
    let scope = container.register(config, fetcher).await?;

    println!("Registered at {}", scope);
    let caches = container.global_scope().caches.read().await;
    for name in caches.keys() {
        let count = caches.get(&name).map_or(0, |c| c.len());
        println!("  {:<24} {} entries", name, count);
    }

    Ok(())
}
