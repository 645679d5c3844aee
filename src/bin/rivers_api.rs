//! Station Catalog API
//!
//! Serves a cached station catalog (GeoJSON written by the poller's
//! `catalog_path`, or a raw dump of `/geojson/latest`) over HTTP without
//! running the poller.
//!
//! Usage:
//!   cargo run --bin rivers_api -- --catalog stations.json --port 8080
//!   cargo run --bin rivers_api -- --refresh      # fetch the feed once first

use clap::Parser;
use rivers_service::config::Config;
use rivers_service::endpoint;
use rivers_service::ingest::client::RiversClient;
use rivers_service::ingest::transport::CancelToken;
use rivers_service::logging;
use rivers_service::stations::StationsLatest;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

#[derive(Parser, Debug)]
#[command(name = "rivers_api", version, about = "Serve the cached station catalog")]
struct Args {
    /// Config file (default: ./rivers.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Catalog file to serve
    #[arg(long, default_value = "stations.json")]
    catalog: PathBuf,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Fetch the latest feed and overwrite the catalog file before serving
    #[arg(long)]
    refresh: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(logging::DEFAULT_DIRECTIVE);
    let args = Args::parse();

    println!("🌊 Station Catalog API");
    println!("================================\n");

    let stations = if args.refresh {
        let config = Config::from_environment(args.config.as_deref())?;
        println!("📥 Fetching latest feed from {}...", config.upstream.base_url);
        let client = RiversClient::from_config(&config)?;
        let stations = client.get_latest_stations(&CancelToken::new().with_timeout(config.cycle_timeout()))?;
        stations.save(&args.catalog)?;
        stations
    } else {
        StationsLatest::load(&args.catalog)?
    };
    println!("✓ Loaded {} stations from {}\n", stations.station_count(), args.catalog.display());

    endpoint::start_endpoint_server(args.port, Arc::new(RwLock::new(stations)))?;
    Ok(())
}
