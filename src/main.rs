//! River Gauge Ingestion Service - Main Daemon
//!
//! A server-side daemon that continuously:
//! 1. Fetches the latest gauge feed (and configured group matrices)
//! 2. Normalizes every reading to a common model (water level in mm)
//! 3. Stores new readings, skipping ones already stored
//! 4. Optionally serves the station catalog over HTTP
//!
//! Usage:
//!   cargo run --release                          # Poll forever with rivers.toml
//!   cargo run --release -- --endpoint 8080       # Also serve the catalog on port 8080
//!   cargo run --release -- --once                # Run a single cycle and exit
//!   cargo run --release -- --config /etc/rivers.toml --interval 300
//!
//! Environment:
//!   RIVERS_BASE_URL, RIVERS_STORE_BACKEND, RIVERS_STORE_PATH,
//!   RIVERS_POLL_INTERVAL_SECS - override rivers.toml (also read from .env)
//!   RUST_LOG - log filter (default: rivers_service=info)

use clap::Parser;
use rivers_service::config::Config;
use rivers_service::endpoint;
use rivers_service::ingest::client::RiversClient;
use rivers_service::ingest::transport::CancelToken;
use rivers_service::logging;
use rivers_service::poller::{Poller, PollerSettings};
use rivers_service::repo::ReadingsRepo;
use rivers_service::stations::StationsLatest;
use rivers_service::store;
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

#[derive(Parser, Debug)]
#[command(name = "rivers_service", version, about = "River gauge ingestion daemon")]
struct Args {
    /// Config file (default: ./rivers.toml if present)
    #[arg(long, env = "RIVERS_CONFIG")]
    config: Option<PathBuf>,

    /// Poll interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Serve the HTTP endpoint on this port
    #[arg(long, value_name = "PORT")]
    endpoint: Option<u16>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
}

fn main() {
    logging::init(logging::DEFAULT_DIRECTIVE);
    let args = Args::parse();

    println!("🌊 River Gauge Ingestion Service");
    println!("================================\n");

    if let Err(e) = run(args) {
        eprintln!("\n❌ {}\n", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    println!("📊 Loading configuration...");
    let mut config = Config::from_environment(args.config.as_deref())?;
    if let Some(secs) = args.interval {
        config.poller.interval_secs = secs;
    }
    if let Some(port) = args.endpoint {
        config.endpoint.enabled = true;
        config.endpoint.port = port;
    }
    config.validate()?;
    println!("   Upstream: {}", config.upstream.base_url);
    println!("   Store: {:?} at {}\n", config.store.backend, config.store.path);

    let store = store::open(config.store.backend, &config.store.path, &config.store.table)?;
    let repo = Arc::new(ReadingsRepo::new(store));
    let client = RiversClient::from_config(&config)?;
    let poller = Poller::new(client, repo, PollerSettings::from_config(&config));

    // Serve the last cached catalog until the first cycle replaces it.
    if let Some(path) = &config.poller.catalog_path {
        if let Ok(cached) = StationsLatest::load(path) {
            println!("📋 Loaded {} cached stations from {}", cached.station_count(), path);
            *poller.catalog().write().unwrap_or_else(PoisonError::into_inner) = cached;
        }
    }

    if config.endpoint.enabled {
        println!("🚀 Starting HTTP endpoint server...");
        let port = config.endpoint.port;
        let catalog = poller.catalog();
        std::thread::spawn(move || {
            if let Err(e) = endpoint::start_endpoint_server(port, catalog) {
                eprintln!("❌ Endpoint server error: {}", e);
            }
        });
    }

    if args.once {
        println!("🔄 Running a single poll cycle...");
        let cancel = CancelToken::new().with_timeout(config.cycle_timeout());
        let report = poller.run_cycle(&cancel)?;
        println!(
            "✓ Cycle complete: {} saved, {} duplicates, {} failed, {} unresolved, {} groups failed",
            report.saved, report.duplicates, report.failed, report.unresolved, report.groups_failed
        );
        return Ok(());
    }

    println!("🔄 Starting continuous polling loop...");
    println!("   Poll interval: {} seconds", config.poller.interval_secs);
    println!("   Groups: {:?}", config.poller.groups);
    println!("   Press Ctrl+C to stop\n");

    poller.run(&CancelToken::new());
    Ok(())
}
