//! Latest Gauge Readings
//!
//! One-shot query against the gauge network API. Without `--station` prints
//! the latest value of every station from the GeoJSON feed; with `--station`
//! prints that station's CSV series for the chosen period.
//!
//! Usage:
//!   cargo run --bin latest_levels
//!   cargo run --bin latest_levels -- --sensor temperature
//!   cargo run --bin latest_levels -- --station 0000001041 --period week
//!   cargo run --bin latest_levels -- --group 13
//!   cargo run --bin latest_levels -- --group Foyle
//!
//! Environment:
//!   RIVERS_BASE_URL - upstream override (also read from .env / rivers.toml)

use clap::{Parser, ValueEnum};
use rivers_service::config::Config;
use rivers_service::groups::GroupId;
use rivers_service::ingest::client::RiversClient;
use rivers_service::ingest::transport::CancelToken;
use rivers_service::logging;
use rivers_service::model::{Period, Quantity, StationId, StationReading};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sensor {
    Level,
    Temperature,
    Voltage,
}

#[derive(Parser, Debug)]
#[command(name = "latest_levels", version, about = "Print current gauge readings")]
struct Args {
    /// Config file (default: ./rivers.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "level")]
    sensor: Sensor,

    /// Print one station's CSV series instead of the latest feed
    #[arg(long)]
    station: Option<String>,

    /// Series window: day, week or month
    #[arg(long, default_value = "day")]
    period: Period,

    /// Print a group matrix (water level only), by id (1-28) or name
    #[arg(long, conflicts_with = "station")]
    group: Option<GroupId>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("rivers_service=warn");
    let args = Args::parse();

    let config = Config::from_environment(args.config.as_deref())?;
    let client = RiversClient::from_config(&config)?;
    let cancel = CancelToken::new().with_timeout(config.cycle_timeout());

    println!("🌊 Gauge readings from {}", client.base_url());
    println!("================================\n");

    if let Some(group) = args.group {
        println!("📍 Group {} ({})\n", group, group.name().unwrap_or("unnamed"));
        let readings = client.get_group_water_levels(group.get(), &cancel)?;
        for r in &readings {
            println!("{}  {:<32} {:>6} mm", r.timestamp.to_rfc3339(), r.station_name, r.value.0);
        }
        println!("\n✓ {} readings", readings.len());
        return Ok(());
    }

    match &args.station {
        Some(raw) => {
            let station = StationId::parse(raw)?;
            match args.sensor {
                Sensor::Level => print_readings(&client.get_level_series(&station, args.period, &cancel)?),
                Sensor::Temperature => {
                    print_readings(&client.get_temperature_series(&station, args.period, &cancel)?)
                }
                Sensor::Voltage => print_readings(&client.get_voltage_series(&station, args.period, &cancel)?),
            }
        }
        None => match args.sensor {
            Sensor::Level => print_readings(&client.get_latest_water_levels(&cancel)?),
            Sensor::Temperature => print_readings(&client.get_latest_temperatures(&cancel)?),
            Sensor::Voltage => print_readings(&client.get_latest_voltages(&cancel)?),
        },
    }

    Ok(())
}

fn print_readings<Q: Quantity>(readings: &[StationReading<Q>]) {
    for reading in readings {
        println!("{}", reading);
    }
    println!("\n✓ {} readings", readings.len());
}
