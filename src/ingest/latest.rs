/// Decoder for the GeoJSON latest feed (`GET /geojson/latest`).
///
/// The feed carries one feature per sensor. Each `parse_latest_*` function
/// keeps only the features of its sensor type and converts the value into
/// that sensor's unit. A malformed station reference, timestamp or value in
/// any retained feature fails the whole decode; features of other sensor
/// types are never inspected beyond their `sensor_ref`.

use chrono::{DateTime, Utc};

use crate::model::{
    Celsius, DecodeError, Millimeters, SensorType, StationId, StationReading,
    StationTemperatureReading, StationVoltageReading, StationWaterLevelReading, Volts,
    parse_plain_value,
};
use crate::stations::{SensorProperties, StationsLatest};

/// Water level readings (`sensor_ref` `0001`), metres converted to mm.
pub fn parse_latest_water_levels(json: &str) -> Result<Vec<StationWaterLevelReading>, DecodeError> {
    let feed = StationsLatest::from_json(json)?;
    water_levels_from(&feed)
}

/// Water temperature readings (`sensor_ref` `0002`) in °C.
pub fn parse_latest_temperatures(json: &str) -> Result<Vec<StationTemperatureReading>, DecodeError> {
    let feed = StationsLatest::from_json(json)?;
    readings_for(&feed, SensorType::Temperature, |raw| parse_plain_value(raw).map(Celsius))
}

/// Logger voltage readings (`sensor_ref` `0003`) in volts.
pub fn parse_latest_voltages(json: &str) -> Result<Vec<StationVoltageReading>, DecodeError> {
    let feed = StationsLatest::from_json(json)?;
    readings_for(&feed, SensorType::Voltage, |raw| parse_plain_value(raw).map(Volts))
}

/// Water levels from an already-parsed feed. The poller parses the feed once
/// and uses it both for readings and for the station catalog.
pub fn water_levels_from(feed: &StationsLatest) -> Result<Vec<StationWaterLevelReading>, DecodeError> {
    readings_for(feed, SensorType::Level, Millimeters::from_meters_str)
}

fn readings_for<Q>(
    feed: &StationsLatest,
    sensor: SensorType,
    convert: impl Fn(&str) -> Result<Q, DecodeError>,
) -> Result<Vec<StationReading<Q>>, DecodeError> {
    feed.features
        .iter()
        .map(|f| &f.properties)
        .filter(|p| SensorType::from_code(&p.sensor_ref) == sensor)
        .map(|p| to_reading(p, &convert))
        .collect()
}

fn to_reading<Q>(
    props: &SensorProperties,
    convert: impl Fn(&str) -> Result<Q, DecodeError>,
) -> Result<StationReading<Q>, DecodeError> {
    let station_id = StationId::parse(&props.station_ref)?;
    let read_time = parse_rfc3339(&props.datetime)?;
    let value = convert(&props.value)?;

    let name = props.station_name.trim();
    Ok(StationReading {
        station_id,
        name: (!name.is_empty()).then(|| name.to_string()),
        region_id: props.region_id,
        read_time,
        value,
    })
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DecodeError::Timestamp {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
