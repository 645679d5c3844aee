/// Decoder for single-station CSV series
/// (`GET /data/{day|week|month}/{station}_000{n}.csv`).
///
/// Format: one header row (ignored) then `YYYY-MM-DD HH:MM,value` rows in
/// chronological order. The station is not named in the file; the caller
/// passes the id it requested.
///
/// Empty input is an error, a header with no rows is an empty series.

use crate::ingest::{csv_records, parse_gauge_time};
use crate::model::{
    Celsius, DecodeError, Millimeters, StationId, StationReading, StationTemperatureReading,
    StationVoltageReading, StationWaterLevelReading, Volts, parse_plain_value,
};

pub fn parse_level_series(
    csv: &str,
    station_id: &StationId,
) -> Result<Vec<StationWaterLevelReading>, DecodeError> {
    parse_series(csv, station_id, Millimeters::from_meters_str)
}

pub fn parse_temperature_series(
    csv: &str,
    station_id: &StationId,
) -> Result<Vec<StationTemperatureReading>, DecodeError> {
    parse_series(csv, station_id, |raw| parse_plain_value(raw).map(Celsius))
}

pub fn parse_voltage_series(
    csv: &str,
    station_id: &StationId,
) -> Result<Vec<StationVoltageReading>, DecodeError> {
    parse_series(csv, station_id, |raw| parse_plain_value(raw).map(Volts))
}

fn parse_series<Q>(
    csv: &str,
    station_id: &StationId,
    convert: impl Fn(&str) -> Result<Q, DecodeError>,
) -> Result<Vec<StationReading<Q>>, DecodeError> {
    let mut records = csv_records(csv);

    // Header only needs to be present and well-formed.
    match records.next() {
        None => return Err(DecodeError::MissingHeader),
        Some((line, Err(e))) => return Err(e.at_line(line)),
        Some(_) => {}
    }

    let mut readings = Vec::new();
    for (line, record) in records {
        let reading = record
            .and_then(|fields| parse_row(&fields, station_id, &convert))
            .map_err(|e| e.at_line(line))?;
        readings.push(reading);
    }
    Ok(readings)
}

fn parse_row<Q>(
    fields: &[String],
    station_id: &StationId,
    convert: impl Fn(&str) -> Result<Q, DecodeError>,
) -> Result<StationReading<Q>, DecodeError> {
    let timestamp = fields.first().ok_or(DecodeError::MissingField("timestamp"))?;
    let value = fields.get(1).ok_or(DecodeError::MissingField("value"))?;

    Ok(StationReading {
        station_id: station_id.clone(),
        name: None,
        region_id: None,
        read_time: parse_gauge_time(timestamp)?,
        value: convert(value)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::*;
    use chrono::{TimeZone, Utc};

    fn station() -> StationId {
        StationId::parse("0000001041").unwrap()
    }

    #[test]
    fn test_level_series_in_file_order_and_millimeters() {
        let readings = parse_level_series(fixture_level_series_csv(), &station()).unwrap();

        let values: Vec<i64> = readings.iter().map(|r| r.value.0).collect();
        assert_eq!(values, vec![461, 462, 466]);
        assert_eq!(readings[0].read_time, Utc.with_ymd_and_hms(2021, 6, 15, 0, 0, 0).unwrap());
        assert_eq!(readings[2].read_time, Utc.with_ymd_and_hms(2021, 6, 15, 0, 30, 0).unwrap());
        assert!(readings.iter().all(|r| r.station_id == station()));
    }

    #[test]
    fn test_temperature_series_keeps_native_unit() {
        let readings = parse_temperature_series(fixture_temperature_series_csv(), &station()).unwrap();
        assert_eq!(readings[0].value, Celsius(14.8));
        assert_eq!(readings[1].value, Celsius(14.75));
    }

    #[test]
    fn test_voltage_series() {
        let readings = parse_voltage_series("datetime,value\n2021-06-15 00:00,12.61\n", &station()).unwrap();
        assert_eq!(readings[0].value, Volts(12.61));
    }

    #[test]
    fn test_empty_input_is_error() {
        assert_eq!(parse_level_series("", &station()), Err(DecodeError::MissingHeader));
        assert_eq!(parse_level_series("\n\n", &station()), Err(DecodeError::MissingHeader));
    }

    #[test]
    fn test_header_only_is_empty_series() {
        assert_eq!(parse_level_series("datetime,value\n", &station()), Ok(vec![]));
    }

    #[test]
    fn test_bad_timestamp_names_line() {
        let result = parse_level_series("datetime,value\n2021-06-15 00:00,0.4\n15/06/2021,0.5\n", &station());
        match result {
            Err(DecodeError::Line { line, source }) => {
                assert_eq!(line, 3);
                assert!(matches!(*source, DecodeError::Timestamp { .. }));
            }
            other => panic!("expected line error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_value_is_error_not_zero() {
        let result = parse_level_series("datetime,value\n2021-06-15 00:00,oops\n", &station());
        assert!(matches!(result, Err(DecodeError::Line { line: 2, .. })));
    }

    #[test]
    fn test_row_without_value_is_error() {
        let result = parse_temperature_series("datetime,value\n2021-06-15 00:00\n", &station());
        assert_eq!(
            result,
            Err(DecodeError::MissingField("value").at_line(2))
        );
    }
}
