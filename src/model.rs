/// Core data types for the river gauge ingestion service.
///
/// This module defines the shared domain model imported by all other modules:
/// station identifiers, sensor discriminators, the typed reading containers
/// and the decode error taxonomy. It performs no I/O.
///
/// Units are carried by type, never by convention. Water level is always
/// integer millimetres (`Millimeters`), temperature is degrees Celsius
/// (`Celsius`) and battery voltage is volts (`Volts`). Each decoder converts
/// at its boundary so nothing downstream has to guess.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Sensor types
// ---------------------------------------------------------------------------

/// Upstream discriminator for water level sensors.
pub const SENSOR_LEVEL: &str = "0001";

/// Upstream discriminator for water temperature sensors.
pub const SENSOR_TEMPERATURE: &str = "0002";

/// Upstream discriminator for logger battery voltage.
pub const SENSOR_VOLTAGE: &str = "0003";

/// Upstream discriminator for the ordnance datum pseudo-sensor.
pub const SENSOR_ORDNANCE_DATUM: &str = "OD";

/// What a given reading measures, as published in `sensor_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SensorType {
    Level,
    Temperature,
    Voltage,
    OrdnanceDatum,
    Other(String),
}

impl SensorType {
    pub fn from_code(code: &str) -> Self {
        match code {
            SENSOR_LEVEL => SensorType::Level,
            SENSOR_TEMPERATURE => SensorType::Temperature,
            SENSOR_VOLTAGE => SensorType::Voltage,
            SENSOR_ORDNANCE_DATUM => SensorType::OrdnanceDatum,
            other => SensorType::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            SensorType::Level => SENSOR_LEVEL,
            SensorType::Temperature => SENSOR_TEMPERATURE,
            SensorType::Voltage => SENSOR_VOLTAGE,
            SensorType::OrdnanceDatum => SENSOR_ORDNANCE_DATUM,
            SensorType::Other(code) => code,
        }
    }

    /// Numeric suffix used in CSV file names (`{station}_000{n}.csv`).
    /// Only the three measured sensors publish CSV series.
    pub fn csv_index(&self) -> Option<u8> {
        match self {
            SensorType::Level => Some(1),
            SensorType::Temperature => Some(2),
            SensorType::Voltage => Some(3),
            _ => None,
        }
    }
}

/// Time window of a single-station CSV series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            other => Err(format!(
                "invalid period {:?}, expecting one of 'day', 'week', 'month'",
                other
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Station identifiers
// ---------------------------------------------------------------------------

/// Station reference as published upstream, e.g. `"0000001041"`.
///
/// Kept as an opaque digit string: the zero padding is part of the upstream
/// CSV file naming (`/data/day/0000001041_0001.csv`), so it is never trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    /// Normalizes a raw station reference: surrounding whitespace is trimmed
    /// and the remainder must be a non-empty run of ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecodeError::StationRef(raw.to_string()));
        }
        Ok(StationId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Physical quantities
// ---------------------------------------------------------------------------

/// A measured physical quantity that can be written to and read back from
/// the numeric `value` column of a store record.
pub trait Quantity: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Unit label, used in log lines and CLI output.
    const UNIT: &'static str;

    fn to_store_value(self) -> f64;

    /// Returns `None` when the stored number cannot represent this quantity.
    fn from_store_value(value: f64) -> Option<Self>;
}

/// Water level in integer millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Millimeters(pub i64);

/// Water temperature in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Celsius(pub f64);

/// Logger battery voltage in volts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Volts(pub f64);

impl Millimeters {
    /// Converts a decimal metres string (`"1.715"`) to millimetres (`1715`).
    ///
    /// Digits past the third decimal place are truncated toward zero. The
    /// conversion is done on the decimal digits directly so values such as
    /// `"0.293"` cannot drift to `292` through binary floating point.
    pub fn from_meters_str(raw: &str) -> Result<Self, DecodeError> {
        let invalid = || DecodeError::Value { value: raw.to_string() };

        let s = raw.trim();
        let (negative, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole_mm = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<i64>()
                .ok()
                .and_then(|m| m.checked_mul(1000))
                .ok_or_else(invalid)?
        };

        let frac_mm = frac
            .bytes()
            .take(3)
            .zip([100, 10, 1])
            .map(|(digit, scale)| i64::from(digit - b'0') * scale)
            .sum::<i64>();

        let mm = whole_mm.checked_add(frac_mm).ok_or_else(invalid)?;
        Ok(Millimeters(if negative { -mm } else { mm }))
    }
}

impl Quantity for Millimeters {
    const UNIT: &'static str = "mm";

    fn to_store_value(self) -> f64 {
        self.0 as f64
    }

    fn from_store_value(value: f64) -> Option<Self> {
        // Integral values only; anything else was not written by this type.
        if !value.is_finite() || value.fract() != 0.0 || value.abs() > 9.0e15 {
            return None;
        }
        Some(Millimeters(value as i64))
    }
}

impl Quantity for Celsius {
    const UNIT: &'static str = "°C";

    fn to_store_value(self) -> f64 {
        self.0
    }

    fn from_store_value(value: f64) -> Option<Self> {
        value.is_finite().then_some(Celsius(value))
    }
}

impl Quantity for Volts {
    const UNIT: &'static str = "V";

    fn to_store_value(self) -> f64 {
        self.0
    }

    fn from_store_value(value: f64) -> Option<Self> {
        value.is_finite().then_some(Volts(value))
    }
}

/// Parses a plain decimal string as `f64`, rejecting NaN and infinities.
pub fn parse_plain_value(raw: &str) -> Result<f64, DecodeError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| DecodeError::Value { value: raw.to_string() })
}

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One timestamped observation from one sensor at one station.
///
/// `(station_id, read_time)` is the natural key of a reading stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationReading<Q> {
    pub station_id: StationId,
    pub name: Option<String>,
    pub region_id: Option<i64>,
    pub read_time: DateTime<Utc>,
    pub value: Q,
}

pub type StationWaterLevelReading = StationReading<Millimeters>;
pub type StationTemperatureReading = StationReading<Celsius>;
pub type StationVoltageReading = StationReading<Volts>;

impl<Q: Quantity> fmt::Display for StationReading<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "time: {}, station: {}, id: {}, value: {} {}",
            self.read_time.to_rfc3339(),
            self.name.as_deref().unwrap_or("-"),
            self.station_id,
            self.value.to_store_value(),
            Q::UNIT
        )
    }
}

/// A water level cell pivoted out of a group CSV matrix.
///
/// Group files identify stations by display name only; the caller resolves
/// the name to a `StationId` before the reading can be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupReading {
    pub station_name: String,
    pub timestamp: DateTime<Utc>,
    pub value: Millimeters,
}

impl GroupReading {
    pub fn into_station_reading(self, station_id: StationId) -> StationWaterLevelReading {
        StationReading {
            station_id,
            name: Some(self.station_name),
            region_id: None,
            read_time: self.timestamp,
            value: self.value,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while decoding an upstream payload. Any of these aborts the
/// decode of the whole response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("JSON deserialization failed: {0}")]
    Json(String),
    #[error("reading csv header: input is empty")]
    MissingHeader,
    #[error("empty records")]
    EmptyRecords,
    #[error("missing station")]
    MissingStation,
    #[error("unterminated quoted field")]
    UnterminatedQuote,
    #[error("expected {expected} fields, found {found}")]
    RowWidth { expected: usize, found: usize },
    #[error("missing {0} field")]
    MissingField(&'static str),
    #[error("invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },
    #[error("invalid numeric value {value:?}")]
    Value { value: String },
    #[error("invalid station reference {0:?}")]
    StationRef(String),
    #[error("csv line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    pub(crate) fn at_line(self, line: usize) -> Self {
        DecodeError::Line { line, source: Box::new(self) }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
