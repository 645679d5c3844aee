/// Typed client for the gauge network's public API.
///
/// Endpoints:
///   GET {base}/geojson/latest                          - latest value of every sensor
///   GET {base}/data/{day|week|month}/{station}_000{n}.csv - one sensor, one window
///   GET {base}/data/group/group_{id}.csv                - wide matrix for a group
///
/// Each `get_*` operation is one `Transport::fetch` followed by one decoder
/// call; nothing is cached here.

use thiserror::Error;

use crate::config::Config;
use crate::groups::GroupId;
use crate::ingest::group::parse_group_csv;
use crate::ingest::latest::{parse_latest_temperatures, parse_latest_voltages, water_levels_from};
use crate::ingest::series::{parse_level_series, parse_temperature_series, parse_voltage_series};
use crate::ingest::transport::{CancelToken, ContentKind, FetchError, Request, SendError, Transport};
use crate::model::{
    DecodeError, GroupReading, Period, SensorType, StationId, StationTemperatureReading,
    StationVoltageReading, StationWaterLevelReading,
};
use crate::stations::StationsLatest;

pub const DEFAULT_BASE_URL: &str = "http://waterlevel.ie";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decoding upstream payload: {0}")]
    Decode(#[from] DecodeError),
    #[error("invalid group id {0}: expecting 1..=28")]
    InvalidGroup(u8),
}

pub struct RiversClient {
    base_url: String,
    transport: Transport,
}

impl RiversClient {
    pub fn new(base_url: impl Into<String>, transport: Transport) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, transport }
    }

    /// Client over a real HTTP stack, tuned by the `[upstream]` and `[retry]`
    /// config sections.
    pub fn from_config(config: &Config) -> Result<Self, SendError> {
        let transport = Transport::with_reqwest(
            config.request_timeout(),
            config.retry_policy(),
            config.breaker_policy(),
        )?;
        Ok(Self::new(config.upstream.base_url.clone(), transport))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // URLs
    // -----------------------------------------------------------------------

    pub fn latest_url(&self) -> String {
        format!("{}/geojson/latest", self.base_url)
    }

    /// CSV series URL for a measured sensor; `None` for sensor types that
    /// publish no series (ordnance datum, unknown codes).
    pub fn series_url(&self, station: &StationId, sensor: &SensorType, period: Period) -> Option<String> {
        sensor
            .csv_index()
            .map(|index| self.series_url_for(station, index, period))
    }

    fn series_url_for(&self, station: &StationId, index: u8, period: Period) -> String {
        format!(
            "{}/data/{}/{}_000{}.csv",
            self.base_url,
            period.as_str(),
            urlencoding::encode(station.as_str()),
            index
        )
    }

    pub fn group_url(&self, group: GroupId) -> String {
        format!("{}/data/group/group_{}.csv", self.base_url, group)
    }

    // -----------------------------------------------------------------------
    // Latest feed
    // -----------------------------------------------------------------------

    /// Raw GeoJSON body of the latest feed.
    pub fn get_latest_feed(&self, cancel: &CancelToken) -> Result<String, ClientError> {
        self.fetch(self.latest_url(), ContentKind::Json, cancel)
    }

    /// The latest feed parsed into the station catalog.
    pub fn get_latest_stations(&self, cancel: &CancelToken) -> Result<StationsLatest, ClientError> {
        let body = self.get_latest_feed(cancel)?;
        Ok(StationsLatest::from_json(&body)?)
    }

    pub fn get_latest_water_levels(
        &self,
        cancel: &CancelToken,
    ) -> Result<Vec<StationWaterLevelReading>, ClientError> {
        let stations = self.get_latest_stations(cancel)?;
        Ok(water_levels_from(&stations)?)
    }

    pub fn get_latest_temperatures(
        &self,
        cancel: &CancelToken,
    ) -> Result<Vec<StationTemperatureReading>, ClientError> {
        let body = self.get_latest_feed(cancel)?;
        Ok(parse_latest_temperatures(&body)?)
    }

    pub fn get_latest_voltages(
        &self,
        cancel: &CancelToken,
    ) -> Result<Vec<StationVoltageReading>, ClientError> {
        let body = self.get_latest_feed(cancel)?;
        Ok(parse_latest_voltages(&body)?)
    }

    // -----------------------------------------------------------------------
    // Single-station series
    // -----------------------------------------------------------------------

    pub fn get_level_series(
        &self,
        station: &StationId,
        period: Period,
        cancel: &CancelToken,
    ) -> Result<Vec<StationWaterLevelReading>, ClientError> {
        let body = self.fetch(self.series_url_for(station, 1, period), ContentKind::Csv, cancel)?;
        Ok(parse_level_series(&body, station)?)
    }

    pub fn get_temperature_series(
        &self,
        station: &StationId,
        period: Period,
        cancel: &CancelToken,
    ) -> Result<Vec<StationTemperatureReading>, ClientError> {
        let body = self.fetch(self.series_url_for(station, 2, period), ContentKind::Csv, cancel)?;
        Ok(parse_temperature_series(&body, station)?)
    }

    pub fn get_voltage_series(
        &self,
        station: &StationId,
        period: Period,
        cancel: &CancelToken,
    ) -> Result<Vec<StationVoltageReading>, ClientError> {
        let body = self.fetch(self.series_url_for(station, 3, period), ContentKind::Csv, cancel)?;
        Ok(parse_voltage_series(&body, station)?)
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    /// Water levels of every station in a group, pivoted out of the matrix.
    /// Ids outside `1..=28` are rejected before any request is made.
    pub fn get_group_water_levels(
        &self,
        group: u8,
        cancel: &CancelToken,
    ) -> Result<Vec<GroupReading>, ClientError> {
        let group = GroupId::new(group).ok_or(ClientError::InvalidGroup(group))?;
        let body = self.fetch(self.group_url(group), ContentKind::Csv, cancel)?;
        Ok(parse_group_csv(&body)?)
    }

    fn fetch(&self, url: String, content: ContentKind, cancel: &CancelToken) -> Result<String, ClientError> {
        let response = self.transport.fetch(&Request::get(url, content), cancel)?;
        Ok(response.body)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
