/// Station catalog: the full GeoJSON document behind `GET /geojson/latest`.
///
/// The ingest decoders only need a handful of properties, but the HTTP facade
/// republishes the whole document (geometry, CRS, per-sensor links), so the
/// catalog keeps every field the upstream sends. It is the single source of
/// truth for mapping station display names to station references; group CSV
/// files identify stations by name only.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::{DecodeError, StationId};

// ---------------------------------------------------------------------------
// GeoJSON structures
// ---------------------------------------------------------------------------

/// Latest readings of every sensor, one GeoJSON feature per sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationsLatest {
    #[serde(rename = "type", default = "feature_collection")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<Crs>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

fn feature_collection() -> String {
    "FeatureCollection".to_string()
}

impl Default for StationsLatest {
    fn default() -> Self {
        Self {
            kind: feature_collection(),
            crs: None,
            features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crs {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A single sensor installed at a gauge station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub properties: SensorProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProperties {
    pub station_ref: String,
    #[serde(default)]
    pub station_name: String,
    pub sensor_ref: String,
    #[serde(default)]
    pub region_id: Option<i64>,
    pub datetime: String,
    pub value: String,  // decimal as a STRING
    #[serde(default)]
    pub err_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<f64>,  // [lon, lat]
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading station catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("station catalog {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: DecodeError,
    },
    #[error("encoding station catalog: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Loading and saving
// ---------------------------------------------------------------------------

impl StationsLatest {
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(json).map_err(|e| DecodeError::Json(e.to_string()))
    }

    /// Loads a catalog previously written by `save` (or a raw upstream dump).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents).map_err(|source| CatalogError::Decode {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CatalogError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn filtered(&self, keep: impl Fn(&SensorProperties) -> bool) -> Self {
        Self {
            kind: self.kind.clone(),
            crs: self.crs.clone(),
            features: self
                .features
                .iter()
                .filter(|f| keep(&f.properties))
                .cloned()
                .collect(),
        }
    }

    /// All sensors of the station with the given reference. Unknown refs
    /// yield an empty collection, not an error.
    pub fn by_id(&self, station_ref: &str) -> Self {
        self.filtered(|p| p.station_ref == station_ref)
    }

    pub fn by_name(&self, name: &str) -> Self {
        self.filtered(|p| p.station_name == name)
    }

    pub fn by_region(&self, region_id: i64) -> Self {
        self.filtered(|p| p.region_id == Some(region_id))
    }

    pub fn by_station_and_sensor(&self, station_ref: &str, sensor_ref: &str) -> Self {
        self.filtered(|p| p.station_ref == station_ref && p.sensor_ref == sensor_ref)
    }

    /// Number of distinct stations (features are per sensor).
    pub fn station_count(&self) -> usize {
        let mut refs: Vec<&str> = self
            .features
            .iter()
            .map(|f| f.properties.station_ref.as_str())
            .collect();
        refs.sort_unstable();
        refs.dedup();
        refs.len()
    }

    /// Maps trimmed station display names to station references.
    ///
    /// Features with an unusable `station_ref` are left out. If two stations
    /// share a name the first one in feed order wins.
    pub fn station_index(&self) -> HashMap<String, StationId> {
        let mut index = HashMap::new();
        for feature in &self.features {
            let name = feature.properties.station_name.trim();
            if name.is_empty() {
                continue;
            }
            if let Ok(id) = StationId::parse(&feature.properties.station_ref) {
                index.entry(name.to_string()).or_insert(id);
            }
        }
        index
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
