/// Persistence backends for reading streams.
///
/// A store holds flat `StoreRecord`s and knows nothing about units or the
/// reading model; `crate::repo` owns that translation. Every backend answers
/// "latest record for station X" and reports an absent station with the
/// `StoreError::NoReading` sentinel so callers can tell it apart from real
/// storage failures.
///
/// ```text
/// store
/// ├── file    — append-only file of JSON arrays
/// └── sqlite  — one table per stream (rusqlite)
/// ```

pub mod file;
pub mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-width UTC timestamp format of `StoreRecord::datetime`.
/// Lexicographic order of formatted values is chronological order.
pub const RECORD_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One persisted reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub station_id: String,
    pub station_name: String,
    pub datetime: String,
    pub value: f64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no reading for station {0}")]
    NoReading(String),
    #[error("empty store path")]
    EmptyPath,
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("store json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid table name {0:?}")]
    InvalidTable(String),
    #[error("malformed record: {0}")]
    Malformed(String),
}

pub trait Store: Send + Sync {
    fn save(&self, record: &StoreRecord) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<StoreRecord>, StoreError>;

    /// Most recent record by `datetime`; `StoreError::NoReading` if the
    /// station has none.
    fn get_last_reading_for_station(&self, station_id: &str) -> Result<StoreRecord, StoreError>;
}

/// Which backend a stream is persisted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    File,
    Sqlite,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Backend::File),
            "sqlite" => Ok(Backend::Sqlite),
            other => Err(format!("unknown store backend {:?}, expecting 'file' or 'sqlite'", other)),
        }
    }
}

/// Opens the configured backend. `table` is only used by SQLite.
pub fn open(backend: Backend, path: &str, table: &str) -> Result<Box<dyn Store>, StoreError> {
    match backend {
        Backend::File => Ok(Box::new(FileStore::new(path)?)),
        Backend::Sqlite => Ok(Box::new(SqliteStore::open(path, table)?)),
    }
}

#[cfg(test)]
pub(crate) fn record(station: &str, datetime: &str, value: f64) -> StoreRecord {
    StoreRecord {
        station_id: station.to_string(),
        station_name: format!("Station {}", station),
        datetime: datetime.to_string(),
        value,
    }
}
