/// SQLite store, one row per reading.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE waterlevel_readings (
///     station_id   TEXT NOT NULL,
///     station_name TEXT NOT NULL,
///     datetime     TEXT NOT NULL,
///     value        REAL NOT NULL
/// );
/// CREATE INDEX idx_waterlevel_readings_station_datetime
///     ON waterlevel_readings(station_id, datetime);
/// ```
///
/// The table name is configurable so temperature or voltage streams can share
/// a database file. `rusqlite::Connection` is not `Sync`, so it sits behind a
/// `Mutex`.

use rusqlite::{Connection, OptionalExtension, params};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Store, StoreError, StoreRecord};

pub const DEFAULT_TABLE: &str = "waterlevel_readings";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteStore {
    pub fn open(path: &str, table: &str) -> Result<Self, StoreError> {
        if path.is_empty() {
            return Err(StoreError::EmptyPath);
        }
        let table = validate_table(table)?;
        Self::with_connection(Connection::open(path)?, table)
    }

    /// In-memory database, gone when the store is dropped.
    pub fn open_in_memory(table: &str) -> Result<Self, StoreError> {
        let table = validate_table(table)?;
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: String) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
            table,
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                station_id   TEXT NOT NULL,
                station_name TEXT NOT NULL,
                datetime     TEXT NOT NULL,
                value        REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_station_datetime
                ON {table}(station_id, datetime);",
            table = self.table
        ))?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<StoreRecord> {
        Ok(StoreRecord {
            station_id: row.get(0)?,
            station_name: row.get(1)?,
            datetime: row.get(2)?,
            value: row.get(3)?,
        })
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table(table: &str) -> Result<String, StoreError> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(table.to_string())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

impl Store for SqliteStore {
    fn save(&self, record: &StoreRecord) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO {} (station_id, station_name, datetime, value) VALUES (?1, ?2, ?3, ?4)",
                self.table
            ),
            params![record.station_id, record.station_name, record.datetime, record.value],
        )?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<StoreRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT station_id, station_name, datetime, value FROM {} ORDER BY rowid ASC",
            self.table
        ))?;
        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn get_last_reading_for_station(&self, station_id: &str) -> Result<StoreRecord, StoreError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!(
                    "SELECT station_id, station_name, datetime, value FROM {}
                     WHERE station_id = ?1
                     ORDER BY datetime DESC, rowid DESC
                     LIMIT 1",
                    self.table
                ),
                [station_id],
                Self::row_to_record,
            )
            .optional()?;
        record.ok_or_else(|| StoreError::NoReading(station_id.to_string()))
    }
}
