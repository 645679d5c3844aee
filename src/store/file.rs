/// Append-only file store.
///
/// Each `save` appends one JSON array followed by a newline:
///
/// ```text
/// [{"station_id":"0000001041","station_name":"Sandy Mills","datetime":"2021-06-15T22:00:00Z","value":1715.0}]
/// [{"station_id":"0000001043",...},{"station_id":"0000001044",...}]
/// ```
///
/// `list` replays the file by decoding top-level arrays until end of stream.
/// Lookups scan the whole file; this backend is meant for small deployments
/// and tests.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::{Store, StoreError, StoreRecord};

pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// The file is created on first save; a missing file reads as empty.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(StoreError::EmptyPath);
        }
        Ok(Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends all records as a single array. An empty batch writes nothing.
    pub fn save_batch(&self, records: &[StoreRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, records)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<StoreRecord>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let batches = serde_json::Deserializer::from_reader(BufReader::new(file))
            .into_iter::<Vec<StoreRecord>>();

        let mut records = Vec::new();
        for batch in batches {
            records.extend(batch?);
        }
        Ok(records)
    }
}

impl Store for FileStore {
    fn save(&self, record: &StoreRecord) -> Result<(), StoreError> {
        self.save_batch(std::slice::from_ref(record))
    }

    fn list(&self) -> Result<Vec<StoreRecord>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_all()
    }

    fn get_last_reading_for_station(&self, station_id: &str) -> Result<StoreRecord, StoreError> {
        let records = self.list()?;

        // `>=` so the later append wins a datetime tie.
        let mut latest: Option<StoreRecord> = None;
        for record in records.into_iter().filter(|r| r.station_id == station_id) {
            if latest.as_ref().is_none_or(|l| record.datetime >= l.datetime) {
                latest = Some(record);
            }
        }
        latest.ok_or_else(|| StoreError::NoReading(station_id.to_string()))
    }
}
