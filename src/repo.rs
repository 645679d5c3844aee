/// Deduplicating repository over a `Store`.
///
/// `(station_id, read_time)` is the natural key of a reading stream. The
/// upstream feed republishes a station's latest value until a new one
/// arrives, so the same reading is offered on every poll; `add` only writes it
/// when it differs from the station's most recent stored reading.
///
/// The check-then-save in `add` runs under a lock scoped to the station, so
/// concurrent workers never interleave for one station while unrelated
/// stations proceed in parallel.
///
/// This is also the only place readings are translated to and from the flat
/// `StoreRecord` shape.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::model::{Millimeters, Quantity, StationId, StationReading};
use crate::store::{RECORD_DATETIME_FORMAT, Store, StoreError, StoreRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("duplicate reading for station {station} at {read_time}")]
    Duplicate {
        station: StationId,
        read_time: DateTime<Utc>,
    },
    #[error("no reading for station {0}")]
    NoReading(StationId),
    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },
}

impl RepoError {
    fn store(op: &'static str) -> impl FnOnce(StoreError) -> RepoError {
        move |source| RepoError::Store { op, source }
    }
}

pub struct ReadingsRepo<Q: Quantity = Millimeters> {
    store: Box<dyn Store>,
    station_locks: Mutex<HashMap<StationId, Arc<Mutex<()>>>>,
    _quantity: PhantomData<fn() -> Q>,
}

impl<Q: Quantity> ReadingsRepo<Q> {
    pub fn new(store: Box<dyn Store>) -> Self {
        Self {
            store,
            station_locks: Mutex::new(HashMap::new()),
            _quantity: PhantomData,
        }
    }

    /// Saves `reading` unless the station's latest stored reading has the
    /// same timestamp, in which case `RepoError::Duplicate` is returned and
    /// nothing is written. Never retries.
    pub fn add(&self, reading: &StationReading<Q>) -> Result<(), RepoError> {
        let lock = self.station_lock(&reading.station_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let record = to_record(reading);
        match self.store.get_last_reading_for_station(reading.station_id.as_str()) {
            Ok(latest) if latest.datetime == record.datetime => {
                return Err(RepoError::Duplicate {
                    station: reading.station_id.clone(),
                    read_time: reading.read_time,
                });
            }
            Ok(_) | Err(StoreError::NoReading(_)) => {}
            Err(e) => return Err(RepoError::Store { op: "add", source: e }),
        }

        self.store.save(&record).map_err(RepoError::store("add"))
    }

    /// Every stored reading of this stream, in store order.
    pub fn list(&self) -> Result<Vec<StationReading<Q>>, RepoError> {
        self.store
            .list()
            .and_then(|records| records.iter().map(from_record::<Q>).collect())
            .map_err(RepoError::store("list"))
    }

    pub fn get_last_reading_for_station(
        &self,
        station: &StationId,
    ) -> Result<StationReading<Q>, RepoError> {
        match self.store.get_last_reading_for_station(station.as_str()) {
            Ok(record) => from_record(&record).map_err(RepoError::store("get last reading")),
            Err(StoreError::NoReading(_)) => Err(RepoError::NoReading(station.clone())),
            Err(e) => Err(RepoError::Store { op: "get last reading", source: e }),
        }
    }

    fn station_lock(&self, station: &StationId) -> Arc<Mutex<()>> {
        let mut locks = self.station_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(station.clone()).or_default())
    }
}

// ---------------------------------------------------------------------------
// Record translation
// ---------------------------------------------------------------------------

fn to_record<Q: Quantity>(reading: &StationReading<Q>) -> StoreRecord {
    StoreRecord {
        station_id: reading.station_id.as_str().to_string(),
        station_name: reading.name.clone().unwrap_or_default(),
        datetime: reading.read_time.format(RECORD_DATETIME_FORMAT).to_string(),
        value: reading.value.to_store_value(),
    }
}

fn from_record<Q: Quantity>(record: &StoreRecord) -> Result<StationReading<Q>, StoreError> {
    let station_id = StationId::parse(&record.station_id)
        .map_err(|_| StoreError::Malformed(format!("station id {:?}", record.station_id)))?;
    let read_time = NaiveDateTime::parse_from_str(&record.datetime, RECORD_DATETIME_FORMAT)
        .map_err(|e| StoreError::Malformed(format!("datetime {:?}: {}", record.datetime, e)))?
        .and_utc();
    let value = Q::from_store_value(record.value).ok_or_else(|| {
        StoreError::Malformed(format!("value {} is not a valid {} reading", record.value, Q::UNIT))
    })?;

    let name = record.station_name.trim();
    Ok(StationReading {
        station_id,
        name: (!name.is_empty()).then(|| name.to_string()),
        region_id: None,
        read_time,
        value,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Celsius;
    use crate::store::{FileStore, SqliteStore, StoreRecord};
    use chrono::{Duration, TimeZone};

    fn level(station: &str, minute: u32, mm: i64) -> StationReading<Millimeters> {
        StationReading {
            station_id: StationId::parse(station).unwrap(),
            name: Some("Sandy Mills".to_string()),
            region_id: Some(3),
            read_time: Utc.with_ymd_and_hms(2021, 6, 15, 22, minute, 0).unwrap(),
            value: Millimeters(mm),
        }
    }

    fn sqlite_repo() -> ReadingsRepo {
        ReadingsRepo::new(Box::new(SqliteStore::open_in_memory("waterlevel_readings").unwrap()))
    }

    #[test]
    fn test_add_same_reading_twice_stores_once() {
        let dir = tempfile::tempdir().unwrap();
        let file_repo: ReadingsRepo =
            ReadingsRepo::new(Box::new(FileStore::new(dir.path().join("levels.json")).unwrap()));

        for repo in [sqlite_repo(), file_repo] {
            let reading = level("0000001041", 0, 1715);
            repo.add(&reading).unwrap();
            assert!(matches!(repo.add(&reading), Err(RepoError::Duplicate { .. })));
            assert_eq!(repo.list().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_duplicate_detected_even_if_value_changed() {
        let repo = sqlite_repo();
        repo.add(&level("0000001041", 0, 1715)).unwrap();
        let result = repo.add(&level("0000001041", 0, 9999));
        assert!(matches!(result, Err(RepoError::Duplicate { .. })));
    }

    #[test]
    fn test_new_timestamp_saves_incoming_reading() {
        let repo = sqlite_repo();
        repo.add(&level("0000001041", 0, 1715)).unwrap();
        repo.add(&level("0000001041", 15, 1720)).unwrap();

        let last = repo.get_last_reading_for_station(&StationId::parse("0000001041").unwrap()).unwrap();
        assert_eq!(last.value, Millimeters(1720));
        assert_eq!(repo.list().unwrap().len(), 2);
    }

    #[test]
    fn test_last_reading_monotonic() {
        let repo = sqlite_repo();
        for (minute, mm) in [(0, 1), (15, 2), (30, 3)] {
            repo.add(&level("0000001041", minute, mm)).unwrap();
        }
        let last = repo.get_last_reading_for_station(&StationId::parse("0000001041").unwrap()).unwrap();
        assert_eq!(last.read_time, Utc.with_ymd_and_hms(2021, 6, 15, 22, 30, 0).unwrap());
    }

    #[test]
    fn test_same_timestamp_on_other_station_is_not_duplicate() {
        let repo = sqlite_repo();
        repo.add(&level("0000001041", 0, 1715)).unwrap();
        repo.add(&level("0000001043", 0, 293)).unwrap();
        assert_eq!(repo.list().unwrap().len(), 2);
    }

    #[test]
    fn test_no_reading_is_distinct_error() {
        let repo = sqlite_repo();
        let station = StationId::parse("0000001041").unwrap();
        assert!(matches!(
            repo.get_last_reading_for_station(&station),
            Err(RepoError::NoReading(id)) if id == station
        ));
    }

    #[test]
    fn test_reading_round_trips_through_record() {
        let repo = sqlite_repo();
        let reading = level("0000001041", 45, 1715);
        repo.add(&reading).unwrap();

        let stored = repo.list().unwrap().remove(0);
        assert_eq!(stored.station_id, reading.station_id);
        assert_eq!(stored.name, reading.name);
        assert_eq!(stored.read_time, reading.read_time);
        assert_eq!(stored.value, reading.value);
        assert_eq!(stored.region_id, None, "region is not persisted");
    }

    #[test]
    fn test_record_datetime_is_fixed_width_utc() {
        let record = to_record(&level("0000001041", 5, 1));
        assert_eq!(record.datetime, "2021-06-15T22:05:00Z");
        assert_eq!(record.value, 1.0);
    }

    #[test]
    fn test_malformed_stored_record_is_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("levels.json");
        let store = FileStore::new(&path).unwrap();
        store
            .save_batch(&[StoreRecord {
                station_id: "0000001041".into(),
                station_name: String::new(),
                datetime: "15/06/2021 22:00".into(),
                value: 1.0,
            }])
            .unwrap();

        let repo: ReadingsRepo = ReadingsRepo::new(Box::new(store));
        assert!(matches!(
            repo.list(),
            Err(RepoError::Store { op: "list", source: StoreError::Malformed(_) })
        ));
    }

    #[test]
    fn test_fractional_level_in_store_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("levels.json")).unwrap();
        store
            .save_batch(&[StoreRecord {
                station_id: "1".into(),
                station_name: "x".into(),
                datetime: "2021-06-15T22:00:00Z".into(),
                value: 1.5,
            }])
            .unwrap();

        let repo: ReadingsRepo = ReadingsRepo::new(Box::new(store));
        let result = repo.get_last_reading_for_station(&StationId::parse("1").unwrap());
        assert!(matches!(result, Err(RepoError::Store { source: StoreError::Malformed(_), .. })));
    }

    #[test]
    fn test_temperature_stream() {
        let repo: ReadingsRepo<Celsius> =
            ReadingsRepo::new(Box::new(SqliteStore::open_in_memory("temperature_readings").unwrap()));
        let reading = StationReading {
            station_id: StationId::parse("0000001041").unwrap(),
            name: None,
            region_id: None,
            read_time: Utc.with_ymd_and_hms(2021, 6, 15, 22, 0, 0).unwrap(),
            value: Celsius(14.8),
        };
        repo.add(&reading).unwrap();
        assert_eq!(repo.list().unwrap(), vec![reading]);
    }

    #[test]
    fn test_concurrent_adds_of_one_reading_store_exactly_once() {
        let repo = Arc::new(sqlite_repo());
        let reading = level("0000001041", 0, 1715);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = Arc::clone(&repo);
                let reading = reading.clone();
                std::thread::spawn(move || repo.add(&reading).is_ok())
            })
            .collect();
        let saved = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|saved| *saved)
            .count();

        assert_eq!(saved, 1, "every other add must see the duplicate");
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_streams_for_many_stations() {
        let repo = Arc::new(sqlite_repo());
        let handles: Vec<_> = (1..=4)
            .map(|station| {
                let repo = Arc::clone(&repo);
                std::thread::spawn(move || {
                    let base = Utc.with_ymd_and_hms(2021, 6, 15, 0, 0, 0).unwrap();
                    for step in 0..10 {
                        let reading = StationReading {
                            station_id: StationId::parse(&station.to_string()).unwrap(),
                            name: None,
                            region_id: None,
                            read_time: base + Duration::minutes(15 * step),
                            value: Millimeters(step),
                        };
                        repo.add(&reading).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(repo.list().unwrap().len(), 40);
    }
}
