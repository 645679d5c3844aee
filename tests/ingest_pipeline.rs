/// Integration tests for the ingestion pipeline
///
/// These tests verify:
/// 1. Full cycle: latest feed + group matrix → decode → repository → store
/// 2. Re-polling an unchanged feed or group matrix stores nothing new
/// 3. Stored history survives reopening the store (file and SQLite)
/// 4. Transient transport failures are retried inside a cycle
/// 5. The HTTP facade serves the catalog the poller published
///
/// No network or external database is needed: the upstream is a routed fake
/// `HttpSend` and stores live in a temp directory.
///
/// Run with: cargo test --test ingest_pipeline

use rivers_service::config::Config;
use rivers_service::endpoint::route;
use rivers_service::groups::GroupId;
use rivers_service::ingest::client::RiversClient;
use rivers_service::ingest::transport::{
    BreakerPolicy, CancelToken, HttpSend, PreparedRequest, Response, RetryPolicy, SendError,
    SendErrorKind, Transport,
};
use rivers_service::model::{Millimeters, StationId};
use rivers_service::poller::{Poller, PollerSettings};
use rivers_service::repo::{ReadingsRepo, RepoError};
use rivers_service::store::{self, Backend};

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BASE: &str = "http://gauges.test";

const LATEST: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature",
     "properties": {"station_ref": "0000001041", "station_name": "Sandy Mills", "sensor_ref": "0001",
                    "region_id": 3, "datetime": "2021-06-15T22:00:00Z", "value": "1.715", "err_code": 99},
     "geometry": {"type": "Point", "coordinates": [-7.575758, 54.838318]}},
    {"type": "Feature",
     "properties": {"station_ref": "0000001041", "station_name": "Sandy Mills", "sensor_ref": "0002",
                    "region_id": 3, "datetime": "2021-06-15T22:00:00Z", "value": "14.800", "err_code": 99},
     "geometry": {"type": "Point", "coordinates": [-7.575758, 54.838318]}},
    {"type": "Feature",
     "properties": {"station_ref": "0000001043", "station_name": "Ballybofey", "sensor_ref": "0001",
                    "region_id": 3, "datetime": "2021-06-15T21:45:00Z", "value": "0.293", "err_code": 99},
     "geometry": {"type": "Point", "coordinates": [-7.790749, 54.799769]}}
  ]
}"#;

const GROUP_22: &str = "Datetime,Sandy Mills, Ballybofey ,Lifford\n\
2021-06-15 22:15,1.720,0.295,2.010\n\
2021-06-15 22:30,1.731,,2.040\n";

// ---------------------------------------------------------------------------
// Fake upstream
// ---------------------------------------------------------------------------

/// Answers by exact URL; unknown URLs get a 404. The first `flaky` sends
/// fail with a connect error.
struct RoutedSender {
    routes: HashMap<String, String>,
    flaky: Mutex<usize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl RoutedSender {
    fn new(routes: &[(&str, &str)], flaky: usize) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|(path, body)| (format!("{}{}", BASE, path), body.to_string()))
                .collect(),
            flaky: Mutex::new(flaky),
            requests: Arc::default(),
        }
    }
}

impl HttpSend for RoutedSender {
    fn send(&self, request: &PreparedRequest) -> Result<Response, SendError> {
        self.requests.lock().unwrap().push(request.url.clone());

        let mut flaky = self.flaky.lock().unwrap();
        if *flaky > 0 {
            *flaky -= 1;
            return Err(SendError::new(SendErrorKind::Connect, "connection reset by peer"));
        }

        Ok(match self.routes.get(&request.url) {
            Some(body) => Response { status: 200, body: body.clone() },
            None => Response {
                status: 404,
                body: r#"{"code": 404, "message": "not found"}"#.to_string(),
            },
        })
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_attempts: Some(6),
        max_elapsed: Some(Duration::from_secs(5)),
    }
}

fn client(sender: RoutedSender) -> RiversClient {
    let transport = Transport::new(
        Box::new(sender),
        fast_retry(),
        BreakerPolicy::default(),
        Duration::from_secs(5),
    );
    RiversClient::new(BASE, transport)
}

fn open_repo(backend: Backend, path: &Path) -> Arc<ReadingsRepo> {
    let store = store::open(backend, path.to_str().unwrap(), "waterlevel_readings")
        .expect("store should open");
    Arc::new(ReadingsRepo::new(store))
}

fn poller(sender: RoutedSender, repo: Arc<ReadingsRepo>, groups: &[u8]) -> Poller {
    let settings = PollerSettings {
        workers: 3,
        groups: groups.iter().filter_map(|g| GroupId::new(*g)).collect(),
        ..PollerSettings::default()
    };
    Poller::new(client(sender), repo, settings)
}

fn sandy() -> StationId {
    StationId::parse("0000001041").unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_full_cycle_with_group_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(Backend::Sqlite, &dir.path().join("rivers.db"));
    let sender = RoutedSender::new(
        &[("/geojson/latest", LATEST), ("/data/group/group_22.csv", GROUP_22)],
        0,
    );
    let poller = poller(sender, Arc::clone(&repo), &[22]);

    let report = poller.run_cycle(&CancelToken::new()).expect("cycle should succeed");

    // 2 latest levels + Sandy Mills x2 + Ballybofey x1 from the group;
    // Lifford is not in the catalog.
    assert_eq!(report.saved, 5);
    assert_eq!(report.unresolved, 2);
    assert_eq!(report.duplicates, 0);

    let last = repo.get_last_reading_for_station(&sandy()).unwrap();
    assert_eq!(last.value, Millimeters(1731));
    assert_eq!(last.read_time.to_rfc3339(), "2021-06-15T22:30:00+00:00");
}

#[test]
fn test_repolling_group_matrix_stores_each_key_once() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(Backend::Sqlite, &dir.path().join("rivers.db"));
    let sender = RoutedSender::new(
        &[("/geojson/latest", LATEST), ("/data/group/group_22.csv", GROUP_22)],
        0,
    );
    let poller = poller(sender, Arc::clone(&repo), &[22]);

    assert_eq!(poller.run_cycle(&CancelToken::new()).unwrap().saved, 5);
    let second = poller.run_cycle(&CancelToken::new()).unwrap();
    assert_eq!(second.saved, 0);
    assert_eq!(second.duplicates, 5);

    let stored = repo.list().unwrap();
    let keys: HashSet<(StationId, String)> = stored
        .iter()
        .map(|r| (r.station_id.clone(), r.read_time.to_rfc3339()))
        .collect();
    assert_eq!(stored.len(), keys.len(), "a (station, read_time) key was stored twice");
    assert_eq!(stored.len(), 5);
}

#[test]
fn test_unchanged_feed_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(Backend::File, &dir.path().join("levels.json"));
    let sender = RoutedSender::new(&[("/geojson/latest", LATEST)], 0);
    let poller = poller(sender, Arc::clone(&repo), &[]);

    assert_eq!(poller.run_cycle(&CancelToken::new()).unwrap().saved, 2);
    let second = poller.run_cycle(&CancelToken::new()).unwrap();
    assert_eq!(second.saved, 0);
    assert_eq!(second.duplicates, 2);
    assert_eq!(repo.list().unwrap().len(), 2);
}

#[test]
fn test_history_survives_reopening_store() {
    let dir = tempfile::tempdir().unwrap();

    for (backend, file) in [(Backend::File, "levels.json"), (Backend::Sqlite, "rivers.db")] {
        let path = dir.path().join(file);
        {
            let repo = open_repo(backend, &path);
            let sender = RoutedSender::new(&[("/geojson/latest", LATEST)], 0);
            poller(sender, repo, &[]).run_cycle(&CancelToken::new()).unwrap();
        }

        let reopened = open_repo(backend, &path);
        let last = reopened.get_last_reading_for_station(&sandy()).unwrap();
        assert_eq!(last.value, Millimeters(1715), "{:?}", backend);

        let replay = reopened.add(&last);
        assert!(matches!(replay, Err(RepoError::Duplicate { .. })), "{:?}", backend);
    }
}

#[test]
fn test_transient_failures_are_retried_within_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(Backend::Sqlite, &dir.path().join("rivers.db"));
    let sender = RoutedSender::new(&[("/geojson/latest", LATEST)], 3);
    let requests = Arc::clone(&sender.requests);
    let poller = poller(sender, Arc::clone(&repo), &[]);

    let report = poller.run_cycle(&CancelToken::new()).unwrap();
    assert_eq!(report.saved, 2);
    assert_eq!(requests.lock().unwrap().len(), 4, "3 failures + 1 success");
}

#[test]
fn test_missing_group_does_not_abort_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(Backend::Sqlite, &dir.path().join("rivers.db"));
    let sender = RoutedSender::new(&[("/geojson/latest", LATEST)], 0);
    let poller = poller(sender, repo, &[7]);

    let report = poller.run_cycle(&CancelToken::new()).unwrap();
    assert_eq!(report.saved, 2);
    assert_eq!(report.groups_failed, 1);
}

#[test]
fn test_endpoint_serves_published_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open_repo(Backend::Sqlite, &dir.path().join("rivers.db"));
    let sender = RoutedSender::new(&[("/geojson/latest", LATEST)], 0);
    let poller = poller(sender, repo, &[]);
    poller.run_cycle(&CancelToken::new()).unwrap();

    let catalog = poller.catalog();
    let catalog = catalog.read().unwrap();
    let (status, body) = route("GET", "/stations/0000001041", &catalog);
    assert_eq!(status, 200);
    assert_eq!(body["features"].as_array().map(Vec::len), Some(2));

    let (status, body) = route("GET", "/health", &catalog);
    assert_eq!(status, 200);
    assert_eq!(body["stations"], 2);
}

#[test]
fn test_config_selects_store_backend() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("levels.json");
    let mut config = Config::from_toml_str(&format!(
        "[store]\nbackend = \"file\"\npath = {:?}\n",
        path.to_str().unwrap()
    ))
    .unwrap();
    config
        .apply_env_overrides(|key| (key == "RIVERS_POLL_INTERVAL_SECS").then(|| "120".to_string()))
        .unwrap();
    config.validate().unwrap();
    assert_eq!(config.poll_interval(), Duration::from_secs(120));

    let store = store::open(config.store.backend, &config.store.path, &config.store.table).unwrap();
    let repo: ReadingsRepo = ReadingsRepo::new(store);
    let sender = RoutedSender::new(&[("/geojson/latest", LATEST)], 0);
    poller(sender, Arc::new(repo), &[]).run_cycle(&CancelToken::new()).unwrap();

    assert!(path.exists(), "file backend should have written {}", path.display());
}
