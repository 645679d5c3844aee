/// Polling daemon: upstream → decoders → repository on a fixed interval.
///
/// One cycle:
/// 1. Fetch the latest feed and decode water levels plus the station catalog.
///    A fetch or decode failure aborts the cycle before anything is written.
/// 2. Publish the catalog to the shared cache (read by the HTTP facade and
///    optionally written to disk).
/// 3. Add readings through the repository, one threadpool job per station so
///    a station's readings are added in time order while stations run in
///    parallel. Only readings newer than the station's last stored reading
///    are offered; group matrices repeat their whole window on every poll.
/// 4. For each configured group, fetch the group matrix, resolve station names
///    to ids through the catalog and add the resolved readings.
///
/// Duplicates and storage failures are counted in the `CycleReport` and
/// logged; they never abort a cycle.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, mpsc};
use std::time::{Duration, Instant};

use thiserror::Error;
use threadpool::ThreadPool;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::groups::GroupId;
use crate::ingest::client::{ClientError, RiversClient};
use crate::ingest::latest::water_levels_from;
use crate::ingest::transport::{CancelToken, FetchError};
use crate::model::{GroupReading, StationId, StationWaterLevelReading};
use crate::repo::{ReadingsRepo, RepoError};
use crate::stations::StationsLatest;

/// Catalog shared between the poller and the HTTP facade.
pub type SharedCatalog = Arc<RwLock<StationsLatest>>;

// ---------------------------------------------------------------------------
// Settings and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub interval: Duration,
    pub cycle_timeout: Duration,
    pub workers: usize,
    pub groups: Vec<GroupId>,
    pub catalog_path: Option<PathBuf>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
            cycle_timeout: Duration::from_secs(600),
            workers: 4,
            groups: Vec::new(),
            catalog_path: None,
        }
    }
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            cycle_timeout: config.cycle_timeout(),
            workers: config.poller.workers,
            groups: config.group_ids(),
            catalog_path: config.poller.catalog_path.as_ref().map(PathBuf::from),
        }
    }
}

/// Outcome counts of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub saved: usize,
    /// Readings at or before the station's last stored reading.
    pub duplicates: usize,
    /// Readings the repository failed to store.
    pub failed: usize,
    /// Group cells whose station name is not in the catalog.
    pub unresolved: usize,
    /// Group matrices that could not be fetched or decoded.
    pub groups_failed: usize,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.saved += other.saved;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
        self.unresolved += other.unresolved;
        self.groups_failed += other.groups_failed;
    }

    fn record(&mut self, station: &StationId, outcome: Result<(), RepoError>) {
        match outcome {
            Ok(()) => self.saved += 1,
            Err(RepoError::Duplicate { read_time, .. }) => {
                debug!(station = %station, %read_time, "reading already stored");
                self.duplicates += 1;
            }
            Err(e) => {
                warn!(station = %station, error = %e, "failed to store reading");
                self.failed += 1;
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("poll cycle aborted: {0}")]
    Client(#[from] ClientError),
}

impl PollError {
    fn is_interruption(&self) -> bool {
        matches!(
            self,
            PollError::Client(ClientError::Fetch(FetchError::Cancelled | FetchError::DeadlineExceeded))
        )
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub struct Poller {
    client: RiversClient,
    repo: Arc<ReadingsRepo>,
    catalog: SharedCatalog,
    settings: PollerSettings,
    pool: ThreadPool,
}

impl Poller {
    pub fn new(client: RiversClient, repo: Arc<ReadingsRepo>, settings: PollerSettings) -> Self {
        let pool = ThreadPool::with_name("rivers-ingest".to_string(), settings.workers.max(1));
        Self {
            client,
            repo,
            catalog: SharedCatalog::default(),
            settings,
            pool,
        }
    }

    /// Handle to the catalog cache; updated at the start of every cycle.
    pub fn catalog(&self) -> SharedCatalog {
        Arc::clone(&self.catalog)
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    /// Runs one fetch → decode → store pass.
    pub fn run_cycle(&self, cancel: &CancelToken) -> Result<CycleReport, PollError> {
        let stations = self.client.get_latest_stations(cancel)?;
        let readings = water_levels_from(&stations).map_err(ClientError::from)?;
        let index = stations.station_index();
        info!(
            stations = stations.station_count(),
            readings = readings.len(),
            "fetched latest feed"
        );
        self.publish_catalog(stations);

        let mut report = self.ingest(readings);

        for group in &self.settings.groups {
            match self.client.get_group_water_levels(group.get(), cancel) {
                Ok(cells) => {
                    let (resolved, unresolved) = resolve_group(*group, cells, &index);
                    report.unresolved += unresolved;
                    report.merge(self.ingest(resolved));
                }
                Err(e) => {
                    let e = PollError::from(e);
                    if e.is_interruption() {
                        return Err(e);
                    }
                    warn!(
                        group = %group,
                        name = group.name().unwrap_or("unnamed"),
                        error = %e,
                        "skipping group"
                    );
                    report.groups_failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Polls until `cancel` fires. Each cycle gets its own deadline; the
    /// wait between cycles is cancellable.
    pub fn run(&self, cancel: &CancelToken) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            groups = self.settings.groups.len(),
            "poller started"
        );
        for group in &self.settings.groups {
            info!(group = %group, name = group.name().unwrap_or("unnamed"), "polling group matrix");
        }

        while !cancel.is_cancelled() {
            let started = Instant::now();
            let cycle = cancel.with_timeout(self.settings.cycle_timeout);

            match self.run_cycle(&cycle) {
                Ok(report) => info!(
                    saved = report.saved,
                    duplicates = report.duplicates,
                    failed = report.failed,
                    unresolved = report.unresolved,
                    groups_failed = report.groups_failed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "poll cycle complete"
                ),
                Err(e) if cancel.is_cancelled() => {
                    debug!(error = %e, "poll cycle interrupted by shutdown");
                    break;
                }
                Err(e) => error!(error = %e, "poll cycle failed"),
            }

            let wait = self.settings.interval.saturating_sub(started.elapsed());
            if cancel.sleep(wait).is_err() {
                break;
            }
        }

        info!("poller stopped");
    }

    fn publish_catalog(&self, stations: StationsLatest) {
        if let Some(path) = &self.settings.catalog_path {
            if let Err(e) = stations.save(path) {
                warn!(path = %path.display(), error = %e, "failed to cache station catalog");
            }
        }
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = stations;
    }

    /// Adds readings on the pool, one job per station, and waits for all jobs.
    fn ingest(&self, readings: Vec<StationWaterLevelReading>) -> CycleReport {
        let mut by_station: BTreeMap<StationId, Vec<StationWaterLevelReading>> = BTreeMap::new();
        for reading in readings {
            by_station.entry(reading.station_id.clone()).or_default().push(reading);
        }

        let (tx, rx) = mpsc::channel();
        for (station, batch) in by_station {
            let repo = Arc::clone(&self.repo);
            let tx = tx.clone();
            self.pool.execute(move || {
                let _ = tx.send(add_newer(&repo, &station, batch));
            });
        }
        drop(tx);

        rx.iter().fold(CycleReport::default(), |mut total, report| {
            total.merge(report);
            total
        })
    }
}

/// Adds the readings of one station that are newer than its last stored
/// reading, oldest first. A reading at exactly the last stored time still goes
/// through `add` and comes back as a duplicate.
fn add_newer(
    repo: &ReadingsRepo,
    station: &StationId,
    mut batch: Vec<StationWaterLevelReading>,
) -> CycleReport {
    let mut report = CycleReport::default();
    let mut last = match repo.get_last_reading_for_station(station) {
        Ok(reading) => Some(reading.read_time),
        Err(RepoError::NoReading(_)) => None,
        Err(e) => {
            warn!(station = %station, error = %e, "failed to read last stored reading");
            report.failed = batch.len();
            return report;
        }
    };

    batch.sort_by_key(|r| r.read_time);
    for reading in &batch {
        if last.is_some_and(|t| reading.read_time < t) {
            report.duplicates += 1;
            continue;
        }
        let outcome = repo.add(reading);
        if outcome.is_ok() {
            last = Some(reading.read_time);
        }
        report.record(station, outcome);
    }
    report
}

/// Resolves group cells to station readings by display name. Returns the
/// resolved readings and the number of cells whose name is unknown.
fn resolve_group(
    group: GroupId,
    cells: Vec<GroupReading>,
    index: &HashMap<String, StationId>,
) -> (Vec<StationWaterLevelReading>, usize) {
    let mut resolved = Vec::with_capacity(cells.len());
    let mut unknown: BTreeMap<String, usize> = BTreeMap::new();

    for cell in cells {
        match index.get(&cell.station_name) {
            Some(id) => resolved.push(cell.into_station_reading(id.clone())),
            None => *unknown.entry(cell.station_name).or_default() += 1,
        }
    }

    for (name, count) in &unknown {
        warn!(
            group = %group,
            group_name = group.name().unwrap_or("unnamed"),
            station_name = %name,
            cells = count,
            "station not in catalog"
        );
    }
    (resolved, unknown.values().sum())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
