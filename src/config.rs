/// Service configuration loader - parses rivers.toml
///
/// Keeps deployment details (upstream URL, poll cadence, retry budget,
/// storage backend) out of the code so an operator can retune the poller
/// without recompiling. Every section is optional; a missing `rivers.toml`
/// runs with the defaults below.
///
/// Precedence, lowest to highest: built-in defaults, `rivers.toml`,
/// environment (`.env` is loaded first), command-line flags.
///
/// | variable                    | overrides               |
/// |-----------------------------|-------------------------|
/// | `RIVERS_BASE_URL`           | `upstream.base_url`     |
/// | `RIVERS_STORE_BACKEND`      | `store.backend`         |
/// | `RIVERS_STORE_PATH`         | `store.path`            |
/// | `RIVERS_POLL_INTERVAL_SECS` | `poller.interval_secs`  |

use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::groups::GroupId;
use crate::ingest::client::DEFAULT_BASE_URL;
use crate::ingest::transport::{BreakerPolicy, RetryPolicy};
use crate::store::Backend;
use crate::store::sqlite::DEFAULT_TABLE;

pub const DEFAULT_CONFIG_PATH: &str = "rivers.toml";

/// Upper bound for every interval, timeout and delay setting (30 days).
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub retry: RetryConfig,
    pub poller: PollerConfig,
    pub store: StoreConfig,
    pub endpoint: EndpointConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Backoff and retry budget for transport failures.
/// `max_attempts = 0` / `max_elapsed_secs = 0` mean unlimited.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub max_elapsed_secs: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_cool_down_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            max_attempts: 8,
            max_elapsed_secs: 300,
            breaker_failure_threshold: 5,
            breaker_cool_down_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_secs: u64,
    /// Deadline for one whole cycle, fetches and backoff included.
    pub cycle_timeout_secs: u64,
    pub workers: usize,
    /// Group CSV matrices polled in addition to the latest feed.
    pub groups: Vec<u8>,
    /// Where the station catalog is cached after each cycle (optional).
    pub catalog_path: Option<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 900,
            cycle_timeout_secs: 600,
            workers: 4,
            groups: Vec::new(),
            catalog_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    pub path: String,
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            path: "rivers.db".to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads a config file; the file must exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Full startup sequence for the binaries: `.env`, the config file
    /// (explicit path must exist, the default path may be absent), process
    /// environment overrides, validation.
    pub fn from_environment(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match explicit_path {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(DEFAULT_CONFIG_PATH)?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `RIVERS_*` overrides read through `lookup`.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("RIVERS_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Some(backend) = lookup("RIVERS_STORE_BACKEND") {
            self.store.backend = backend.parse().map_err(ConfigError::Invalid)?;
        }
        if let Some(path) = lookup("RIVERS_STORE_PATH") {
            self.store.path = path;
        }
        if let Some(secs) = lookup("RIVERS_POLL_INTERVAL_SECS") {
            self.poller.interval_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("RIVERS_POLL_INTERVAL_SECS={:?} is not a number", secs))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.upstream.base_url.trim().is_empty() {
            return invalid("upstream.base_url must not be empty".into());
        }
        if self.upstream.request_timeout_secs == 0 {
            return invalid("upstream.request_timeout_secs must be > 0".into());
        }
        if self.poller.interval_secs == 0 {
            return invalid("poller.interval_secs must be > 0".into());
        }
        if self.poller.cycle_timeout_secs == 0 {
            return invalid("poller.cycle_timeout_secs must be > 0".into());
        }
        if self.poller.workers == 0 {
            return invalid("poller.workers must be > 0".into());
        }
        let limits = [
            ("upstream.request_timeout_secs", self.upstream.request_timeout_secs),
            ("poller.interval_secs", self.poller.interval_secs),
            ("poller.cycle_timeout_secs", self.poller.cycle_timeout_secs),
            ("retry.base_delay_ms", self.retry.base_delay_ms / 1000),
            ("retry.max_delay_ms", self.retry.max_delay_ms / 1000),
            ("retry.max_elapsed_secs", self.retry.max_elapsed_secs),
            ("retry.breaker_cool_down_secs", self.retry.breaker_cool_down_secs),
        ];
        if let Some((key, _)) = limits.iter().find(|(_, secs)| *secs > MAX_DURATION_SECS) {
            return invalid(format!("{} exceeds {} seconds", key, MAX_DURATION_SECS));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return invalid(format!(
                "retry.max_delay_ms ({}) is less than retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            ));
        }
        if let Some(bad) = self.poller.groups.iter().find(|id| GroupId::new(**id).is_none()) {
            return invalid(format!("poller.groups: group id {} outside 1..=28", bad));
        }
        if self.store.path.trim().is_empty() {
            return invalid("store.path must not be empty".into());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Derived settings
    // -----------------------------------------------------------------------

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poller.interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.poller.cycle_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let r = &self.retry;
        RetryPolicy {
            base_delay: Duration::from_millis(r.base_delay_ms),
            max_delay: Duration::from_millis(r.max_delay_ms),
            max_attempts: (r.max_attempts > 0).then_some(r.max_attempts),
            max_elapsed: (r.max_elapsed_secs > 0).then(|| Duration::from_secs(r.max_elapsed_secs)),
        }
    }

    pub fn breaker_policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: self.retry.breaker_failure_threshold,
            cool_down: Duration::from_secs(self.retry.breaker_cool_down_secs),
        }
    }

    /// Configured groups; only meaningful after `validate`.
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.poller.groups.iter().filter_map(|id| GroupId::new(*id)).collect()
    }
}
