//! Plugin configuration loaded from `config/weather.yaml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use geo_cache::CacheConfig;
use weather_common::{Position, WeatherError, WeatherResult};

use crate::scheduler::machine::{
    SchedulerConfig, DEFAULT_FETCH_MAX_RETRIES, DEFAULT_FETCH_RETRY_INTERVAL,
    DEFAULT_NO_POSITION_MAX_RETRIES, DEFAULT_NO_POSITION_RETRY_INTERVAL, DEFAULT_WAKE_INTERVAL,
};

/// Accepted poll intervals, in minutes.
pub const POLL_INTERVALS: [u32; 3] = [15, 30, 60];
pub const DEFAULT_POLL_INTERVAL_MINUTES: u32 = 60;

/// Fetch interval and cache max age. One value feeds both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPollInterval", into = "u32")]
pub struct PollInterval(u32);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPollInterval {
    Number(f64),
    Text(String),
}

impl PollInterval {
    /// Interpret a configured value, falling back to the default for
    /// anything that is not one of [`POLL_INTERVALS`].
    pub fn from_minutes(minutes: f64) -> Self {
        if minutes.is_finite() && minutes.fract() == 0.0 {
            if let Some(&m) = POLL_INTERVALS.iter().find(|&&m| f64::from(m) == minutes) {
                return Self(m);
            }
        }
        warn!(
            value = minutes,
            fallback = DEFAULT_POLL_INTERVAL_MINUTES,
            "Unsupported poll interval, using default"
        );
        Self::default()
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(minutes) => Self::from_minutes(minutes),
            Err(_) => {
                warn!(
                    value = raw,
                    fallback = DEFAULT_POLL_INTERVAL_MINUTES,
                    "Unparsable poll interval, using default"
                );
                Self::default()
            }
        }
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }

    pub fn as_max_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.0))
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(DEFAULT_POLL_INTERVAL_MINUTES)
    }
}

impl From<RawPollInterval> for PollInterval {
    fn from(raw: RawPollInterval) -> Self {
        match raw {
            RawPollInterval::Number(minutes) => Self::from_minutes(minutes),
            RawPollInterval::Text(text) => Self::parse(&text),
        }
    }
}

impl From<PollInterval> for u32 {
    fn from(interval: PollInterval) -> Self {
        interval.0
    }
}

/// Scheduler tunables, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub wake_interval_secs: u64,
    pub fetch_retry_interval_secs: u64,
    pub fetch_max_retries: u32,
    pub no_position_retry_interval_secs: u64,
    pub no_position_max_retries: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            wake_interval_secs: DEFAULT_WAKE_INTERVAL.as_secs(),
            fetch_retry_interval_secs: DEFAULT_FETCH_RETRY_INTERVAL.as_secs(),
            fetch_max_retries: DEFAULT_FETCH_MAX_RETRIES,
            no_position_retry_interval_secs: DEFAULT_NO_POSITION_RETRY_INTERVAL.as_secs(),
            no_position_max_retries: DEFAULT_NO_POSITION_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub precision: usize,
    pub capacity: usize,
    /// Directory for the on-disk copy. Unset keeps the cache in memory only.
    pub dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            precision: geo_cache::cell::DEFAULT_PRECISION,
            capacity: geo_cache::cache::DEFAULT_CAPACITY,
            dir: None,
        }
    }
}

/// Root of the YAML file.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: String,
    /// Start the scheduler at boot. On-demand queries work either way.
    pub enable: bool,
    pub poll_interval_minutes: PollInterval,
    /// Initial vessel position, until the host pushes one.
    pub position: Option<Position>,
    pub scheduler: SchedulerSettings,
    pub cache: CacheSettings,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            enable: true,
            poll_interval_minutes: PollInterval::default(),
            position: None,
            scheduler: SchedulerSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl std::fmt::Debug for WeatherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("enable", &self.enable)
            .field("poll_interval_minutes", &self.poll_interval_minutes)
            .field("position", &self.position)
            .field("scheduler", &self.scheduler)
            .field("cache", &self.cache)
            .finish()
    }
}

impl WeatherConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: WeatherConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), config = ?config, "Loaded weather config");
        Ok(config)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let s = &self.scheduler;
        SchedulerConfig {
            fetch_interval: self.poll_interval_minutes.as_duration(),
            wake_interval: Duration::from_secs(s.wake_interval_secs),
            fetch_retry_interval: Duration::from_secs(s.fetch_retry_interval_secs),
            fetch_max_retries: s.fetch_max_retries,
            no_position_retry_interval: Duration::from_secs(s.no_position_retry_interval_secs),
            no_position_max_retries: s.no_position_max_retries,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        let config = CacheConfig::new(self.poll_interval_minutes.as_max_age())
            .with_precision(self.cache.precision)
            .with_capacity(self.cache.capacity);
        match &self.cache.dir {
            Some(dir) => config.with_persist_dir(dir),
            None => config,
        }
    }

    pub fn validate(&self) -> WeatherResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(WeatherError::Config("api_key is required".into()));
        }
        if let Some(position) = &self.position {
            if !position.is_valid() {
                return Err(WeatherError::Config(format!(
                    "initial position {} is out of range",
                    position
                )));
            }
        }
        self.scheduler_config().validate()
    }
}
