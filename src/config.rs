//! Run configuration.
//!
//! Loaded once from a TOML file and passed by reference through the
//! pipeline; nothing mutates it after validation. The API key is not part
//! of the file: it is read from the environment (`.env` supported).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::filter::RegionFilter;
use crate::ingest::batch::{FetchSettings, RetryPolicy};
use crate::ingest::openelectricity::{API_KEY_ENV, OE_BASE_URL};
use crate::model::{ConfigError, Period};
use crate::periods;

/// Top-level configuration for a puller run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Calendar range to pull, inclusive of both months.
    pub range: RangeConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    /// Explicit facility codes to request. Empty: discover every facility
    /// on the network.
    #[serde(default)]
    pub facilities: Vec<String>,

    /// Region codes to keep (e.g. `["NSW1"]`). Empty keeps all regions.
    #[serde(default)]
    pub region_filter: Vec<String>,

    /// Raw API values are divided by this. Default: 1e6 (AUD → millions).
    #[serde(default = "default_value_scale")]
    pub value_scale: f64,

    #[serde(default)]
    pub reference: ReferenceConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Start and end of the requested range.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RangeConfig {
    pub start_month: u32,
    pub start_year: i32,
    pub end_month: u32,
    pub end_year: i32,
}

/// Open Electricity API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Network code. Default: "NEM".
    #[serde(default = "default_network")]
    pub network: String,

    /// Metric to pull. Default: "market_value".
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Data interval. Default: "1d".
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Per-request timeout. Default: 30s.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Batching, retry and pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Facilities per API call. Default: 20.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Total attempts per batch. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit; attempt `n` waits `n` times this. Default: 5s.
    #[serde(default = "default_retry_base_delay", with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Pause after every batch. Default: 1s.
    #[serde(default = "default_batch_delay", with = "humantime_serde")]
    pub batch_delay: Duration,

    /// Pause between periods. Default: 2s.
    #[serde(default = "default_inter_period_delay", with = "humantime_serde")]
    pub inter_period_delay: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    /// CSV export of the generation information spreadsheet.
    #[serde(default = "default_reference_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Main matrix file name, without `.csv`.
    #[serde(default = "default_main_filename")]
    pub main_filename: String,

    /// Decommissioned matrix file name, without `.csv`.
    #[serde(default = "default_decommissioned_filename")]
    pub decommissioned_filename: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// debug, info, warning or error. Default: "info".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Append log lines to this file as well as the console.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Prefix console lines with a timestamp. Default: true.
    #[serde(default = "default_true")]
    pub console_timestamps: bool,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_value_scale() -> f64 {
    1_000_000.0
}

fn default_base_url() -> String {
    OE_BASE_URL.to_string()
}

fn default_network() -> String {
    "NEM".to_string()
}

fn default_metric() -> String {
    "market_value".to_string()
}

fn default_interval() -> String {
    "1d".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_batch_size() -> usize {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_batch_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_inter_period_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_reference_path() -> PathBuf {
    PathBuf::from("nem_reference.csv")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_main_filename() -> String {
    "NEM_Market_Value".to_string()
}

fn default_decommissioned_filename() -> String {
    "NEM_Decommissioned_Market_Value".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            network: default_network(),
            metric: default_metric(),
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_base_delay: default_retry_base_delay(),
            batch_delay: default_batch_delay(),
            inter_period_delay: default_inter_period_delay(),
        }
    }
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            path: default_reference_path(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            main_filename: default_main_filename(),
            decommissioned_filename: default_decommissioned_filename(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            console_timestamps: default_true(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl Config {
    /// Reads, parses and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(data).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks everything that can be checked before touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.periods()?;

        if self.fetch.batch_size == 0 {
            return Err(ConfigError::NotPositive("fetch.batch_size"));
        }
        if self.fetch.max_retries == 0 {
            return Err(ConfigError::NotPositive("fetch.max_retries"));
        }
        if !(self.value_scale.is_finite() && self.value_scale > 0.0) {
            return Err(ConfigError::NotPositive("value_scale"));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url is required".to_string()));
        }
        if self.api.network.trim().is_empty() {
            return Err(ConfigError::Invalid("api.network is required".to_string()));
        }
        if self.output.main_filename.trim().is_empty() {
            return Err(ConfigError::Invalid("output.main_filename is required".to_string()));
        }
        if self.output.main_filename == self.output.decommissioned_filename {
            return Err(ConfigError::Invalid(
                "output.main_filename and output.decommissioned_filename must differ".to_string(),
            ));
        }
        if crate::logging::LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown logging.level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// The chunked request periods for the configured range.
    pub fn periods(&self) -> Result<Vec<Period>, ConfigError> {
        periods::compute_periods(
            self.range.start_month,
            self.range.start_year,
            self.range.end_month,
            self.range.end_year,
        )
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            metric: self.api.metric.clone(),
            interval: self.api.interval.clone(),
            batch_size: self.fetch.batch_size,
            retry: RetryPolicy {
                max_attempts: self.fetch.max_retries,
                base_delay: self.fetch.retry_base_delay,
            },
            batch_delay: self.fetch.batch_delay,
        }
    }

    pub fn region_filter(&self) -> RegionFilter {
        RegionFilter::new(self.region_filter.iter().cloned())
    }
}

/// Reads the API key from the environment.
pub fn api_key_from_env() -> Result<String, ConfigError> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(ConfigError::MissingApiKey(API_KEY_ENV)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
