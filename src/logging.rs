/// Structured logging for the facility metric puller
///
/// Provides context-rich logging with data-source tags, facility (DUID)
/// identifiers, timestamps, and severity levels. Installed as the `log`
/// crate's global logger so any module can use `log::info!` directly; the
/// helpers below add the source tag and facility context consistently.
/// Supports console output and an optional append-only log file.

use chrono::Utc;
use log::{Level, LevelFilter, Metadata, Record};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use crate::model::{BatchError, FetchError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl LogLevel {
    /// Parses a config/CLI level name. Unrecognised names yield `None`.
    pub fn parse(name: &str) -> Option<LogLevel> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    fn from_log(level: Level) -> LogLevel {
        match level {
            Level::Error => LogLevel::Error,
            Level::Warn => LogLevel::Warning,
            Level::Info => LogLevel::Info,
            Level::Debug | Level::Trace => LogLevel::Debug,
        }
    }

    fn to_log(self) -> Level {
        match self {
            LogLevel::Error => Level::Error,
            LogLevel::Warning => Level::Warn,
            LogLevel::Info => Level::Info,
            LogLevel::Debug => Level::Debug,
        }
    }

    fn filter(self) -> LevelFilter {
        self.to_log().to_level_filter()
    }
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Open Electricity API calls.
    Api,
    /// Reference spreadsheet loading.
    Reference,
    /// Pipeline orchestration (periods, aggregation, categorization).
    Pipeline,
    /// Matrix output.
    Output,
    System,
}

impl DataSource {
    /// Log target used for records from this source.
    pub fn target(self) -> &'static str {
        match self {
            DataSource::Api => "API",
            DataSource::Reference => "REF",
            DataSource::Pipeline => "RUN",
            DataSource::Output => "OUT",
            DataSource::System => "SYS",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target())
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - rate limiting or a transient API outage
    Expected,
    /// Unexpected failure - indicates a request or configuration problem
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<PathBuf>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    pub fn new(min_level: LogLevel, log_file: Option<PathBuf>, console_timestamps: bool) -> Self {
        Logger {
            min_level,
            log_file,
            console_timestamps,
        }
    }

    fn append_to_file(path: &PathBuf, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// Formats a full log line: `<timestamp> <LEVEL> <SRC>: <message>`.
pub fn format_entry(timestamp: &str, level: LogLevel, target: &str, message: &str) -> String {
    format!("{} {} {}: {}", timestamp, level, target, message)
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        LogLevel::from_log(metadata.level()) >= self.min_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = LogLevel::from_log(record.level());
        let message = record.args().to_string();
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let log_entry = format_entry(&timestamp, level, record.target(), &message);

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", log_entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}: {}", record.target(), message),
                LogLevel::Warning => eprintln!("   ⚠ {}: {}", record.target(), message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path.display(), e);
            }
        }
    }

    fn flush(&self) {}
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Install the global logger. Fails if a logger is already installed.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<PathBuf>,
    console_timestamps: bool,
) -> Result<(), log::SetLoggerError> {
    log::set_boxed_logger(Box::new(Logger::new(min_level, log_file, console_timestamps)))?;
    log::set_max_level(min_level.filter());
    Ok(())
}

fn emit(level: LogLevel, source: DataSource, duid: Option<&str>, message: &str) {
    let duid_part = duid.map(|d| format!("[{}] ", d)).unwrap_or_default();
    log::log!(target: source.target(), level.to_log(), "{}{}", duid_part, message);
}

/// Log a general informational message
pub fn info(source: DataSource, duid: Option<&str>, message: &str) {
    emit(LogLevel::Info, source, duid, message);
}

/// Log a warning message
pub fn warn(source: DataSource, duid: Option<&str>, message: &str) {
    emit(LogLevel::Warning, source, duid, message);
}

/// Log an error message
pub fn error(source: DataSource, duid: Option<&str>, message: &str) {
    emit(LogLevel::Error, source, duid, message);
}

/// Log a debug message
pub fn debug(source: DataSource, duid: Option<&str>, message: &str) {
    emit(LogLevel::Debug, source, duid, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a batch failure.
///
/// Rate limiting and 5xx outages that outlast the retries are expected on a
/// busy public API; rejected requests and unparseable payloads point at a
/// bad request or an API change.
pub fn classify_fetch_failure(err: &BatchError) -> FailureType {
    match err {
        BatchError::RetryExhausted { last: FetchError::Status(_), .. } => FailureType::Expected,
        BatchError::RetryExhausted { .. } => FailureType::Unknown,
        BatchError::Rejected(FetchError::Status(_)) => FailureType::Unexpected,
        BatchError::Rejected(FetchError::Malformed(_)) => FailureType::Unexpected,
        BatchError::Rejected(FetchError::Transport(_)) => FailureType::Unknown,
    }
}

/// Log a batch failure with automatic classification
pub fn log_batch_failure(period: u32, batch_num: usize, err: &BatchError) {
    let failure_type = classify_fetch_failure(err);
    let message = format!(
        "Period {} batch {} failed [{}]: {} - continuing with next batch",
        period, batch_num, failure_type, err
    );

    match failure_type {
        FailureType::Expected => warn(DataSource::Api, None, &message),
        FailureType::Unexpected => error(DataSource::Api, None, &message),
        FailureType::Unknown => warn(DataSource::Api, None, &message),
    }
}

// ---------------------------------------------------------------------------
// Fetch Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a batched fetch
pub fn log_fetch_summary(source: DataSource, total: usize, successful: usize, failed: usize) {
    let message = format!(
        "Fetch complete: {}/{} batches successful, {} failed",
        successful,
        total,
        failed
    );

    if failed == 0 {
        info(source, None, &message);
    } else if successful == 0 {
        error(source, None, &message);
    } else {
        warn(source, None, &message);
    }
}
