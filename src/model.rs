/// Core data types for the NEM facility metric puller.
///
/// This module defines the shared domain model imported by all other modules:
/// periods, metric records, facility metadata and the error taxonomy.
/// It contains no I/O.

use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier of a generating or storage unit (AEMO "DUID").
///
/// Stable across periods; the join key between API data, the reference
/// dataset and the output columns.
pub type FacilityKey = String;

/// Text rendered for an attribute with no known value.
pub const UNKNOWN_LABEL: &str = "N/A";

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// A descriptive attribute that may not be known.
///
/// Always renders to text (`Unknown` renders as [`UNKNOWN_LABEL`]) so every
/// cell of an output header row has a value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Attribute {
    Known(String),
    #[default]
    Unknown,
}

impl Attribute {
    /// Builds an attribute from a raw source value.
    ///
    /// Blank values and the spreadsheet placeholders `N/A` / `nan` are
    /// treated as unknown.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Attribute::Unknown,
            Some(s) if s.eq_ignore_ascii_case(UNKNOWN_LABEL) || s.eq_ignore_ascii_case("nan") => {
                Attribute::Unknown
            }
            Some(s) => Attribute::Known(s.to_string()),
        }
    }

    pub fn known(value: impl Into<String>) -> Self {
        Attribute::Known(value.into())
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Attribute::Known(_))
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            Attribute::Known(s) => Some(s),
            Attribute::Unknown => None,
        }
    }

    /// Returns `self` if known, otherwise `fallback`.
    pub fn or_else_from(&self, fallback: &Attribute) -> Attribute {
        match self {
            Attribute::Known(_) => self.clone(),
            Attribute::Unknown => fallback.clone(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Known(s) => write!(f, "{}", s),
            Attribute::Unknown => write!(f, "{}", UNKNOWN_LABEL),
        }
    }
}

// ---------------------------------------------------------------------------
// Periods and records
// ---------------------------------------------------------------------------

/// A bounded, inclusive date window `[start, end]` used to stay within the
/// API's 365-day query limit. Numbered from 1 in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub number: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// `end - start` in days (a one-day period has length 0).
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Period {}: {} to {}",
            self.number,
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// One raw `(timestamp, unit, value)` triple as parsed from an API response.
///
/// `value` is `None` when the API reported `null` for that interval.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub timestamp: String,
    pub duid: FacilityKey,
    pub value: Option<f64>,
}

/// A retained, unit-converted measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub date: NaiveDate,
    pub duid: FacilityKey,
    pub value: f64,
    pub period: u32,
}

// ---------------------------------------------------------------------------
// Facility metadata
// ---------------------------------------------------------------------------

/// Coarse per-unit metadata as reported alongside the API's data series.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFragment {
    pub duid: FacilityKey,
    /// Unit display name; the API falls back to the DUID.
    pub name: Attribute,
    pub facility_code: Attribute,
    pub region: Attribute,
    pub fueltech: Attribute,
}

/// Merged metadata for one unit within one period.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityMetadata {
    pub duid: FacilityKey,
    pub name: Attribute,
    pub facility: Attribute,
    pub region: Attribute,
    pub fueltech: Attribute,
    pub owner: Attribute,
    pub unit_count: Attribute,
    pub nameplate_capacity_mw: Attribute,
    pub storage_capacity_mwh: Attribute,
    pub expected_closure_year: Attribute,
}

impl FacilityMetadata {
    /// Metadata row for a unit nothing is known about.
    pub fn unknown(duid: &str) -> Self {
        FacilityMetadata {
            duid: duid.to_string(),
            name: Attribute::known(duid),
            facility: Attribute::Unknown,
            region: Attribute::Unknown,
            fueltech: Attribute::Unknown,
            owner: Attribute::Unknown,
            unit_count: Attribute::Unknown,
            nameplate_capacity_mw: Attribute::Unknown,
            storage_capacity_mwh: Attribute::Unknown,
            expected_closure_year: Attribute::Unknown,
        }
    }

    /// Renders one header field for output.
    pub fn render(&self, field: MetaField) -> String {
        match field {
            MetaField::Duid => self.duid.clone(),
            MetaField::Name => self.name.to_string(),
            MetaField::Facility => self.facility.to_string(),
            MetaField::Region => self.region.to_string(),
            MetaField::Fueltech => self.fueltech.to_string(),
            MetaField::Owner => self.owner.to_string(),
            MetaField::NumberOfUnits => self.unit_count.to_string(),
            MetaField::NameplateCapacityMw => self.nameplate_capacity_mw.to_string(),
            MetaField::StorageCapacityMwh => self.storage_capacity_mwh.to_string(),
            MetaField::ExpectedClosureYear => self.expected_closure_year.to_string(),
        }
    }

    /// True when the unit has a known, non-zero storage capacity.
    pub fn is_storage(&self) -> bool {
        match self.storage_capacity_mwh.as_known() {
            Some(raw) => raw.parse::<f64>().map(|mwh| mwh != 0.0).unwrap_or(true),
            None => false,
        }
    }
}

/// Header rows of an output matrix, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField {
    Duid,
    Name,
    Facility,
    Region,
    Fueltech,
    Owner,
    NumberOfUnits,
    NameplateCapacityMw,
    StorageCapacityMwh,
    ExpectedClosureYear,
}

impl MetaField {
    pub const ALL: [MetaField; 10] = [
        MetaField::Duid,
        MetaField::Name,
        MetaField::Facility,
        MetaField::Region,
        MetaField::Fueltech,
        MetaField::Owner,
        MetaField::NumberOfUnits,
        MetaField::NameplateCapacityMw,
        MetaField::StorageCapacityMwh,
        MetaField::ExpectedClosureYear,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MetaField::Duid => "DUID",
            MetaField::Name => "Name",
            MetaField::Facility => "Facility",
            MetaField::Region => "Region",
            MetaField::Fueltech => "Fueltech",
            MetaField::Owner => "Owner",
            MetaField::NumberOfUnits => "Number_of_Units",
            MetaField::NameplateCapacityMw => "Nameplate_Capacity_MW",
            MetaField::StorageCapacityMwh => "Storage_Capacity_MWh",
            MetaField::ExpectedClosureYear => "Expected_Closure_Year",
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Invalid run configuration. Fatal: raised before any network activity.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid month {0} (expected 1-12)")]
    InvalidMonth(u32),
    #[error("empty date range: {start} is after {end}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),
    #[error("could not read config {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failure of a single API call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    Status(u16),
    /// The request never produced a response (timeout, connection reset).
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be deserialized.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Status codes worth retrying: rate limiting and server-side errors.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(code) => RETRYABLE_STATUSES.contains(code),
            FetchError::Transport(_) => true,
            FetchError::Malformed(_) => false,
        }
    }
}

/// Why a batch contributed nothing. Recovered locally by the fetch client.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BatchError {
    /// Non-retryable response or malformed payload.
    #[error("batch rejected: {0}")]
    Rejected(FetchError),
    /// Retryable failures persisted past the attempt limit.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: FetchError },
}

/// A failure escaping a period's fetch loop. Aborts the remaining periods.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PeriodFetchError {
    #[error("period {0} cancelled")]
    Cancelled(u32),
    #[error("period {period} has no valid request window: {reason}")]
    InvalidWindow { period: u32, reason: String },
}

/// The reference dataset could not be loaded. Recovered with an empty dataset.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference data unavailable: {0}")]
    Io(#[from] std::io::Error),
    #[error("reference data unreadable: {0}")]
    Csv(#[from] csv::Error),
    #[error("reference data has no '{0}' column")]
    MissingColumn(&'static str),
}

/// Writing an output matrix failed.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("output I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("output CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
