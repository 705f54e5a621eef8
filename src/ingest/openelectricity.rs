/// Open Electricity Data API Client
///
/// Retrieves per-unit facility metric series (market value, energy, power,
/// emissions...) for the NEM from the Open Electricity v4 API.
///
/// API Documentation: https://docs.openelectricity.org.au
/// Data endpoint: https://api.openelectricity.org.au/v4/data/facilities/{network}

use std::time::Duration;

use serde::Deserialize;

use crate::model::{ApiFragment, Attribute, FacilityKey, FetchError, Period, RawPoint};

pub const OE_BASE_URL: &str = "https://api.openelectricity.org.au";

/// Environment variable holding the bearer API key.
pub const API_KEY_ENV: &str = "OPENELECTRICITY_API_KEY";

/// Facility codes this long or longer are internal placeholders, not real
/// facilities, and are never requested.
pub const MAX_FACILITY_CODE_LEN: usize = 30;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response of the facility data endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacilityDataResponse {
    #[serde(default)]
    pub data: Vec<FacilityBlock>,
}

/// One facility and the per-unit series reported for it.
#[derive(Debug, Clone, Deserialize)]
pub struct FacilityBlock {
    pub facility_code: Option<String>,
    pub network_region: Option<String>,
    pub fueltech_id: Option<String>,
    #[serde(default)]
    pub results: Vec<UnitResult>,
}

/// A single unit's series within a facility block.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitResult {
    pub name: Option<String>,
    #[serde(default)]
    pub columns: UnitColumns,
    /// `[timestamp, value]` pairs; `value` is `null` for missing intervals.
    #[serde(default)]
    pub data: Vec<(String, Option<f64>)>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitColumns {
    pub unit_code: Option<String>,
}

/// Response of the facility listing endpoint.
#[derive(Debug, Deserialize)]
pub struct FacilityListResponse {
    #[serde(default)]
    pub data: Vec<FacilityListing>,
}

#[derive(Debug, Deserialize)]
pub struct FacilityListing {
    pub code: String,
}

/// Points and metadata fragments extracted from one batch response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchData {
    pub points: Vec<RawPoint>,
    pub fragments: Vec<ApiFragment>,
}

// ============================================================================
// Requests
// ============================================================================

/// One batched data request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchQuery<'a> {
    pub facility_codes: &'a [FacilityKey],
    pub metric: &'a str,
    pub interval: &'a str,
    /// Inclusive window start, `YYYY-MM-DDT00:00:00`.
    pub date_start: String,
    /// Exclusive window end, `YYYY-MM-DDT00:00:00`.
    pub date_end: String,
}

/// Formats the half-open request window `[start, end + 1 day)` covering an
/// inclusive period. Returns `None` if the day after `end` is unrepresentable.
pub fn request_window(period: &Period) -> Option<(String, String)> {
    let exclusive_end = period.end.succ_opt()?;
    Some((
        period.start.format("%Y-%m-%dT00:00:00").to_string(),
        exclusive_end.format("%Y-%m-%dT00:00:00").to_string(),
    ))
}

/// Query-string parameters for a batch request. Facility codes are repeated.
pub fn batch_params(query: &BatchQuery<'_>) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = query
        .facility_codes
        .iter()
        .map(|code| ("facility_code", code.clone()))
        .collect();
    params.push(("metrics", query.metric.to_string()));
    params.push(("interval", query.interval.to_string()));
    params.push(("date_start", query.date_start.clone()));
    params.push(("date_end", query.date_end.clone()));
    params.push(("with_clerk", "true".to_string()));
    params
}

// ============================================================================
// Client Abstraction
// ============================================================================

/// The network primitive the fetch client drives. Implemented over HTTP by
/// [`HttpMetricApi`]; tests substitute scripted implementations.
pub trait MetricApi {
    /// Issues one data request for a batch of facilities.
    fn fetch_batch(&self, query: &BatchQuery<'_>) -> Result<FacilityDataResponse, FetchError>;

    /// Lists the facility codes registered on the network.
    fn fetch_facility_codes(&self) -> Result<Vec<FacilityKey>, FetchError>;
}

/// Blocking HTTP client for the Open Electricity API.
pub struct HttpMetricApi {
    client: reqwest::blocking::Client,
    base_url: String,
    network: String,
    api_key: String,
}

impl HttpMetricApi {
    pub fn new(
        base_url: &str,
        network: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(HttpMetricApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            network: network.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn get(&self, url: &str, params: &[(&str, String)]) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .query(params)
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response.text().map_err(|e| FetchError::Transport(e.to_string()))
    }
}

impl MetricApi for HttpMetricApi {
    fn fetch_batch(&self, query: &BatchQuery<'_>) -> Result<FacilityDataResponse, FetchError> {
        let url = format!("{}/v4/data/facilities/{}", self.base_url, self.network);
        let body = self.get(&url, &batch_params(query))?;
        parse_batch_response(&body)
    }

    fn fetch_facility_codes(&self) -> Result<Vec<FacilityKey>, FetchError> {
        let url = format!("{}/v4/facilities/", self.base_url);
        let params = [
            ("network_id", self.network.clone()),
            ("with_clerk", "true".to_string()),
        ];
        let body = self.get(&url, &params)?;
        parse_facility_codes(&body)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Deserializes a facility data response body.
pub fn parse_batch_response(body: &str) -> Result<FacilityDataResponse, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))
}

/// Deserializes the facility listing, dropping placeholder codes.
pub fn parse_facility_codes(body: &str) -> Result<Vec<FacilityKey>, FetchError> {
    let listing: FacilityListResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    Ok(listing
        .data
        .into_iter()
        .map(|f| f.code)
        .filter(|code| code.len() < MAX_FACILITY_CODE_LEN)
        .collect())
}

/// Flattens a response into raw points plus one metadata fragment per unit.
///
/// Units without a `unit_code` cannot be keyed and are skipped.
pub fn extract_batch(response: FacilityDataResponse) -> BatchData {
    let mut out = BatchData::default();

    for block in response.data {
        let facility_code = Attribute::from_raw(block.facility_code.as_deref());
        let region = Attribute::from_raw(block.network_region.as_deref());
        let fueltech = Attribute::from_raw(block.fueltech_id.as_deref());

        for result in block.results {
            let duid = match Attribute::from_raw(result.columns.unit_code.as_deref()) {
                Attribute::Known(code) => code,
                Attribute::Unknown => continue,
            };

            let name = Attribute::from_raw(result.name.as_deref()).or_else_from(&Attribute::known(&duid));

            out.points.extend(result.data.into_iter().map(|(timestamp, value)| RawPoint {
                timestamp,
                duid: duid.clone(),
                value,
            }));

            out.fragments.push(ApiFragment {
                duid,
                name,
                facility_code: facility_code.clone(),
                region: region.clone(),
                fueltech: fueltech.clone(),
            });
        }
    }

    out
}

// ============================================================================
// Tests
// ============================================================================
