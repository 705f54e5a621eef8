/// End-to-end pipeline tests against a scripted API.
///
/// These tests run the full chain (periods → batched fetch → merge →
/// region filter → monthly aggregation → lifecycle → CSV) without network
/// access or real sleeping.
///
/// Run with: cargo test --test pipeline_offline

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nem_puller::filter::RegionFilter;
use nem_puller::ingest::batch::{BatchFetcher, FetchSettings, RecordingPacer, RetryPolicy};
use nem_puller::ingest::openelectricity::{
    parse_batch_response, BatchQuery, FacilityDataResponse, MetricApi,
};
use nem_puller::model::{FacilityKey, FetchError};
use nem_puller::output::CsvMatrixWriter;
use nem_puller::periods::compute_periods;
use nem_puller::pipeline::{self, RunOptions};
use nem_puller::reference::ReferenceDataset;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// One unit the fake network knows about.
#[derive(Clone)]
struct FakeUnit {
    duid: &'static str,
    facility: &'static str,
    region: &'static str,
    /// Years in which the unit reports data.
    active_years: &'static [i32],
    /// Raw daily value (AUD).
    value: f64,
}

/// Serves every requested unit that is active in the window's start year,
/// with two daily points per month of the window.
struct FakeNetwork {
    units: Vec<FakeUnit>,
    /// Windows (date_start prefix) answered with this status instead.
    failing: HashMap<&'static str, u16>,
    /// Flag set after the first successful call.
    cancel_after_first: Option<Arc<AtomicBool>>,
    calls: RefCell<usize>,
}

impl FakeNetwork {
    fn new(units: Vec<FakeUnit>) -> Self {
        FakeNetwork {
            units,
            failing: HashMap::new(),
            cancel_after_first: None,
            calls: RefCell::new(0),
        }
    }

    fn unit(&self, code: &str) -> Option<&FakeUnit> {
        self.units.iter().find(|u| u.duid == code)
    }
}

impl MetricApi for FakeNetwork {
    fn fetch_batch(&self, query: &BatchQuery<'_>) -> Result<FacilityDataResponse, FetchError> {
        *self.calls.borrow_mut() += 1;
        if let Some(flag) = &self.cancel_after_first {
            flag.store(true, Ordering::SeqCst);
        }
        for (prefix, status) in &self.failing {
            if query.date_start.starts_with(prefix) {
                return Err(FetchError::Status(*status));
            }
        }

        let year: i32 = query.date_start[..4].parse().unwrap();
        let blocks: Vec<String> = query
            .facility_codes
            .iter()
            .filter_map(|code| self.unit(code))
            .filter(|unit| unit.active_years.contains(&year))
            .map(|unit| {
                format!(
                    r#"{{"facility_code": "{fac}", "network_region": "{region}", "fueltech_id": "wind",
                        "results": [{{"name": "{duid} unit", "columns": {{"unit_code": "{duid}"}},
                        "data": [["{year}-01-01T00:00:00+10:00", {v}], ["{year}-01-02T00:00:00+10:00", {v}],
                                 ["{year}-02-01T00:00:00+10:00", {v}], ["{year}-02-02T00:00:00+10:00", null]]}}]}}"#,
                    fac = unit.facility,
                    region = unit.region,
                    duid = unit.duid,
                    year = year,
                    v = unit.value,
                )
            })
            .collect();
        parse_batch_response(&format!(r#"{{"data": [{}]}}"#, blocks.join(",")))
    }

    fn fetch_facility_codes(&self) -> Result<Vec<FacilityKey>, FetchError> {
        Ok(self.units.iter().map(|u| u.duid.to_string()).collect())
    }
}

fn fast_fetcher() -> BatchFetcher<RecordingPacer> {
    BatchFetcher::new(
        FetchSettings {
            metric: "market_value".to_string(),
            interval: "1d".to_string(),
            batch_size: 2,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_secs(5),
            },
            batch_delay: Duration::from_secs(1),
        },
        RecordingPacer::default(),
    )
}

fn options(filter: RegionFilter) -> RunOptions {
    RunOptions {
        facilities: Vec::new(),
        region_filter: filter,
        value_scale: 1_000_000.0,
        inter_period_delay: Duration::from_secs(2),
        main_filename: "main".to_string(),
        decommissioned_filename: "decommissioned".to_string(),
    }
}

fn read_rows(path: &std::path::Path) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap_or_else(|e| panic!("could not read {}: {}", path.display(), e));
    rdr.records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn row<'a>(rows: &'a [Vec<String>], label: &str) -> &'a [String] {
    rows.iter()
        .find(|r| r[0] == label)
        .unwrap_or_else(|| panic!("no row labelled {}", label))
}

fn units() -> Vec<FakeUnit> {
    vec![
        FakeUnit {
            duid: "OLD1",
            facility: "OLDFARM",
            region: "NSW1",
            active_years: &[2023],
            value: 1_000_000.0,
        },
        FakeUnit {
            duid: "NEW1",
            facility: "NEWFARM",
            region: "NSW1",
            active_years: &[2023, 2024],
            value: 2_000_000.0,
        },
        FakeUnit {
            duid: "VIC1U",
            facility: "VICFARM",
            region: "VIC1",
            active_years: &[2023, 2024],
            value: 3_000_000.0,
        },
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_multi_period_run_writes_reference_and_decommissioned_files() {
    let dir = tempfile::tempdir().unwrap();
    let api = FakeNetwork::new(units());
    let mut fetcher = fast_fetcher();
    let periods = compute_periods(1, 2023, 6, 2024).unwrap();
    assert_eq!(periods.len(), 2);

    let mut sink = CsvMatrixWriter::new(dir.path());
    let report = pipeline::run(
        &api,
        &mut fetcher,
        &ReferenceDataset::empty(),
        &periods,
        &options(RegionFilter::allow_all()),
        &mut sink,
    )
    .unwrap();

    assert!(report.output_written);
    assert!(report.is_complete());
    assert_eq!(report.facilities_requested, 3);
    assert_eq!(report.distinct_duids, 3);

    let main = read_rows(&sink.path_for("main"));
    assert_eq!(main[0], vec!["", "NEW1", "VIC1U"], "reference set from the latest period");
    assert_eq!(row(&main, "Region"), &["Region", "NSW1", "VIC1"]);
    assert_eq!(row(&main, "Owner"), &["Owner", "N/A", "N/A"]);
    assert_eq!(row(&main, "2023-01"), &["2023-01", "4", "6"]);
    assert_eq!(row(&main, "2024-02"), &["2024-02", "2", "3"], "null point counts as zero");

    let decom = read_rows(&sink.path_for("decommissioned"));
    assert_eq!(decom[0], vec!["", "OLD1"]);
    assert_eq!(row(&decom, "Facility"), &["Facility", "OLDFARM"]);
    assert_eq!(row(&decom, "2023-01"), &["2023-01", "2"]);
    assert_eq!(row(&decom, "2024-01"), &["2024-01", "0"], "zero-filled after retirement");
}

#[test]
fn test_single_period_run_skips_categorization() {
    let dir = tempfile::tempdir().unwrap();
    let api = FakeNetwork::new(units());
    let mut fetcher = fast_fetcher();
    let periods = compute_periods(1, 2024, 6, 2024).unwrap();

    let mut sink = CsvMatrixWriter::new(dir.path());
    pipeline::run(
        &api,
        &mut fetcher,
        &ReferenceDataset::empty(),
        &periods,
        &options(RegionFilter::allow_all()),
        &mut sink,
    )
    .unwrap();

    let main = read_rows(&sink.path_for("main"));
    assert_eq!(main[0], vec!["", "NEW1", "VIC1U"], "columns are the period's metadata keys");
    assert!(!sink.path_for("decommissioned").exists());
}

#[test]
fn test_region_filter_and_reference_enrichment() {
    let dir = tempfile::tempdir().unwrap();
    let reference_csv = "\
DUID,Region,Facility,Owner,Number of Units,Nameplate Capacity (MW),Storage Capacity (MWh),Expected Closure Year,Fueltech
NEW1,NSW1,New Wind Farm,Acme Renewables,1,100,50,2045,Wind
";
    let reference = ReferenceDataset::from_reader(reference_csv.as_bytes()).unwrap();
    let api = FakeNetwork::new(units());
    let mut fetcher = fast_fetcher();
    let periods = compute_periods(1, 2024, 3, 2024).unwrap();

    let mut sink = CsvMatrixWriter::new(dir.path());
    let report = pipeline::run(
        &api,
        &mut fetcher,
        &reference,
        &periods,
        &options(RegionFilter::new(["NSW1"])),
        &mut sink,
    )
    .unwrap();

    let main = read_rows(&sink.path_for("main"));
    assert_eq!(main[0], vec!["", "NEW1"], "VIC1 unit excluded at ingestion");
    assert_eq!(row(&main, "Facility"), &["Facility", "New Wind Farm"]);
    assert_eq!(row(&main, "Owner"), &["Owner", "Acme Renewables"]);
    assert_eq!(row(&main, "Name"), &["Name", "NEW1 unit"]);
    assert_eq!(report.reference_matches, 1);
    assert_eq!(report.main.as_ref().unwrap().storage_facilities, 1);
}

#[test]
fn test_failed_period_batches_leave_other_periods_intact() {
    let dir = tempfile::tempdir().unwrap();
    let mut api = FakeNetwork::new(units());
    api.failing.insert("2024", 503);
    let mut fetcher = fast_fetcher();
    let periods = compute_periods(1, 2023, 6, 2024).unwrap();

    let mut sink = CsvMatrixWriter::new(dir.path());
    let report = pipeline::run(
        &api,
        &mut fetcher,
        &ReferenceDataset::empty(),
        &periods,
        &options(RegionFilter::allow_all()),
        &mut sink,
    )
    .unwrap();

    assert_eq!(report.periods.completed, 2);
    assert_eq!(report.periods.failed_batches, 2, "both 2024 batches exhausted retries");
    assert_eq!(
        fetcher
            .pacer()
            .pauses
            .iter()
            .filter(|d| **d == Duration::from_secs(2))
            .count(),
        1,
        "one inter-period pause between two periods"
    );
    // The latest period came back empty, so every unit is classed as retired.
    let decom = read_rows(&sink.path_for("decommissioned"));
    assert_eq!(decom[0], vec!["", "OLD1", "NEW1", "VIC1U"]);
}

#[test]
fn test_cancellation_keeps_completed_periods() {
    let dir = tempfile::tempdir().unwrap();
    let flag = Arc::new(AtomicBool::new(false));
    let mut api = FakeNetwork::new(units());
    api.cancel_after_first = Some(flag.clone());
    let mut fetcher = fast_fetcher().with_cancel_flag(flag);
    let periods = compute_periods(1, 2023, 6, 2024).unwrap();

    let mut sink = CsvMatrixWriter::new(dir.path());
    let report = pipeline::run(
        &api,
        &mut fetcher,
        &ReferenceDataset::empty(),
        &periods,
        &options(RegionFilter::allow_all()),
        &mut sink,
    )
    .unwrap();

    assert_eq!(*api.calls.borrow(), 1, "cancelled at the next batch boundary");
    assert_eq!(report.periods.completed, 0);
    assert!(report.periods.aborted.is_some());
    assert!(!report.output_written, "no completed period, no output");
}

#[test]
fn test_no_records_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let api = FakeNetwork::new(units());
    let mut fetcher = fast_fetcher();
    let periods = compute_periods(1, 2020, 3, 2020).unwrap();

    let mut sink = CsvMatrixWriter::new(dir.path().join("out"));
    let report = pipeline::run(
        &api,
        &mut fetcher,
        &ReferenceDataset::empty(),
        &periods,
        &options(RegionFilter::allow_all()),
        &mut sink,
    )
    .unwrap();

    assert_eq!(report.records, 0);
    assert!(!report.output_written);
    assert!(!sink.dir().exists());
}
