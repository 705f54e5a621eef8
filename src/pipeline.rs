//! Run orchestration.
//!
//! Periods are fetched in ascending order. Each period's units are merged
//! with the reference dataset and filtered by region as they arrive; the
//! survivors' records and metadata are accumulated. Once every period has
//! been attempted the records are aggregated, classified and written.
//!
//! A period that cannot be fetched stops the remaining periods, but the
//! periods already completed still produce output.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};

use crate::analysis::lifecycle::PeriodMetadata;
use crate::analysis::monthly::MonthlyMatrix;
use crate::filter::RegionFilter;
use crate::ingest::batch::{BatchFetcher, Pacer, PeriodFetch};
use crate::ingest::openelectricity::MetricApi;
use crate::logging::{self, DataSource};
use crate::merge::merge_metadata;
use crate::model::{FacilityKey, MetricRecord, OutputError, Period, RawPoint};
use crate::output::{self, MatrixSink, Outputs};
use crate::periods;
use crate::reference::ReferenceDataset;
use crate::report::RunReport;

/// Per-run inputs that stay fixed across periods.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Explicit universe; empty means discover from the API.
    pub facilities: Vec<FacilityKey>,
    pub region_filter: RegionFilter,
    pub value_scale: f64,
    pub inter_period_delay: Duration,
    pub main_filename: String,
    pub decommissioned_filename: String,
}

/// Records and metadata retained so far. Append-only.
#[derive(Debug, Default)]
pub struct Accumulator {
    pub records: Vec<MetricRecord>,
    pub metadata: PeriodMetadata,
    matched: IndexSet<FacilityKey>,
}

/// Calendar date of an API timestamp (its first ten characters).
pub fn record_date(timestamp: &str) -> Option<NaiveDate> {
    let prefix = timestamp.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Converts a raw point into a retained record. `null` values become zero.
pub fn to_record(point: &RawPoint, period: u32, value_scale: f64) -> Option<MetricRecord> {
    let date = record_date(&point.timestamp)?;
    Some(MetricRecord {
        date,
        duid: point.duid.clone(),
        value: point.value.unwrap_or(0.0) / value_scale,
        period,
    })
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges, filters and stores one period's fetch.
    ///
    /// Every completed period gets a metadata entry, even an empty one, so
    /// lifecycle classification sees it.
    pub fn ingest_period(
        &mut self,
        fetch: PeriodFetch,
        reference: &ReferenceDataset,
        filter: &RegionFilter,
        value_scale: f64,
    ) {
        let mut units: IndexMap<FacilityKey, _> = IndexMap::new();
        let mut excluded: HashSet<FacilityKey> = HashSet::new();

        for fragment in &fetch.fragments {
            let merged = merge_metadata(fragment, reference);
            if filter.include(&fragment.duid, &merged) {
                if reference.contains(&fragment.duid) {
                    self.matched.insert(fragment.duid.clone());
                }
                units.insert(fragment.duid.clone(), merged);
            } else {
                excluded.insert(fragment.duid.clone());
            }
        }

        let mut kept = 0usize;
        let mut unparsable = 0usize;
        for point in &fetch.points {
            if !units.contains_key(&point.duid) {
                continue;
            }
            match to_record(point, fetch.period, value_scale) {
                Some(record) => {
                    self.records.push(record);
                    kept += 1;
                }
                None => unparsable += 1,
            }
        }

        if filter.is_active() {
            logging::info(
                DataSource::Pipeline,
                None,
                &format!(
                    "Period {}: kept {} units, excluded {} by region filter",
                    fetch.period,
                    units.len(),
                    excluded.len()
                ),
            );
        }
        if unparsable > 0 {
            logging::warn(
                DataSource::Pipeline,
                None,
                &format!(
                    "Period {}: skipped {} points with unparsable timestamps",
                    fetch.period, unparsable
                ),
            );
        }
        logging::debug(
            DataSource::Pipeline,
            None,
            &format!("Period {}: retained {} records", fetch.period, kept),
        );

        self.metadata.insert(fetch.period, units);
    }

    pub fn distinct_duids(&self) -> usize {
        let mut seen: HashSet<&str> = HashSet::new();
        for units in self.metadata.values() {
            seen.extend(units.keys().map(String::as_str));
        }
        seen.len()
    }

    pub fn reference_matches(&self) -> usize {
        self.matched.len()
    }
}

/// Drives one full run and writes its matrices to `sink`.
///
/// Only a failure to write output is returned as an error; fetch problems
/// are logged and reflected in the report.
pub fn run<A, P, S>(
    api: &A,
    fetcher: &mut BatchFetcher<P>,
    reference: &ReferenceDataset,
    periods: &[Period],
    options: &RunOptions,
    sink: &mut S,
) -> Result<RunReport, OutputError>
where
    A: MetricApi + ?Sized,
    P: Pacer,
    S: MatrixSink + ?Sized,
{
    let mut report = RunReport::new(
        periods::describe_range(periods),
        options.region_filter.describe(),
        periods.len(),
    );

    logging::info(
        DataSource::Pipeline,
        None,
        &format!("Date range: {}", report.range),
    );
    logging::info(
        DataSource::Pipeline,
        None,
        &format!("Region filter: {}", report.region_filter),
    );

    let facilities = if options.facilities.is_empty() {
        fetcher.discover_facilities(api)
    } else {
        options.facilities.clone()
    };
    report.facilities_requested = facilities.len();

    if facilities.is_empty() {
        logging::error(
            DataSource::Pipeline,
            None,
            "No facilities to request. Nothing to do.",
        );
        return Ok(report);
    }

    let mut acc = Accumulator::new();

    for (index, period) in periods.iter().enumerate() {
        match fetcher.fetch_period(api, &facilities, period) {
            Ok(fetch) => {
                report.periods.total_batches += fetch.total_batches;
                report.periods.failed_batches += fetch.failed_batches;
                acc.ingest_period(fetch, reference, &options.region_filter, options.value_scale);
                report.periods.completed += 1;
            }
            Err(e) => {
                logging::error(
                    DataSource::Pipeline,
                    None,
                    &format!(
                        "{}. Skipping the remaining {} period(s).",
                        e,
                        periods.len() - index - 1
                    ),
                );
                report.periods.aborted = Some(e.to_string());
                break;
            }
        }

        if index + 1 < periods.len() {
            fetcher.pause(options.inter_period_delay);
        }
    }

    report.records = acc.records.len();
    report.distinct_duids = acc.distinct_duids();
    report.reference_matches = acc.reference_matches();

    if acc.records.is_empty() {
        logging::warn(
            DataSource::Pipeline,
            None,
            "No data retrieved for any period. No output written.",
        );
        return Ok(report);
    }

    let outputs = build_outputs(&acc);
    report.record_outputs(&outputs);
    output::write_outputs(
        sink,
        &outputs,
        &options.main_filename,
        &options.decommissioned_filename,
    )?;
    report.output_written = true;

    Ok(report)
}

/// Aggregates and classifies everything accumulated so far.
pub fn build_outputs(acc: &Accumulator) -> Outputs {
    let monthly = MonthlyMatrix::aggregate(&acc.records);
    let outputs = output::assemble(&acc.metadata, &monthly);

    match &outputs.lifecycle {
        Some(lifecycle) => logging::info(
            DataSource::Pipeline,
            None,
            &format!(
                "Period {} is latest: {} reference, {} decommissioned",
                lifecycle.latest_period,
                lifecycle.reference.len(),
                lifecycle.decommissioned.len()
            ),
        ),
        None => logging::info(
            DataSource::Pipeline,
            None,
            "Single period: skipping lifecycle classification",
        ),
    }
    outputs
}
