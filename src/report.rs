//! Run Summary
//!
//! Counts gathered while a run progresses, plus the breakdown of the
//! assembled matrices. Printed at the end of every run and optionally
//! saved as JSON next to the output files.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::output::{Matrix, Outputs};

// ============================================================================
// Run Results
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub range: String,
    pub region_filter: String,
    pub periods: PeriodSummary,
    pub facilities_requested: usize,
    pub records: usize,
    /// Distinct units retained in any period.
    pub distinct_duids: usize,
    /// Retained units found in the reference dataset.
    pub reference_matches: usize,
    pub months: usize,
    pub main: Option<MatrixSummary>,
    pub decommissioned: Option<MatrixSummary>,
    pub output_written: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub total: usize,
    pub completed: usize,
    pub total_batches: usize,
    pub failed_batches: usize,
    /// Why the remaining periods were skipped, if they were.
    pub aborted: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixSummary {
    pub facilities: usize,
    /// Facilities per region; unknown regions under "N/A".
    pub regions: BTreeMap<String, usize>,
    /// Facilities with a known, non-zero storage capacity.
    pub storage_facilities: usize,
}

impl MatrixSummary {
    pub fn of(matrix: &Matrix) -> Self {
        let mut regions = BTreeMap::new();
        for meta in &matrix.metadata {
            *regions.entry(meta.region.to_string()).or_insert(0) += 1;
        }
        MatrixSummary {
            facilities: matrix.columns.len(),
            regions,
            storage_facilities: matrix.metadata.iter().filter(|m| m.is_storage()).count(),
        }
    }
}

impl RunReport {
    pub fn new(range: String, region_filter: String, periods_total: usize) -> Self {
        RunReport {
            timestamp: Utc::now().to_rfc3339(),
            range,
            region_filter,
            periods: PeriodSummary {
                total: periods_total,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn record_outputs(&mut self, outputs: &Outputs) {
        self.months = outputs.main.month_rows.len();
        self.main = Some(MatrixSummary::of(&outputs.main));
        self.decommissioned = outputs.decommissioned.as_ref().map(MatrixSummary::of);
    }

    /// Share of retained units enriched from the reference dataset, in percent.
    pub fn match_rate(&self) -> f64 {
        if self.distinct_duids > 0 {
            (self.reference_matches as f64 / self.distinct_duids as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.periods.aborted.is_none() && self.periods.completed == self.periods.total
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Range:            {}", self.range),
            format!("Region filter:    {}", self.region_filter),
            format!(
                "Periods:          {}/{} completed",
                self.periods.completed, self.periods.total
            ),
            format!(
                "Batches:          {}/{} successful ({} failed)",
                self.periods.total_batches - self.periods.failed_batches,
                self.periods.total_batches,
                self.periods.failed_batches
            ),
            format!("Facilities:       {} requested", self.facilities_requested),
            format!("Records:          {}", self.records),
            format!("Months:           {}", self.months),
            format!("Distinct DUIDs:   {}", self.distinct_duids),
            format!(
                "Reference match:  {}/{} ({:.1}%)",
                self.reference_matches,
                self.distinct_duids,
                self.match_rate()
            ),
        ];

        if let Some(main) = &self.main {
            lines.push(format!(
                "Current:          {} facilities ({} storage)",
                main.facilities, main.storage_facilities
            ));
            for (region, count) in &main.regions {
                lines.push(format!("  {:<16}{}", region, count));
            }
        }
        if let Some(decom) = &self.decommissioned {
            lines.push(format!("Decommissioned:   {} facilities", decom.facilities));
        }
        if let Some(reason) = &self.periods.aborted {
            lines.push(format!("Aborted:          {}", reason));
        }
        if !self.output_written {
            lines.push("Output:           nothing written".to_string());
        }
        lines
    }

    /// Writes the report as pretty JSON.
    pub fn save_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

pub fn print_summary(report: &RunReport) {
    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("RUN SUMMARY");
    println!("{}", rule);
    for line in report.summary_lines() {
        println!("{}", line);
    }
    println!("{}", rule);
}
