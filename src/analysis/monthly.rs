//! Monthly aggregation.
//!
//! Buckets retained records by calendar month and facility and sums their
//! values. The matrix is sparse: only combinations with at least one record
//! are stored, everything else reads as zero.

use std::collections::HashMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use indexmap::IndexSet;

use crate::model::{FacilityKey, MetricRecord};

/// A calendar month. Orders chronologically; renders as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(date: NaiveDate) -> Self {
        MonthKey {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Summed values keyed by (month, facility).
#[derive(Debug, Clone, Default)]
pub struct MonthlyMatrix {
    months: Vec<MonthKey>,
    columns: IndexSet<FacilityKey>,
    cells: HashMap<(MonthKey, FacilityKey), f64>,
}

impl MonthlyMatrix {
    pub fn aggregate(records: &[MetricRecord]) -> Self {
        let mut columns = IndexSet::new();
        let mut cells: HashMap<(MonthKey, FacilityKey), f64> = HashMap::new();

        for record in records {
            let month = MonthKey::of(record.date);
            columns.insert(record.duid.clone());
            *cells.entry((month, record.duid.clone())).or_insert(0.0) += record.value;
        }

        let mut months: Vec<MonthKey> = cells.keys().map(|(month, _)| *month).collect();
        months.sort_unstable();
        months.dedup();

        MonthlyMatrix {
            months,
            columns,
            cells,
        }
    }

    /// Months with at least one record, oldest first.
    pub fn months(&self) -> &[MonthKey] {
        &self.months
    }

    /// Facilities with at least one record, in first-encounter order.
    pub fn columns(&self) -> &IndexSet<FacilityKey> {
        &self.columns
    }

    /// Sum for one cell; zero when nothing was recorded.
    pub fn get(&self, month: MonthKey, duid: &str) -> f64 {
        self.cells
            .get(&(month, duid.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Values for `keys` in one month, zero-filled.
    pub fn row(&self, month: MonthKey, keys: &[FacilityKey]) -> Vec<f64> {
        keys.iter().map(|key| self.get(month, key)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
