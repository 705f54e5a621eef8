//! Output assembly and the CSV matrix sink.
//!
//! A matrix is laid out with facilities as columns: one header row per
//! metadata field, a `---` separator, then one row per month. Which
//! columns appear is decided by lifecycle classification, not by whether a
//! unit has data in the aggregated months; missing values are zero-filled.

use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::lifecycle::{categorize, resolve_metadata, Lifecycle, PeriodMetadata};
use crate::analysis::monthly::{MonthKey, MonthlyMatrix};
use crate::logging::{self, DataSource};
use crate::model::{FacilityKey, FacilityMetadata, MetaField, OutputError};

/// Label of the row separating metadata from values.
pub const SEPARATOR: &str = "---";

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub columns: Vec<FacilityKey>,
    /// Metadata used for the header rows, one per column.
    pub metadata: Vec<FacilityMetadata>,
    pub month_rows: Vec<(MonthKey, Vec<f64>)>,
}

impl Matrix {
    /// Builds a matrix for `columns`, taking each column's header values
    /// from `metadata_for` and its values from `monthly`.
    pub fn build(
        columns: Vec<FacilityKey>,
        metadata_for: impl Fn(&str) -> FacilityMetadata,
        monthly: &MonthlyMatrix,
    ) -> Self {
        let metadata = columns.iter().map(|key| metadata_for(key.as_str())).collect();
        let month_rows = monthly
            .months()
            .iter()
            .map(|month| (*month, monthly.row(*month, &columns)))
            .collect();
        Matrix {
            columns,
            metadata,
            month_rows,
        }
    }

    pub fn header_row(&self, field: MetaField) -> Vec<String> {
        self.metadata.iter().map(|m| m.render(field)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of columns whose rendered region is `region`.
    pub fn count_region(&self, region: &str) -> usize {
        self.metadata
            .iter()
            .filter(|m| m.region.as_known() == Some(region))
            .count()
    }
}

/// The matrices produced by one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Outputs {
    pub main: Matrix,
    /// Present only for multi-period runs.
    pub decommissioned: Option<Matrix>,
    pub lifecycle: Option<Lifecycle>,
}

/// Builds the output matrices from accumulated metadata and the monthly
/// aggregate.
///
/// One period: a single matrix over that period's units. Several periods:
/// a reference matrix over units in the latest period and a decommissioned
/// matrix over units seen only earlier.
pub fn assemble(metadata: &PeriodMetadata, monthly: &MonthlyMatrix) -> Outputs {
    match categorize(metadata) {
        Some(lifecycle) => {
            let latest = metadata.get(&lifecycle.latest_period);
            let main = Matrix::build(
                lifecycle.reference.iter().cloned().collect(),
                |key| {
                    latest
                        .and_then(|units| units.get(key))
                        .cloned()
                        .unwrap_or_else(|| resolve_metadata(metadata, key))
                },
                monthly,
            );
            let decommissioned = Matrix::build(
                lifecycle.decommissioned.iter().cloned().collect(),
                |key| resolve_metadata(metadata, key),
                monthly,
            );
            Outputs {
                main,
                decommissioned: Some(decommissioned),
                lifecycle: Some(lifecycle),
            }
        }
        None => {
            let columns: Vec<FacilityKey> = metadata
                .values()
                .next_back()
                .map(|units| units.keys().cloned().collect())
                .unwrap_or_default();
            let main = Matrix::build(
                columns,
                |key| resolve_metadata(metadata, key),
                monthly,
            );
            Outputs {
                main,
                decommissioned: None,
                lifecycle: None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for assembled matrices.
pub trait MatrixSink {
    fn write(&mut self, name: &str, matrix: &Matrix) -> Result<(), OutputError>;
}

/// Writes `<dir>/<name>.csv`.
#[derive(Debug, Clone)]
pub struct CsvMatrixWriter {
    dir: PathBuf,
}

impl CsvMatrixWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CsvMatrixWriter { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl MatrixSink for CsvMatrixWriter {
    fn write(&mut self, name: &str, matrix: &Matrix) -> Result<(), OutputError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        let mut wtr = csv::WriterBuilder::new().flexible(false).from_path(&path)?;
        write_matrix(&mut wtr, matrix)?;
        wtr.flush()?;

        logging::info(
            DataSource::Output,
            None,
            &format!(
                "Saved {} ({} facilities x {} months)",
                path.display(),
                matrix.columns.len(),
                matrix.month_rows.len()
            ),
        );
        Ok(())
    }
}

/// Serializes a matrix: key row with a blank corner cell, header rows,
/// separator, month rows.
pub fn write_matrix<W: std::io::Write>(
    wtr: &mut csv::Writer<W>,
    matrix: &Matrix,
) -> Result<(), OutputError> {
    let width = matrix.columns.len() + 1;

    let mut key_row = Vec::with_capacity(width);
    key_row.push(String::new());
    key_row.extend(matrix.columns.iter().cloned());
    wtr.write_record(&key_row)?;

    for field in MetaField::ALL {
        let mut row = Vec::with_capacity(width);
        row.push(field.label().to_string());
        row.extend(matrix.header_row(field));
        wtr.write_record(&row)?;
    }

    let mut separator = vec![String::new(); width];
    separator[0] = SEPARATOR.to_string();
    wtr.write_record(&separator)?;

    for (month, values) in &matrix.month_rows {
        let mut row = Vec::with_capacity(width);
        row.push(month.to_string());
        row.extend(values.iter().map(f64::to_string));
        wtr.write_record(&row)?;
    }
    Ok(())
}

/// Writes the main matrix and, when non-empty, the decommissioned matrix.
pub fn write_outputs<S: MatrixSink + ?Sized>(
    sink: &mut S,
    outputs: &Outputs,
    main_name: &str,
    decommissioned_name: &str,
) -> Result<(), OutputError> {
    sink.write(main_name, &outputs.main)?;
    match &outputs.decommissioned {
        Some(matrix) if !matrix.is_empty() => sink.write(decommissioned_name, matrix)?,
        Some(_) => logging::info(
            DataSource::Output,
            None,
            "No decommissioned facilities; skipping decommissioned file",
        ),
        None => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
