//! Facility reference registry.
//!
//! A static DUID → attributes table exported from the AEMO "Generation
//! Information" spreadsheet (saved as CSV). Loaded once before fetching and
//! immutable for the run. It only enriches metadata; it never decides
//! whether a facility's records are kept.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::logging::{self, DataSource};
use crate::model::{Attribute, FacilityKey, ReferenceError};

// ---------------------------------------------------------------------------
// Column names (as exported from the AEMO spreadsheet)
// ---------------------------------------------------------------------------

pub const COL_DUID: &str = "DUID";
pub const COL_REGION: &str = "Region";
pub const COL_FACILITY: &str = "Facility";
pub const COL_OWNER: &str = "Owner";
pub const COL_UNITS: &str = "Number of Units";
pub const COL_NAMEPLATE: &str = "Nameplate Capacity (MW)";
pub const COL_STORAGE: &str = "Storage Capacity (MWh)";
pub const COL_CLOSURE: &str = "Expected Closure Year";
pub const COL_FUELTECH: &str = "Fueltech";

// ---------------------------------------------------------------------------
// Reference entries
// ---------------------------------------------------------------------------

/// Static attributes for one DUID. Any field may be unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceEntry {
    pub region: Attribute,
    pub facility: Attribute,
    pub owner: Attribute,
    pub unit_count: Attribute,
    pub nameplate_capacity_mw: Attribute,
    pub storage_capacity_mwh: Attribute,
    pub expected_closure_year: Attribute,
    pub fueltech: Attribute,
}

/// DUID lookup table.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDataset {
    entries: HashMap<FacilityKey, ReferenceEntry>,
}

impl ReferenceDataset {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reads a reference CSV. Rows without a DUID are skipped; when a DUID
    /// appears more than once the last row wins.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ReferenceError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);
        let duid_col = column(COL_DUID).ok_or(ReferenceError::MissingColumn(COL_DUID))?;

        let region_col = column(COL_REGION);
        let facility_col = column(COL_FACILITY);
        let owner_col = column(COL_OWNER);
        let units_col = column(COL_UNITS);
        let nameplate_col = column(COL_NAMEPLATE);
        let storage_col = column(COL_STORAGE);
        let closure_col = column(COL_CLOSURE);
        let fueltech_col = column(COL_FUELTECH);

        let mut entries = HashMap::new();
        for row in rdr.records() {
            let row = row?;
            let field = |col: Option<usize>| Attribute::from_raw(col.and_then(|i| row.get(i)));

            let duid = match field(Some(duid_col)) {
                Attribute::Known(duid) => duid,
                Attribute::Unknown => continue,
            };

            entries.insert(
                duid,
                ReferenceEntry {
                    region: field(region_col),
                    facility: field(facility_col),
                    owner: field(owner_col),
                    unit_count: field(units_col),
                    nameplate_capacity_mw: field(nameplate_col),
                    storage_capacity_mwh: field(storage_col),
                    expected_closure_year: field(closure_col),
                    fueltech: field(fueltech_col),
                },
            );
        }

        Ok(ReferenceDataset { entries })
    }

    /// Reads a reference CSV from disk.
    pub fn load(path: &Path) -> Result<Self, ReferenceError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Loads the reference data, degrading to an empty dataset if the file
    /// is missing or unreadable. Enrichment is lost; fetching is unaffected.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(dataset) => {
                logging::info(
                    DataSource::Reference,
                    None,
                    &format!("Loaded {} DUIDs from {}", dataset.len(), path.display()),
                );
                dataset
            }
            Err(e) => {
                logging::warn(
                    DataSource::Reference,
                    None,
                    &format!("{} ({}). Proceeding without reference data.", e, path.display()),
                );
                Self::empty()
            }
        }
    }

    /// Looks up a DUID. Absence is normal: API-only units are still kept.
    pub fn lookup(&self, duid: &str) -> Option<&ReferenceEntry> {
        self.entries.get(duid)
    }

    pub fn contains(&self, duid: &str) -> bool {
        self.entries.contains_key(duid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(FacilityKey, ReferenceEntry)> for ReferenceDataset {
    fn from_iter<I: IntoIterator<Item = (FacilityKey, ReferenceEntry)>>(iter: I) -> Self {
        ReferenceDataset {
            entries: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Region,Facility,Owner,Number of Units,Nameplate Capacity (MW),Storage Capacity (MWh),Expected Closure Year,Fueltech,DUID
NSW1,Bayswater Power Station,AGL Energy,4,2640,,2033,Coal,BW01
NSW1,Bayswater Power Station,AGL Energy,4,2640,,2033,Coal,BW02
VIC1,Unregistered Solar Farm,,,,,,Solar,
SA1,Hornsdale Power Reserve,Neoen,1,150,193.5,N/A,Battery Storage,HPRG1
";

    #[test]
    fn test_loads_rows_with_duid() {
        let dataset = ReferenceDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(dataset.len(), 3, "the row with a blank DUID is skipped");
        assert!(dataset.contains("BW01"));
        assert!(dataset.contains("HPRG1"));
    }

    #[test]
    fn test_lookup_returns_attributes() {
        let dataset = ReferenceDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        let entry = dataset.lookup("HPRG1").expect("HPRG1 should be present");
        assert_eq!(entry.region, Attribute::known("SA1"));
        assert_eq!(entry.owner, Attribute::known("Neoen"));
        assert_eq!(entry.storage_capacity_mwh, Attribute::known("193.5"));
        assert_eq!(entry.expected_closure_year, Attribute::Unknown, "N/A is unknown");
    }

    #[test]
    fn test_blank_cells_are_unknown() {
        let dataset = ReferenceDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        let entry = dataset.lookup("BW01").unwrap();
        assert_eq!(entry.storage_capacity_mwh, Attribute::Unknown);
        assert_eq!(entry.unit_count, Attribute::known("4"));
    }

    #[test]
    fn test_lookup_of_unknown_duid_is_none() {
        let dataset = ReferenceDataset::from_reader(SAMPLE.as_bytes()).unwrap();
        assert!(dataset.lookup("NOPE01").is_none());
    }

    #[test]
    fn test_missing_optional_columns_are_unknown() {
        let csv = "DUID,Region\nER01,NSW1\n";
        let dataset = ReferenceDataset::from_reader(csv.as_bytes()).unwrap();
        let entry = dataset.lookup("ER01").unwrap();
        assert_eq!(entry.region, Attribute::known("NSW1"));
        assert_eq!(entry.owner, Attribute::Unknown);
        assert_eq!(entry.fueltech, Attribute::Unknown);
    }

    #[test]
    fn test_missing_duid_column_is_an_error() {
        let csv = "Region,Facility\nNSW1,Eraring\n";
        let err = ReferenceDataset::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ReferenceError::MissingColumn("DUID")));
    }

    #[test]
    fn test_missing_file_degrades_to_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = ReferenceDataset::load_or_empty(&dir.path().join("absent.csv"));
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nem_reference.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        let dataset = ReferenceDataset::load(&path).unwrap();
        assert_eq!(dataset.len(), 3);
    }
}
