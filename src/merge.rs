//! Metadata merging.
//!
//! Combines the coarse attributes the API reports for a unit with the
//! reference dataset. The reference spreadsheet is more accurate, so its
//! values win; any reference field that is itself unknown falls back to the
//! API value. Units missing from the reference dataset keep API-only
//! attributes and unknown enrichment fields.

use crate::model::{ApiFragment, FacilityMetadata};
use crate::reference::ReferenceDataset;

/// Produces the merged metadata for one unit within one period.
///
/// Pure: depends only on the fragment and the immutable reference dataset,
/// so units can be merged in any order.
pub fn merge_metadata(fragment: &ApiFragment, reference: &ReferenceDataset) -> FacilityMetadata {
    let mut merged = FacilityMetadata::unknown(&fragment.duid);
    merged.name = fragment.name.or_else_from(&merged.name);

    match reference.lookup(&fragment.duid) {
        Some(entry) => {
            merged.facility = entry.facility.or_else_from(&fragment.facility_code);
            merged.region = entry.region.or_else_from(&fragment.region);
            merged.fueltech = entry.fueltech.or_else_from(&fragment.fueltech);
            merged.owner = entry.owner.clone();
            merged.unit_count = entry.unit_count.clone();
            merged.nameplate_capacity_mw = entry.nameplate_capacity_mw.clone();
            merged.storage_capacity_mwh = entry.storage_capacity_mwh.clone();
            merged.expected_closure_year = entry.expected_closure_year.clone();
        }
        None => {
            merged.facility = fragment.facility_code.clone();
            merged.region = fragment.region.clone();
            merged.fueltech = fragment.fueltech.clone();
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attribute;
    use crate::reference::ReferenceEntry;

    fn fragment(duid: &str, region: &str) -> ApiFragment {
        ApiFragment {
            duid: duid.to_string(),
            name: Attribute::known(format!("{} unit", duid)),
            facility_code: Attribute::known("ERARING"),
            region: Attribute::from_raw(Some(region)),
            fueltech: Attribute::known("coal_black"),
        }
    }

    fn reference_with(duid: &str, entry: ReferenceEntry) -> ReferenceDataset {
        [(duid.to_string(), entry)].into_iter().collect()
    }

    #[test]
    fn test_reference_region_beats_api_region() {
        let reference = reference_with(
            "X",
            ReferenceEntry {
                region: Attribute::known("NSW1"),
                ..Default::default()
            },
        );
        let merged = merge_metadata(&fragment("X", "UNKNOWN"), &reference);
        assert_eq!(merged.region, Attribute::known("NSW1"));
    }

    #[test]
    fn test_unknown_reference_field_falls_back_to_api() {
        let reference = reference_with(
            "ER01",
            ReferenceEntry {
                owner: Attribute::known("Origin Energy"),
                ..Default::default()
            },
        );
        let merged = merge_metadata(&fragment("ER01", "NSW1"), &reference);
        assert_eq!(merged.region, Attribute::known("NSW1"));
        assert_eq!(merged.facility, Attribute::known("ERARING"));
        assert_eq!(merged.fueltech, Attribute::known("coal_black"));
        assert_eq!(merged.owner, Attribute::known("Origin Energy"));
    }

    #[test]
    fn test_unmatched_unit_keeps_api_fields_and_unknown_enrichment() {
        let merged = merge_metadata(&fragment("ER02", "NSW1"), &ReferenceDataset::empty());
        assert_eq!(merged.duid, "ER02");
        assert_eq!(merged.name, Attribute::known("ER02 unit"));
        assert_eq!(merged.region, Attribute::known("NSW1"));
        assert_eq!(merged.owner, Attribute::Unknown);
        assert_eq!(merged.unit_count, Attribute::Unknown);
        assert_eq!(merged.nameplate_capacity_mw, Attribute::Unknown);
        assert_eq!(merged.storage_capacity_mwh, Attribute::Unknown);
        assert_eq!(merged.expected_closure_year, Attribute::Unknown);
    }

    #[test]
    fn test_name_always_comes_from_api() {
        let reference = reference_with(
            "ER03",
            ReferenceEntry {
                facility: Attribute::known("Eraring Power Station"),
                ..Default::default()
            },
        );
        let merged = merge_metadata(&fragment("ER03", "NSW1"), &reference);
        assert_eq!(merged.name, Attribute::known("ER03 unit"));
        assert_eq!(merged.facility, Attribute::known("Eraring Power Station"));
    }

    #[test]
    fn test_missing_api_name_defaults_to_duid() {
        let mut frag = fragment("ER04", "NSW1");
        frag.name = Attribute::Unknown;
        let merged = merge_metadata(&frag, &ReferenceDataset::empty());
        assert_eq!(merged.name, Attribute::known("ER04"));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let reference = reference_with(
            "A1",
            ReferenceEntry {
                region: Attribute::known("QLD1"),
                ..Default::default()
            },
        );
        let frags = [fragment("A1", "NSW1"), fragment("B1", "VIC1")];
        let forward: Vec<_> = frags.iter().map(|f| merge_metadata(f, &reference)).collect();
        let mut backward: Vec<_> = frags.iter().rev().map(|f| merge_metadata(f, &reference)).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }
}
