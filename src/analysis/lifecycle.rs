//! Facility lifecycle classification.
//!
//! A unit seen in the most recent period is still reporting ("reference");
//! a unit seen only in earlier periods is treated as decommissioned.

use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};

use crate::model::{FacilityKey, FacilityMetadata};

/// Merged metadata per period, keyed by period number, units in
/// first-encounter order.
pub type PeriodMetadata = BTreeMap<u32, IndexMap<FacilityKey, FacilityMetadata>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Lifecycle {
    pub latest_period: u32,
    pub reference: IndexSet<FacilityKey>,
    pub decommissioned: IndexSet<FacilityKey>,
}

/// Highest period number carrying metadata.
pub fn latest_period(metadata: &PeriodMetadata) -> Option<u32> {
    metadata.keys().next_back().copied()
}

/// Splits every observed unit into the reference and decommissioned sets.
///
/// Returns `None` when fewer than two periods were completed; a single
/// period has nothing to compare against. A completed period with no
/// retained units still counts, and leaves the reference set empty.
pub fn categorize(metadata: &PeriodMetadata) -> Option<Lifecycle> {
    if metadata.len() < 2 {
        return None;
    }
    let latest = latest_period(metadata)?;
    let reference: IndexSet<FacilityKey> = metadata.get(&latest)?.keys().cloned().collect();

    let decommissioned: IndexSet<FacilityKey> = metadata
        .iter()
        .filter(|(number, _)| **number != latest)
        .flat_map(|(_, units)| units.keys())
        .filter(|key| !reference.contains(*key))
        .cloned()
        .collect();

    Some(Lifecycle {
        latest_period: latest,
        reference,
        decommissioned,
    })
}

/// Most recent metadata known for `key`, scanning from the latest period
/// backwards. Units never seen get a synthesized row.
pub fn resolve_metadata(metadata: &PeriodMetadata, key: &str) -> FacilityMetadata {
    metadata
        .values()
        .rev()
        .find_map(|units| units.get(key))
        .cloned()
        .unwrap_or_else(|| FacilityMetadata::unknown(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attribute;

    fn meta(duid: &str, region: &str) -> FacilityMetadata {
        let mut m = FacilityMetadata::unknown(duid);
        m.region = Attribute::known(region);
        m
    }

    fn periods(layout: &[(u32, &[&str])]) -> PeriodMetadata {
        layout
            .iter()
            .map(|(number, duids)| {
                let units = duids
                    .iter()
                    .map(|d| (d.to_string(), meta(d, &format!("P{}", number))))
                    .collect();
                (*number, units)
            })
            .collect()
    }

    #[test]
    fn test_unit_missing_from_latest_period_is_decommissioned() {
        let md = periods(&[(1, &["A", "B"]), (2, &["A", "B"]), (3, &["B"])]);
        let lifecycle = categorize(&md).expect("three periods should categorize");

        assert_eq!(lifecycle.latest_period, 3);
        assert!(lifecycle.reference.contains("B"));
        assert!(lifecycle.decommissioned.contains("A"));
        assert!(!lifecycle.decommissioned.contains("B"));
    }

    #[test]
    fn test_sets_are_disjoint_and_cover_all_units() {
        let md = periods(&[(1, &["A", "B", "C"]), (2, &["C", "D"]), (3, &["D", "E"])]);
        let lifecycle = categorize(&md).unwrap();

        for key in &lifecycle.reference {
            assert!(!lifecycle.decommissioned.contains(key), "{} in both sets", key);
        }
        let mut all: Vec<&str> = lifecycle
            .reference
            .iter()
            .chain(lifecycle.decommissioned.iter())
            .map(String::as_str)
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_decommissioned_preserves_encounter_order() {
        let md = periods(&[(1, &["Z", "A"]), (2, &["M", "Z"]), (3, &["Q"])]);
        let lifecycle = categorize(&md).unwrap();
        let order: Vec<&str> = lifecycle.decommissioned.iter().map(String::as_str).collect();
        assert_eq!(order, vec!["Z", "A", "M"]);
    }

    #[test]
    fn test_latest_is_highest_number_not_insertion_order() {
        let mut md = PeriodMetadata::new();
        md.insert(2, periods(&[(2, &["NEW"])]).remove(&2).unwrap());
        md.insert(1, periods(&[(1, &["OLD"])]).remove(&1).unwrap());

        let lifecycle = categorize(&md).unwrap();
        assert_eq!(lifecycle.latest_period, 2);
        assert!(lifecycle.reference.contains("NEW"));
        assert!(lifecycle.decommissioned.contains("OLD"));
    }

    #[test]
    fn test_single_period_is_not_categorized() {
        assert!(categorize(&periods(&[(1, &["A"])])).is_none());
        assert!(categorize(&PeriodMetadata::new()).is_none());
    }

    #[test]
    fn test_resolve_metadata_prefers_most_recent_period() {
        let md = periods(&[(1, &["A"]), (2, &["A"]), (3, &["B"])]);
        assert_eq!(resolve_metadata(&md, "A").region, Attribute::known("P2"));
    }

    #[test]
    fn test_resolve_metadata_synthesizes_unknown_unit() {
        let md = periods(&[(1, &["A"])]);
        let resolved = resolve_metadata(&md, "GHOST");
        assert_eq!(resolved, FacilityMetadata::unknown("GHOST"));
        assert_eq!(resolved.name, Attribute::known("GHOST"));
    }
}
