//! Region inclusion filter.
//!
//! Applied once per unit at ingestion time, never retroactively on the
//! aggregated matrix, so an excluded unit contributes no records, no
//! metadata row and no lifecycle membership.

use std::collections::HashSet;

use crate::model::FacilityMetadata;

/// Allow-list of NEM region codes (e.g. `NSW1`, `VIC1`). Empty means all.
#[derive(Debug, Clone, Default)]
pub struct RegionFilter {
    allowed: HashSet<String>,
}

impl RegionFilter {
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RegionFilter {
            allowed: regions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        !self.allowed.is_empty()
    }

    /// True iff no allow-list is configured or the merged region is listed.
    /// Units with an unknown region never pass an active filter.
    pub fn include(&self, _duid: &str, metadata: &FacilityMetadata) -> bool {
        if !self.is_active() {
            return true;
        }
        metadata
            .region
            .as_known()
            .is_some_and(|region| self.allowed.contains(region))
    }

    /// Allowed regions, sorted, for logs.
    pub fn describe(&self) -> String {
        if !self.is_active() {
            return "None (all regions)".to_string();
        }
        let mut regions: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        regions.sort_unstable();
        regions.join(", ")
    }
}
