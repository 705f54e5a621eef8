//! Post-fetch reshaping of retained records.
//!
//! Submodules:
//! - `monthly`: sums records into a (month, facility) matrix.
//! - `lifecycle`: splits facilities into currently reporting and retired.

pub mod lifecycle;
pub mod monthly;
