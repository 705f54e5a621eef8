//! NEM facility metric puller.
//!
//! Pulls per-unit metric series from the Open Electricity API over an
//! arbitrary calendar range, reshapes them into month-by-facility
//! matrices and separates currently reporting units from retired ones.

pub mod analysis;
pub mod config;
pub mod filter;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod model;
pub mod output;
pub mod periods;
pub mod pipeline;
pub mod reference;
pub mod report;
