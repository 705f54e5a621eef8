//! Data retrieval from the Open Electricity API.
//!
//! Submodules:
//! - `openelectricity`: wire types, request building and the HTTP client.
//! - `batch`: batched fetching with retry, backoff and pacing.

pub mod batch;
pub mod openelectricity;
