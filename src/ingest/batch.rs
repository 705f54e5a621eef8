//! Resilient batched fetching.
//!
//! Splits the facility universe into fixed-size batches and issues one API
//! call per batch, retrying rate-limit and server errors with linear
//! backoff. A failed batch is logged and dropped; the period continues.
//!
//! # Pacing injection
//! All sleeping goes through a [`Pacer`] rather than calling
//! `std::thread::sleep` directly, so retry and pacing behaviour is
//! deterministic in tests without waiting on real time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::ingest::openelectricity::{extract_batch, request_window, BatchQuery, MetricApi};
use crate::logging::{self, DataSource};
use crate::model::{
    ApiFragment, BatchError, FacilityKey, FetchError, Period, PeriodFetchError, RawPoint,
};

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Blocks the run for a pacing or backoff delay.
pub trait Pacer {
    fn pause(&mut self, duration: Duration);
}

/// Real-time pacer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Pacer that only records requested delays.
#[derive(Debug, Default, Clone)]
pub struct RecordingPacer {
    pub pauses: Vec<Duration>,
}

impl Pacer for RecordingPacer {
    fn pause(&mut self, duration: Duration) {
        self.pauses.push(duration);
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Bounded retry with linearly increasing backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub metric: String,
    pub interval: String,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// Minimum gap after every batch call, successful or not.
    pub batch_delay: Duration,
}

/// Everything retrieved for one period.
#[derive(Debug, Clone, Default)]
pub struct PeriodFetch {
    pub period: u32,
    pub points: Vec<RawPoint>,
    pub fragments: Vec<ApiFragment>,
    pub total_batches: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

pub struct BatchFetcher<P: Pacer> {
    settings: FetchSettings,
    pacer: P,
    cancel: Option<Arc<AtomicBool>>,
}

impl<P: Pacer> BatchFetcher<P> {
    pub fn new(settings: FetchSettings, pacer: P) -> Self {
        BatchFetcher {
            settings,
            pacer,
            cancel: None,
        }
    }

    /// Checks `flag` at every batch boundary; once set, the current period
    /// stops with [`PeriodFetchError::Cancelled`].
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Pauses between periods. Exposed so the pipeline paces through the
    /// same [`Pacer`] as the batches.
    pub fn pause(&mut self, duration: Duration) {
        self.pacer.pause(duration);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Runs `call` until it succeeds, fails terminally, or exhausts the
    /// retry policy.
    pub fn with_retry<T>(
        &mut self,
        label: &str,
        mut call: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, BatchError> {
        let max_attempts = self.settings.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(BatchError::Rejected(e)),
                Err(e) if attempt >= max_attempts => {
                    return Err(BatchError::RetryExhausted { attempts: attempt, last: e });
                }
                Err(e) => {
                    let delay = self.settings.retry.backoff(attempt);
                    logging::warn(
                        DataSource::Api,
                        None,
                        &format!(
                            "{} attempt {} failed: {}. Retrying in {:?}",
                            label, attempt, e, delay
                        ),
                    );
                    self.pacer.pause(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Fetches one period for every facility, batch by batch.
    ///
    /// Batch failures are counted, not returned. Only cancellation or an
    /// unrepresentable request window escapes as an error.
    pub fn fetch_period<A: MetricApi + ?Sized>(
        &mut self,
        api: &A,
        facilities: &[FacilityKey],
        period: &Period,
    ) -> Result<PeriodFetch, PeriodFetchError> {
        let (date_start, date_end) =
            request_window(period).ok_or_else(|| PeriodFetchError::InvalidWindow {
                period: period.number,
                reason: format!("no day after {}", period.end),
            })?;

        let batch_size = self.settings.batch_size.max(1);
        let total_batches = facilities.len().div_ceil(batch_size);
        let mut fetch = PeriodFetch {
            period: period.number,
            total_batches,
            ..Default::default()
        };

        logging::info(DataSource::Api, None, &format!("Fetching {}", period));

        let metric = self.settings.metric.clone();
        let interval = self.settings.interval.clone();

        for (index, batch) in facilities.chunks(batch_size).enumerate() {
            if self.is_cancelled() {
                return Err(PeriodFetchError::Cancelled(period.number));
            }

            let batch_num = index + 1;
            logging::debug(
                DataSource::Api,
                None,
                &format!("Period {} batch {}/{}", period.number, batch_num, total_batches),
            );

            let query = BatchQuery {
                facility_codes: batch,
                metric: &metric,
                interval: &interval,
                date_start: date_start.clone(),
                date_end: date_end.clone(),
            };

            let label = format!("Batch {}", batch_num);
            let outcome = self.with_retry(&label, || api.fetch_batch(&query));

            match outcome {
                Ok(response) => {
                    let data = extract_batch(response);
                    fetch.points.extend(data.points);
                    fetch.fragments.extend(data.fragments);
                    fetch.successful_batches += 1;
                }
                Err(e) => {
                    fetch.failed_batches += 1;
                    logging::log_batch_failure(period.number, batch_num, &e);
                }
            }

            self.pacer.pause(self.settings.batch_delay);
        }

        logging::log_fetch_summary(
            DataSource::Api,
            fetch.total_batches,
            fetch.successful_batches,
            fetch.failed_batches,
        );
        logging::info(
            DataSource::Api,
            None,
            &format!(
                "Period {}: {} data points, {} units",
                period.number,
                fetch.points.len(),
                fetch.fragments.len()
            ),
        );

        Ok(fetch)
    }

    /// Lists the network's facility codes, with the same retry policy.
    /// A failed listing yields an empty universe.
    pub fn discover_facilities<A: MetricApi + ?Sized>(&mut self, api: &A) -> Vec<FacilityKey> {
        match self.with_retry("Facility listing", || api.fetch_facility_codes()) {
            Ok(codes) => {
                logging::info(
                    DataSource::Api,
                    None,
                    &format!("Retrieved {} facilities", codes.len()),
                );
                codes
            }
            Err(e) => {
                logging::error(
                    DataSource::Api,
                    None,
                    &format!("Failed to fetch facilities: {}", e),
                );
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
