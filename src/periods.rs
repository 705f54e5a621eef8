/// Date range chunking.
///
/// The Open Electricity data endpoint rejects windows longer than 365 days,
/// so a user range given as (month, year) pairs is split into sequential,
/// non-overlapping yearly periods. Period numbering is significant: the
/// lifecycle categorizer treats the highest-numbered period as "latest".

use chrono::{Duration, Months, NaiveDate};

use crate::model::{ConfigError, Period};

/// Longest span (`end - start`, in days) the API accepts in one request.
pub const MAX_PERIOD_DAYS: i64 = 365;

/// First day of the given month.
pub fn first_day_of_month(month: u32, year: i32) -> Result<NaiveDate, ConfigError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(ConfigError::InvalidMonth(month))
}

/// Last day of the given month, accounting for leap years.
pub fn last_day_of_month(month: u32, year: i32) -> Result<NaiveDate, ConfigError> {
    let first = first_day_of_month(month, year)?;
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or(ConfigError::InvalidMonth(month))
}

/// Splits `[start_month/start_year, end of end_month/end_year]` into periods.
///
/// Returns a single period when the whole range fits in one request;
/// otherwise emits periods of one year minus one day, clamping the last
/// period to the overall end. Fails if the range is empty.
pub fn compute_periods(
    start_month: u32,
    start_year: i32,
    end_month: u32,
    end_year: i32,
) -> Result<Vec<Period>, ConfigError> {
    let start = first_day_of_month(start_month, start_year)?;
    let end = last_day_of_month(end_month, end_year)?;
    split_range(start, end)
}

/// Splits an inclusive date range into API-compliant periods.
pub fn split_range(start: NaiveDate, end: NaiveDate) -> Result<Vec<Period>, ConfigError> {
    if start > end {
        return Err(ConfigError::EmptyRange { start, end });
    }

    if (end - start).num_days() <= MAX_PERIOD_DAYS {
        return Ok(vec![Period { number: 1, start, end }]);
    }

    let mut periods = Vec::new();
    let mut current = start;
    while current <= end {
        // One year minus one day; chrono clamps Feb 29 to Feb 28.
        let year_end = current
            .checked_add_months(Months::new(12))
            .map(|d| d - Duration::days(1))
            .unwrap_or(end);
        let period_end = year_end.min(end);

        periods.push(Period {
            number: periods.len() as u32 + 1,
            start: current,
            end: period_end,
        });

        match period_end.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }

    Ok(periods)
}

/// Human-readable description of the overall range, for run logs.
pub fn describe_range(periods: &[Period]) -> String {
    match (periods.first(), periods.last()) {
        (Some(first), Some(last)) => format!(
            "{} to {} ({} days, {} period{})",
            first.start.format("%Y-%m-%d"),
            last.end.format("%Y-%m-%d"),
            (last.end - first.start).num_days(),
            periods.len(),
            if periods.len() == 1 { "" } else { "s" }
        ),
        _ => "empty range".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
