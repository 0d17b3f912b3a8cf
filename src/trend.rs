//! Day-bucketed visit trend for sparkline rendering
//!
//! History entries are bucketed into calendar days in the time zone of the
//! `as_of` instant. Missing days are zero; this module never fails.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;

/// Default number of trailing days in a trend
pub const DEFAULT_TREND_DAYS: i64 = 7;

/// Longest trend window the fetcher will use
pub const MAX_TREND_DAYS: i64 = 365;

/// Clamp a configured window into `1..=MAX_TREND_DAYS`
pub fn clamp_trend_days(days: i64) -> i64 {
    days.clamp(1, MAX_TREND_DAYS)
}

/// Build a `window_days`-long sequence of daily visit counts ending at `as_of`
///
/// - One entry per day in `[as_of - (window_days - 1), as_of]`, oldest first
/// - If two entries fall on the same day the later one in `history` wins
/// - `window_days <= 0` yields an empty sequence
pub fn build_trend<Tz: TimeZone>(
    history: &[(DateTime<Utc>, i64)],
    as_of: &DateTime<Tz>,
    window_days: i64,
) -> Vec<i64> {
    if window_days <= 0 {
        return Vec::new();
    }

    let tz = as_of.timezone();
    let mut by_day: HashMap<NaiveDate, i64> = HashMap::with_capacity(history.len());
    for (ts, visits) in history {
        by_day.insert(ts.with_timezone(&tz).date_naive(), *visits);
    }

    let Some(start) = as_of
        .date_naive()
        .checked_sub_days(Days::new((window_days - 1) as u64))
    else {
        return vec![0; window_days as usize];
    };

    (0..window_days as u64)
        .map(|offset| {
            start
                .checked_add_days(Days::new(offset))
                .and_then(|day| by_day.get(&day).copied())
                .unwrap_or(0)
        })
        .collect()
}

/// First instant of the trend window: local midnight `window_days - 1` days before `as_of`
///
/// Falls back to `as_of - window_days` when local midnight does not exist
/// (DST gap), and to the earliest representable instant when even that
/// overflows.
pub fn trend_window_start<Tz: TimeZone>(as_of: &DateTime<Tz>, window_days: i64) -> DateTime<Utc> {
    let days = window_days.max(1);
    let fallback = chrono::Duration::try_days(days)
        .and_then(|span| as_of.with_timezone(&Utc).checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    as_of
        .date_naive()
        .checked_sub_days(Days::new((days - 1) as u64))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| as_of.timezone().from_local_datetime(&midnight).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or(fallback)
}
